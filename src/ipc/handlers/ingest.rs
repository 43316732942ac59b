use crate::ingest::{self, ParseOutcome, RosterEntry};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::db;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
        })
}

fn load_roster(conn: &Connection, circle_id: &str) -> Result<Vec<RosterEntry>, HandlerErr> {
    let exists = conn
        .query_row("SELECT 1 FROM circles WHERE id = ?", [circle_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "circle not found".to_string(),
        });
    }
    let mut stmt = conn
        .prepare(
            "SELECT id, name FROM students
             WHERE circle_id = ? AND active = 1
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    stmt.query_map([circle_id], |r| {
        Ok(RosterEntry {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(db_err)
}

/// Runs the pure parser against the circle's roster snapshot with the
/// workspace's configured keyword table.
fn parse_from_params(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<(String, ParseOutcome), HandlerErr> {
    let circle_id = get_required_str(params, "circleId")?;
    let date = get_required_str(params, "date")?;
    let text = get_required_str(params, "text")?;

    let roster = load_roster(conn, &circle_id)?;
    let keywords = db::load_keyword_table(conn).map_err(|e| HandlerErr {
        code: "bad_config",
        message: format!("{e:#}"),
    })?;

    let outcome = ingest::parse_collective_report(&text, &roster, &date, &keywords).map_err(
        |e| HandlerErr {
            code: "bad_date",
            message: e.to_string(),
        },
    )?;
    Ok((circle_id, outcome))
}

fn outcome_json(outcome: &ParseOutcome) -> serde_json::Value {
    let reports: Vec<serde_json::Value> = outcome
        .reports
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "surah": r.surah,
                "fromVerse": r.from_verse,
                "toVerse": r.to_verse,
                "repeatType": r.repeat_type.code(),
                "grade": r.grade.code(),
            })
        })
        .collect();
    let attendance: Vec<serde_json::Value> = outcome
        .attendance
        .iter()
        .map(|a| {
            json!({
                "studentId": a.student_id,
                "date": a.date.format("%Y-%m-%d").to_string(),
                "status": a.status.code(),
                "note": a.note,
            })
        })
        .collect();
    let skipped: Vec<serde_json::Value> = outcome
        .skipped
        .iter()
        .map(|s| serde_json::to_value(s).unwrap_or_else(|_| json!({})))
        .collect();
    json!({
        "reports": reports,
        "attendance": attendance,
        "skipped": skipped,
        "skippedCount": outcome.skipped.len(),
    })
}

fn collective_preview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (_, outcome) = parse_from_params(conn, params)?;
    Ok(outcome_json(&outcome))
}

fn collective_submit(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (circle_id, outcome) = parse_from_params(conn, params)?;
    let date = get_required_str(params, "date")?.trim().to_string();

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
    })?;
    for rep in &outcome.reports {
        tx.execute(
            "INSERT INTO reports(id, student_id, circle_id, date, surah, from_verse, to_verse, repeat_type, grade, note)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
            (
                Uuid::new_v4().to_string(),
                &rep.student_id,
                &circle_id,
                &date,
                &rep.surah,
                i64::from(rep.from_verse),
                i64::from(rep.to_verse),
                rep.repeat_type.code(),
                rep.grade.code(),
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
        })?;
    }
    for att in &outcome.attendance {
        // Re-submitting the same day replaces the earlier mark for that
        // student; duplicate policy lives here, not in the parser.
        tx.execute(
            "INSERT INTO attendance(id, student_id, date, status, note)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               status = excluded.status,
               note = excluded.note",
            (
                Uuid::new_v4().to_string(),
                &att.student_id,
                att.date.format("%Y-%m-%d").to_string(),
                att.status.code(),
                &att.note,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
        })?;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
    })?;

    let mut result = outcome_json(&outcome);
    result["insertedReports"] = json!(outcome.reports.len());
    result["upsertedAttendance"] = json!(outcome.attendance.len());
    Ok(result)
}

fn dispatch(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "collective.preview" => Some(dispatch(state, req, collective_preview)),
        "collective.submit" => Some(dispatch(state, req, collective_submit)),
        _ => None,
    }
}
