use crate::ingest::AttendanceStatus;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
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

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_date",
        message: format!("invalid date '{}', expected YYYY-MM-DD", raw),
    })
}

/// Writes a full day sheet for a circle: every active student gets a row for
/// the date, defaulting to present when no entry names them. Re-marking a day
/// overwrites the earlier rows.
fn attendance_mark_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let circle_id = get_required_str(params, "circleId")?;
    let date = parse_date(&get_required_str(params, "date")?)?
        .format("%Y-%m-%d")
        .to_string();

    let circle_found = conn
        .query_row("SELECT 1 FROM circles WHERE id = ?", [&circle_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !circle_found {
        return Err(HandlerErr {
            code: "not_found",
            message: "circle not found".to_string(),
        });
    }

    let mut overrides: HashMap<String, (AttendanceStatus, Option<String>)> = HashMap::new();
    if let Some(entries) = params.get("entries").and_then(|v| v.as_array()) {
        for entry in entries {
            let student_id = entry
                .get("studentId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr {
                    code: "bad_params",
                    message: "entry missing studentId".to_string(),
                })?;
            let status_code = entry
                .get("status")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HandlerErr {
                    code: "bad_params",
                    message: "entry missing status".to_string(),
                })?;
            let status = AttendanceStatus::from_code(status_code).ok_or_else(|| HandlerErr {
                code: "bad_params",
                message: format!("unknown status '{}'", status_code),
            })?;
            let note = entry
                .get("note")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            overrides.insert(student_id.to_string(), (status, note));
        }
    }

    let mut stmt = conn
        .prepare("SELECT id FROM students WHERE circle_id = ? AND active = 1 ORDER BY sort_order")
        .map_err(db_err)?;
    let student_ids: Vec<String> = stmt
        .query_map([&circle_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
    })?;
    let mut updated = 0usize;
    for student_id in &student_ids {
        let (status, note) = overrides
            .get(student_id)
            .cloned()
            .unwrap_or((AttendanceStatus::Present, None));
        tx.execute(
            "INSERT INTO attendance(id, student_id, date, status, note)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
               status = excluded.status,
               note = excluded.note",
            (
                Uuid::new_v4().to_string(),
                student_id,
                &date,
                status.code(),
                &note,
            ),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
        })?;
        updated += 1;
    }
    tx.commit().map_err(|e| HandlerErr {
        code: "db_commit_failed",
        message: e.to_string(),
    })?;

    Ok(json!({ "updated": updated }))
}

fn attendance_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let from = match params.get("from").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_date(raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };
    let to = match params.get("to").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_date(raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };
    let mut stmt = conn
        .prepare(
            "SELECT date, status, note FROM attendance
             WHERE student_id = ?1
               AND (?2 IS NULL OR date >= ?2)
               AND (?3 IS NULL OR date <= ?3)
             ORDER BY date",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map((&student_id, &from, &to), |r| {
            Ok(json!({
                "date": r.get::<_, String>(0)?,
                "status": r.get::<_, String>(1)?,
                "note": r.get::<_, Option<String>>(2)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "attendance": rows }))
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
        "attendance.markDay" => Some(dispatch(state, req, attendance_mark_day)),
        "attendance.list" => Some(dispatch(state, req, attendance_list)),
        _ => None,
    }
}
