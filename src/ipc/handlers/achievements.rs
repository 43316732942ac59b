use crate::achievements::{self, AchievementId, StudentHistory, TestScore};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
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

fn require_student(conn: &Connection, student_id: &str) -> Result<(), HandlerErr> {
    let found = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
        })
    }
}

fn as_of_date(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match params.get("asOf").and_then(|v| v.as_str()) {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
            code: "bad_date",
            message: format!("invalid date '{}', expected YYYY-MM-DD", raw),
        }),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

/// Re-aggregates the student's counters from the record store. Full-history
/// scans are fine at center scale; the external contract would not change if
/// these became incremental counters later.
fn assemble_history(
    conn: &Connection,
    student_id: &str,
    as_of: NaiveDate,
    window_days: u32,
) -> Result<StudentHistory, HandlerErr> {
    let d = |date: NaiveDate| date.format("%Y-%m-%d").to_string();

    let excellent_grade_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM reports WHERE student_id = ? AND grade = 'excellent'",
            [student_id],
            |r| r.get(0),
        )
        .map_err(db_err)?;

    let year_start = NaiveDate::from_ymd_opt(as_of.year(), 1, 1).unwrap_or(as_of);
    let verses_since_year_start: i64 = conn
        .query_row(
            "SELECT COALESCE(SUM(to_verse - from_verse + 1), 0) FROM reports
             WHERE student_id = ? AND date >= ? AND date <= ?",
            (student_id, d(year_start), d(as_of)),
            |r| r.get(0),
        )
        .map_err(db_err)?;

    let window_start = as_of - Duration::days(i64::from(window_days));
    let present_days_in_window: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM attendance
             WHERE student_id = ? AND status = 'present' AND date >= ? AND date <= ?",
            (student_id, d(window_start), d(as_of)),
            |r| r.get(0),
        )
        .map_err(db_err)?;

    let completed_enrollments: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM enrollments WHERE student_id = ? AND completed = 1",
            [student_id],
            |r| r.get(0),
        )
        .map_err(db_err)?;

    let mut stmt = conn
        .prepare("SELECT score, max_score FROM test_scores WHERE student_id = ?")
        .map_err(db_err)?;
    let test_scores: Vec<TestScore> = stmt
        .query_map([student_id], |r| {
            Ok(TestScore {
                score: r.get(0)?,
                max_score: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    Ok(StudentHistory {
        excellent_grade_count: excellent_grade_count.max(0) as u64,
        verses_since_year_start: verses_since_year_start.max(0) as u64,
        present_days_in_window: present_days_in_window.max(0).min(i64::from(u32::MAX)) as u32,
        completed_enrollments: completed_enrollments.max(0).min(i64::from(u32::MAX)) as u32,
        test_scores,
    })
}

fn awarded_set(conn: &Connection, student_id: &str) -> Result<HashSet<AchievementId>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT achievement FROM achievements WHERE student_id = ?")
        .map_err(db_err)?;
    let codes: Vec<String> = stmt
        .query_map([student_id], |r| r.get(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(codes
        .iter()
        .filter_map(|c| AchievementId::from_code(c))
        .collect())
}

fn achievements_evaluate(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student(conn, &student_id)?;
    let as_of = as_of_date(params)?;
    let thresholds = db::load_achievement_thresholds(conn).map_err(|e| HandlerErr {
        code: "bad_config",
        message: format!("{e:#}"),
    })?;

    let history = assemble_history(conn, &student_id, as_of, thresholds.present_window_days)?;
    let already = awarded_set(conn, &student_id)?;
    let newly = achievements::evaluate(&history, &thresholds, &already);

    let tx = conn.unchecked_transaction().map_err(|e| HandlerErr {
        code: "db_tx_failed",
        message: e.to_string(),
    })?;
    for id in &newly {
        // UNIQUE(student_id, achievement) backs the one-time invariant even
        // if two evaluations race through separate sidecar sessions.
        tx.execute(
            "INSERT OR IGNORE INTO achievements(id, student_id, achievement, awarded_on)
             VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                id.code(),
                as_of.format("%Y-%m-%d").to_string(),
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

    let codes: Vec<&'static str> = newly.iter().map(|id| id.code()).collect();
    Ok(json!({ "newlyEarned": codes }))
}

fn achievements_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student(conn, &student_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT achievement, awarded_on FROM achievements
             WHERE student_id = ? ORDER BY awarded_on, achievement",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([&student_id], |r| {
            Ok(json!({
                "achievement": r.get::<_, String>(0)?,
                "awardedOn": r.get::<_, String>(1)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "achievements": rows }))
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
        "achievements.evaluate" => Some(dispatch(state, req, achievements_evaluate)),
        "achievements.list" => Some(dispatch(state, req, achievements_list)),
        _ => None,
    }
}
