use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
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

fn enrollments_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let course_name = get_required_str(params, "courseName")?;
    if course_name.trim().is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "courseName must not be blank".to_string(),
        });
    }
    require_student(conn, &student_id)?;
    let completed = params
        .get("completed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO enrollments(id, student_id, course_name, completed) VALUES(?, ?, ?, ?)",
        (&id, &student_id, course_name.trim(), completed as i64),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
    })?;
    Ok(json!({ "enrollmentId": id }))
}

fn enrollments_set_completed(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let completed = params
        .get("completed")
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing completed".to_string(),
        })?;
    let changed = conn
        .execute(
            "UPDATE enrollments SET completed = ? WHERE id = ?",
            (completed as i64, &enrollment_id),
        )
        .map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
        })?;
    if changed == 0 {
        return Err(HandlerErr {
            code: "not_found",
            message: "enrollment not found".to_string(),
        });
    }
    Ok(json!({ "ok": true }))
}

fn test_scores_add(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let test_name = get_required_str(params, "testName")?;
    require_student(conn, &student_id)?;
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing score".to_string(),
        })?;
    let max_score = params
        .get("maxScore")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: "missing maxScore".to_string(),
        })?;
    if !(max_score > 0.0) || score < 0.0 || score > max_score {
        return Err(HandlerErr {
            code: "bad_params",
            message: "scores must satisfy 0 <= score <= maxScore, maxScore > 0".to_string(),
        });
    }
    let date = match params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| HandlerErr {
                    code: "bad_date",
                    message: format!("invalid date '{}', expected YYYY-MM-DD", raw),
                })?
                .format("%Y-%m-%d")
                .to_string(),
        ),
        None => None,
    };
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO test_scores(id, student_id, test_name, score, max_score, date)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &student_id, test_name.trim(), score, max_score, &date),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
    })?;
    Ok(json!({ "testScoreId": id }))
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
        "enrollments.add" => Some(dispatch(state, req, enrollments_add)),
        "enrollments.setCompleted" => Some(dispatch(state, req, enrollments_set_completed)),
        "testScores.add" => Some(dispatch(state, req, test_scores_add)),
        _ => None,
    }
}
