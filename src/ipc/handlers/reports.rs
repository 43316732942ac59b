use crate::ingest::{Grade, RepeatType};
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

fn get_required_u32(params: &serde_json::Value, key: &str) -> Result<u32, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing or invalid {}", key),
        })
}

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| HandlerErr {
        code: "bad_date",
        message: format!("invalid date '{}', expected YYYY-MM-DD", raw),
    })
}

fn student_circle(conn: &Connection, student_id: &str) -> Result<String, HandlerErr> {
    conn.query_row(
        "SELECT circle_id FROM students WHERE id = ?",
        [student_id],
        |r| r.get::<_, String>(0),
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| HandlerErr {
        code: "not_found",
        message: "student not found".to_string(),
    })
}

fn reports_add(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let date = parse_date(&get_required_str(params, "date")?)?;
    let surah = get_required_str(params, "surah")?;
    let from_verse = get_required_u32(params, "fromVerse")?;
    let to_verse = get_required_u32(params, "toVerse")?;
    if surah.trim().is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "surah must not be blank".to_string(),
        });
    }
    if from_verse == 0 || to_verse < from_verse {
        return Err(HandlerErr {
            code: "bad_params",
            message: "verse range must satisfy 1 <= fromVerse <= toVerse".to_string(),
        });
    }
    let repeat_type = get_required_str(params, "repeatType")?;
    let repeat_type = RepeatType::from_code(&repeat_type).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown repeatType '{}'", repeat_type),
    })?;
    let grade = get_required_str(params, "grade")?;
    let grade = Grade::from_code(&grade).ok_or_else(|| HandlerErr {
        code: "bad_params",
        message: format!("unknown grade '{}'", grade),
    })?;
    let note = params
        .get("note")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let circle_id = student_circle(conn, &student_id)?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO reports(id, student_id, circle_id, date, surah, from_verse, to_verse, repeat_type, grade, note)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &circle_id,
            date.format("%Y-%m-%d").to_string(),
            surah.trim(),
            i64::from(from_verse),
            i64::from(to_verse),
            repeat_type.code(),
            grade.code(),
            &note,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
    })?;
    Ok(json!({ "reportId": id }))
}

fn reports_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params.get("studentId").and_then(|v| v.as_str());
    let circle_id = params.get("circleId").and_then(|v| v.as_str());
    let (scope_sql, scope_val) = match (student_id, circle_id) {
        (Some(s), _) => ("student_id = ?1", s.to_string()),
        (None, Some(c)) => ("circle_id = ?1", c.to_string()),
        (None, None) => {
            return Err(HandlerErr {
                code: "bad_params",
                message: "provide studentId or circleId".to_string(),
            })
        }
    };
    let from = match params.get("from").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_date(raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };
    let to = match params.get("to").and_then(|v| v.as_str()) {
        Some(raw) => Some(parse_date(raw)?.format("%Y-%m-%d").to_string()),
        None => None,
    };

    let sql = format!(
        "SELECT id, student_id, circle_id, date, surah, from_verse, to_verse, repeat_type, grade, note
         FROM reports
         WHERE {}
           AND (?2 IS NULL OR date >= ?2)
           AND (?3 IS NULL OR date <= ?3)
         ORDER BY date, rowid",
        scope_sql
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let rows = stmt
        .query_map((&scope_val, &from, &to), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "studentId": r.get::<_, String>(1)?,
                "circleId": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "surah": r.get::<_, String>(4)?,
                "fromVerse": r.get::<_, i64>(5)?,
                "toVerse": r.get::<_, i64>(6)?,
                "repeatType": r.get::<_, String>(7)?,
                "grade": r.get::<_, String>(8)?,
                "note": r.get::<_, Option<String>>(9)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "reports": rows }))
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
        "reports.add" => Some(dispatch(state, req, reports_add)),
        "reports.list" => Some(dispatch(state, req, reports_list)),
        _ => None,
    }
}
