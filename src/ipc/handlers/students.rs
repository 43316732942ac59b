use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
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

fn circle_exists(conn: &Connection, circle_id: &str) -> Result<bool, HandlerErr> {
    conn.query_row("SELECT 1 FROM circles WHERE id = ?", [circle_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
    .map_err(db_err)
}

fn students_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let circle_id = get_required_str(params, "circleId")?;
    let name = get_required_str(params, "name")?;
    if name.trim().is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "name must not be blank".to_string(),
        });
    }
    if !circle_exists(conn, &circle_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "circle not found".to_string(),
        });
    }
    let guardian_phone = params
        .get("guardianPhone")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let active = params.get("active").and_then(|v| v.as_bool()).unwrap_or(true);
    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE circle_id = ?",
            [&circle_id],
            |r| r.get(0),
        )
        .map_err(db_err)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, circle_id, name, guardian_phone, active, sort_order)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &circle_id,
            name.trim(),
            &guardian_phone,
            active as i64,
            sort_order,
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
    })?;
    Ok(json!({ "studentId": id }))
}

fn students_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let circle_id = get_required_str(params, "circleId")?;
    if !circle_exists(conn, &circle_id)? {
        return Err(HandlerErr {
            code: "not_found",
            message: "circle not found".to_string(),
        });
    }
    let mut stmt = conn
        .prepare(
            "SELECT id, name, guardian_phone, active, sort_order
             FROM students
             WHERE circle_id = ?
             ORDER BY sort_order",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([&circle_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "guardianPhone": r.get::<_, Option<String>>(2)?,
                "active": r.get::<_, i64>(3)? != 0,
                "sortOrder": r.get::<_, i64>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;
    Ok(json!({ "students": rows }))
}

fn students_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let exists = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [&student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
        });
    }
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "missing patch".to_string(),
        });
    };

    if let Some(name) = patch.get("name").and_then(|v| v.as_str()) {
        if name.trim().is_empty() {
            return Err(HandlerErr {
                code: "bad_params",
                message: "name must not be blank".to_string(),
            });
        }
        conn.execute(
            "UPDATE students SET name = ? WHERE id = ?",
            (name.trim(), &student_id),
        )
        .map_err(db_err)?;
    }
    if let Some(phone) = patch.get("guardianPhone") {
        let phone = phone.as_str().map(|s| s.to_string());
        conn.execute(
            "UPDATE students SET guardian_phone = ? WHERE id = ?",
            (&phone, &student_id),
        )
        .map_err(db_err)?;
    }
    if let Some(active) = patch.get("active").and_then(|v| v.as_bool()) {
        conn.execute(
            "UPDATE students SET active = ? WHERE id = ?",
            (active as i64, &student_id),
        )
        .map_err(db_err)?;
    }
    if let Some(circle_id) = patch.get("circleId").and_then(|v| v.as_str()) {
        if !circle_exists(conn, circle_id)? {
            return Err(HandlerErr {
                code: "not_found",
                message: "target circle not found".to_string(),
            });
        }
        conn.execute(
            "UPDATE students SET circle_id = ? WHERE id = ?",
            (circle_id, &student_id),
        )
        .map_err(db_err)?;
    }
    Ok(json!({ "ok": true }))
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
        "students.create" => Some(dispatch(state, req, students_create)),
        "students.list" => Some(dispatch(state, req, students_list)),
        "students.update" => Some(dispatch(state, req, students_update)),
        _ => None,
    }
}
