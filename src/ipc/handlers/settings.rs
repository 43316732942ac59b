use crate::achievements::AchievementThresholds;
use crate::db;
use crate::ingest::KeywordTable;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, None)
    }
}

fn settings_get(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let read = |key: &str| -> Result<serde_json::Value, HandlerErr> {
        db::settings_get_json(conn, key)
            .map_err(|e| HandlerErr {
                code: "db_query_failed",
                message: format!("{e:#}"),
            })?
            .ok_or_else(|| HandlerErr {
                code: "bad_config",
                message: format!("missing setting '{}'", key),
            })
    };
    Ok(json!({
        "ingestKeywords": read(db::KEY_INGEST_KEYWORDS)?,
        "excludedWeekday": read(db::KEY_EXCLUDED_WEEKDAY)?,
        "achievementThresholds": read(db::KEY_ACHIEVEMENT_THRESHOLDS)?,
    }))
}

/// Validates every supplied blob before writing any of them: an invalid
/// configuration is rejected whole, so the workspace never holds a partially
/// updated, unusable configuration.
fn settings_update(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut writes: Vec<(&str, serde_json::Value)> = Vec::new();

    if let Some(raw) = params.get("ingestKeywords") {
        let table: KeywordTable =
            serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
                code: "bad_config",
                message: format!("ingestKeywords has the wrong shape: {}", e),
            })?;
        table.validate().map_err(|e| HandlerErr {
            code: "bad_config",
            message: format!("ingestKeywords: {}", e),
        })?;
        writes.push((db::KEY_INGEST_KEYWORDS, raw.clone()));
    }

    if let Some(raw) = params.get("excludedWeekday") {
        let index = raw.as_u64().ok_or_else(|| HandlerErr {
            code: "bad_config",
            message: "excludedWeekday must be an integer".to_string(),
        })?;
        if index > 6 {
            return Err(HandlerErr {
                code: "bad_config",
                message: format!("excludedWeekday must be 0..=6 (Monday = 0), got {}", index),
            });
        }
        writes.push((db::KEY_EXCLUDED_WEEKDAY, raw.clone()));
    }

    if let Some(raw) = params.get("achievementThresholds") {
        let thresholds: AchievementThresholds =
            serde_json::from_value(raw.clone()).map_err(|e| HandlerErr {
                code: "bad_config",
                message: format!("achievementThresholds has the wrong shape: {}", e),
            })?;
        thresholds.validate().map_err(|e| HandlerErr {
            code: "bad_config",
            message: format!("achievementThresholds: {}", e),
        })?;
        writes.push((db::KEY_ACHIEVEMENT_THRESHOLDS, raw.clone()));
    }

    if writes.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "nothing to update".to_string(),
        });
    }

    for (key, value) in &writes {
        db::settings_set_json(conn, key, value).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: format!("{e:#}"),
        })?;
    }
    Ok(json!({ "updated": writes.len() }))
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
        "settings.get" => Some(dispatch(state, req, |c, _| settings_get(c))),
        "settings.update" => Some(dispatch(state, req, settings_update)),
        _ => None,
    }
}
