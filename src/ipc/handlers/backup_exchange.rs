use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn handle_export(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let workspace = required_path(req, "workspacePath")?;
        let out = required_path(req, "outPath")?;
        let summary = backup::export_workspace_bundle(&workspace, &out)
            .map_err(|e| err(&req.id, "backup_export_failed", format!("{e:#}"), None))?;
        Ok(json!({
            "bundleFormat": summary.bundle_format,
            "dbSha256": summary.db_sha256,
            "outPath": out.to_string_lossy(),
        }))
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

fn handle_import(_state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let workspace = required_path(req, "workspacePath")?;
        let input = required_path(req, "inPath")?;
        let summary = backup::import_workspace_bundle(&input, &workspace)
            .map_err(|e| err(&req.id, "backup_import_failed", format!("{e:#}"), None))?;
        Ok(json!({
            "bundleFormatDetected": summary.bundle_format_detected,
            "dbSha256": summary.db_sha256,
        }))
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import(state, req)),
        _ => None,
    }
}
