mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn workspace_bundle_round_trips_with_digest_check() {
    let src_workspace = temp_dir("halaqad-backup-src");
    let dst_workspace = temp_dir("halaqad-backup-dst");
    let bundle_path = src_workspace.join("halaqa-backup.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": src_workspace.to_string_lossy() }),
    );
    let circle = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "circles.create",
        json!({ "name": "حلقة الظهر" }),
    );
    let circle_id = circle
        .get("circleId")
        .and_then(|v| v.as_str())
        .expect("circleId")
        .to_string();

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": src_workspace.to_string_lossy(),
            "outPath": bundle_path.to_string_lossy()
        }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("halaqa-workspace-v1")
    );
    let digest = exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .expect("digest")
        .to_string();
    assert_eq!(digest.len(), 64);

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": dst_workspace.to_string_lossy(),
            "inPath": bundle_path.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("dbSha256").and_then(|v| v.as_str()),
        Some(digest.as_str())
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": dst_workspace.to_string_lossy() }),
    );
    let circles = request_ok(&mut stdin, &mut reader, "6", "circles.list", json!({}));
    let rows = circles
        .get("circles")
        .and_then(|v| v.as_array())
        .expect("circles");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("id").and_then(|v| v.as_str()),
        Some(circle_id.as_str())
    );

    // A non-bundle input is refused.
    let junk = src_workspace.join("not-a-bundle.zip");
    std::fs::write(&junk, b"plain bytes").expect("write junk");
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": dst_workspace.to_string_lossy(),
            "inPath": junk.to_string_lossy()
        }),
    );
    assert_eq!(code, "backup_import_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(src_workspace);
    let _ = std::fs::remove_dir_all(dst_workspace);
}
