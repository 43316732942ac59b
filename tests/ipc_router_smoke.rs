mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("halaqad-router-smoke");
    let bundle_out = workspace.join("smoke-backup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "circles.create",
        json!({ "name": "Smoke Circle" }),
    );
    let circle_id = created
        .get("circleId")
        .and_then(|v| v.as_str())
        .expect("circleId")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "4", "circles.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "circles.setActive",
        json!({ "circleId": circle_id, "active": true }),
    );

    let created_student = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.create",
        json!({ "circleId": circle_id, "name": "Smoke Student" }),
    );
    let student_id = created_student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.list",
        json!({ "circleId": circle_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.update",
        json!({ "studentId": student_id, "patch": { "guardianPhone": "0500000000" } }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "collective.preview",
        json!({ "circleId": circle_id, "date": "2025-03-02", "text": "Smoke Student: سورة 1-3" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "collective.submit",
        json!({ "circleId": circle_id, "date": "2025-03-02", "text": "Smoke Student: سورة 1-3" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "reports.add",
        json!({
            "studentId": student_id,
            "date": "2025-03-03",
            "surah": "سورة",
            "fromVerse": 1,
            "toVerse": 2,
            "repeatType": "review",
            "grade": "good"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "reports.list",
        json!({ "circleId": circle_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "attendance.markDay",
        json!({ "circleId": circle_id, "date": "2025-03-03", "entries": [] }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.list",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "15",
        "analytics.attendanceStats",
        json!({ "studentId": student_id, "from": "2025-03-01", "to": "2025-03-31" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "analytics.studentStats",
        json!({ "studentId": student_id, "asOf": "2025-03-20" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "analytics.centerRate",
        json!({ "asOf": "2025-03-20" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "enrollments.add",
        json!({ "studentId": student_id, "courseName": "Smoke Course" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "19",
        "testScores.add",
        json!({ "studentId": student_id, "testName": "Smoke Test", "score": 8.0, "maxScore": 10.0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "achievements.evaluate",
        json!({ "studentId": student_id, "asOf": "2025-03-20" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "achievements.list",
        json!({ "studentId": student_id }),
    );
    let _ = request(&mut stdin, &mut reader, "22", "settings.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "settings.update",
        json!({ "excludedWeekday": 4 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
