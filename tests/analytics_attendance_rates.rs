mod test_support;

use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn attendance_rates_exclude_the_configured_weekday() {
    let workspace = temp_dir("halaqad-analytics-rates");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let circle = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "circles.create",
        json!({ "name": "حلقة العصر" }),
    );
    let circle_id = circle
        .get("circleId")
        .and_then(|v| v.as_str())
        .expect("circleId")
        .to_string();
    let s1 = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "circleId": circle_id, "name": "أحمد علي" }),
    );
    let s1 = s1.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();
    let s2 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "students.create",
        json!({ "circleId": circle_id, "name": "خالد سالم" }),
    );
    let s2 = s2.get("studentId").and_then(|v| v.as_str()).expect("id").to_string();

    // Wednesday and Thursday count; Friday 2025-03-07 must not.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "attendance.markDay",
        json!({
            "circleId": circle_id,
            "date": "2025-03-05",
            "entries": [{ "studentId": s2, "status": "excused_absent" }]
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "attendance.markDay",
        json!({ "circleId": circle_id, "date": "2025-03-06", "entries": [] }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "attendance.markDay",
        json!({ "circleId": circle_id, "date": "2025-03-07", "entries": [] }),
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "analytics.attendanceStats",
        json!({ "studentId": s1, "from": "2025-03-01", "to": "2025-03-31" }),
    );
    assert_eq!(stats.get("totalValidDays").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("presentCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        stats.get("attendanceRatePercent").and_then(|v| v.as_f64()),
        Some(100.0)
    );

    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "analytics.attendanceStats",
        json!({ "studentId": s2, "from": "2025-03-01", "to": "2025-03-31" }),
    );
    assert_eq!(stats.get("totalValidDays").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("presentCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats.get("excusedCount").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        stats.get("attendanceRatePercent").and_then(|v| v.as_f64()),
        Some(50.0)
    );

    // A range holding only excluded-weekday records yields zero valid days.
    let stats = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "analytics.attendanceStats",
        json!({ "studentId": s1, "from": "2025-03-07", "to": "2025-03-07" }),
    );
    assert_eq!(stats.get("totalValidDays").and_then(|v| v.as_u64()), Some(0));
    assert_eq!(
        stats.get("attendanceRatePercent").and_then(|v| v.as_f64()),
        Some(0.0)
    );

    let center = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "analytics.centerRate",
        json!({ "asOf": "2025-03-20" }),
    );
    assert_eq!(
        center.get("centerAttendanceRate").and_then(|v| v.as_f64()),
        Some(75.0)
    );
    assert_eq!(center.get("studentsCounted").and_then(|v| v.as_u64()), Some(2));

    // Student bundle: one report inside the trailing window.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "reports.add",
        json!({
            "studentId": s1,
            "date": "2025-03-10",
            "surah": "النبأ",
            "fromVerse": 1,
            "toVerse": 7,
            "repeatType": "new_memorization",
            "grade": "good"
        }),
    );
    let bundle = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "analytics.studentStats",
        json!({ "studentId": s1, "asOf": "2025-03-20" }),
    );
    assert_eq!(
        bundle.get("monthlyReportCount").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        bundle.get("monthlyVerseCount").and_then(|v| v.as_u64()),
        Some(7)
    );
    assert_eq!(
        bundle.get("lifetimeReportCount").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        bundle
            .get("monthlyAttendance")
            .and_then(|v| v.get("totalValidDays"))
            .and_then(|v| v.as_u64()),
        Some(2)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
