mod test_support;

use serde_json::json;
use test_support::{request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn invalid_configuration_is_rejected_whole() {
    let workspace = temp_dir("halaqad-settings");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // Defaults are seeded at workspace open.
    let initial = request_ok(&mut stdin, &mut reader, "2", "settings.get", json!({}));
    assert_eq!(
        initial.get("excludedWeekday").and_then(|v| v.as_u64()),
        Some(4)
    );
    let excused = initial
        .get("ingestKeywords")
        .and_then(|v| v.get("excused"))
        .and_then(|v| v.as_array())
        .expect("excused keywords");
    assert!(!excused.is_empty());

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "settings.update",
        json!({ "excludedWeekday": 9 }),
    );
    assert_eq!(code, "bad_config");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "settings.update",
        json!({ "achievementThresholds": {
            "excellentGrades": 2,
            "verseMilestone": 10,
            "presentDays": 0,
            "presentWindowDays": 30,
            "testScorePercent": 50.0
        }}),
    );
    assert_eq!(code, "bad_config");

    // A batch with one invalid blob writes nothing, even for the valid part.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "settings.update",
        json!({
            "excludedWeekday": 2,
            "achievementThresholds": { "excellentGrades": 0 }
        }),
    );
    assert_eq!(code, "bad_config");
    let after = request_ok(&mut stdin, &mut reader, "6", "settings.get", json!({}));
    assert_eq!(
        after.get("excludedWeekday").and_then(|v| v.as_u64()),
        Some(4)
    );

    // Keyword tables with an empty set are unusable for classification.
    let mut keywords = after.get("ingestKeywords").cloned().expect("keywords");
    keywords["fled"] = json!([]);
    let code = request_err(
        &mut stdin,
        &mut reader,
        "7",
        "settings.update",
        json!({ "ingestKeywords": keywords }),
    );
    assert_eq!(code, "bad_config");

    // A valid update round-trips.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "settings.update",
        json!({ "excludedWeekday": 5 }),
    );
    let after = request_ok(&mut stdin, &mut reader, "9", "settings.get", json!({}));
    assert_eq!(
        after.get("excludedWeekday").and_then(|v| v.as_u64()),
        Some(5)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
