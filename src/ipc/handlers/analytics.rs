use crate::db;
use crate::ingest::AttendanceStatus;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::stats::{self, AttendanceRecord, AttendanceStats, VerseRange};
use chrono::{Duration, NaiveDate, Weekday};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

fn parse_date(req: &Request, raw: &str) -> Result<NaiveDate, serde_json::Value> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        err(
            &req.id,
            "bad_date",
            format!("invalid date '{}', expected YYYY-MM-DD", raw),
            None,
        )
    })
}

/// `asOf` pins the trailing windows for deterministic queries; the caller's
/// "today" is only the default.
fn as_of_date(req: &Request) -> Result<NaiveDate, serde_json::Value> {
    match req.params.get("asOf").and_then(|v| v.as_str()) {
        Some(raw) => parse_date(req, raw),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn db_failure(req: &Request, e: rusqlite::Error) -> serde_json::Value {
    err(&req.id, "db_query_failed", e.to_string(), None)
}

fn config_failure(req: &Request, e: anyhow::Error) -> serde_json::Value {
    err(&req.id, "bad_config", format!("{e:#}"), None)
}

fn student_exists(
    conn: &Connection,
    req: &Request,
    student_id: &str,
) -> Result<(), serde_json::Value> {
    let found = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| db_failure(req, e))?
        .is_some();
    if found {
        Ok(())
    } else {
        Err(err(&req.id, "not_found", "student not found", None))
    }
}

fn attendance_records(
    conn: &Connection,
    req: &Request,
    student_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<AttendanceRecord>, serde_json::Value> {
    let mut stmt = conn
        .prepare(
            "SELECT date, status FROM attendance
             WHERE student_id = ? AND date >= ? AND date <= ?",
        )
        .map_err(|e| db_failure(req, e))?;
    let rows: Vec<(String, String)> = stmt
        .query_map(
            (
                student_id,
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string(),
            ),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| db_failure(req, e))?;
    Ok(rows
        .into_iter()
        .filter_map(|(date, status)| {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").ok()?;
            let status = AttendanceStatus::from_code(&status)?;
            Some(AttendanceRecord { date, status })
        })
        .collect())
}

fn windowed_attendance_stats(
    conn: &Connection,
    req: &Request,
    student_id: &str,
    as_of: NaiveDate,
    excluded: Weekday,
) -> Result<AttendanceStats, serde_json::Value> {
    let start = as_of - Duration::days(30);
    let records = attendance_records(conn, req, student_id, start, as_of)?;
    Ok(stats::attendance_stats(&records, excluded))
}

fn handle_attendance_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = db_conn(state, req)?;
        let student_id = required_str(req, "studentId")?;
        let from = parse_date(req, &required_str(req, "from")?)?;
        let to = parse_date(req, &required_str(req, "to")?)?;
        student_exists(conn, req, &student_id)?;
        let excluded = db::load_excluded_weekday(conn).map_err(|e| config_failure(req, e))?;
        let records = attendance_records(conn, req, &student_id, from, to)?;
        let stats = stats::attendance_stats(&records, excluded);
        serde_json::to_value(stats)
            .map_err(|e| err(&req.id, "internal", e.to_string(), None))
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

fn handle_student_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = db_conn(state, req)?;
        let student_id = required_str(req, "studentId")?;
        student_exists(conn, req, &student_id)?;
        let as_of = as_of_date(req)?;
        let start = as_of - Duration::days(30);
        let excluded = db::load_excluded_weekday(conn).map_err(|e| config_failure(req, e))?;

        let mut stmt = conn
            .prepare(
                "SELECT from_verse, to_verse FROM reports
                 WHERE student_id = ? AND date >= ? AND date <= ?",
            )
            .map_err(|e| db_failure(req, e))?;
        let monthly_reports: Vec<VerseRange> = stmt
            .query_map(
                (
                    &student_id,
                    start.format("%Y-%m-%d").to_string(),
                    as_of.format("%Y-%m-%d").to_string(),
                ),
                |r| {
                    Ok(VerseRange {
                        from_verse: r.get::<_, i64>(0)?.max(0) as u32,
                        to_verse: r.get::<_, i64>(1)?.max(0) as u32,
                    })
                },
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| db_failure(req, e))?;

        let lifetime: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reports WHERE student_id = ?",
                [&student_id],
                |r| r.get(0),
            )
            .map_err(|e| db_failure(req, e))?;

        let attendance = attendance_records(conn, req, &student_id, start, as_of)?;
        let bundle = stats::student_stats(
            &monthly_reports,
            &attendance,
            lifetime.max(0) as u64,
            excluded,
        );
        let mut result = serde_json::to_value(&bundle)
            .map_err(|e| err(&req.id, "internal", e.to_string(), None))?;
        result["studentId"] = json!(student_id);
        result["asOf"] = json!(as_of.format("%Y-%m-%d").to_string());
        Ok(result)
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

fn handle_center_rate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let run = || -> Result<serde_json::Value, serde_json::Value> {
        let conn = db_conn(state, req)?;
        let as_of = as_of_date(req)?;
        let excluded = db::load_excluded_weekday(conn).map_err(|e| config_failure(req, e))?;

        let mut stmt = conn
            .prepare("SELECT id FROM students WHERE active = 1")
            .map_err(|e| db_failure(req, e))?;
        let student_ids: Vec<String> = stmt
            .query_map([], |r| r.get(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| db_failure(req, e))?;

        let mut per_student = Vec::with_capacity(student_ids.len());
        for student_id in &student_ids {
            per_student.push(windowed_attendance_stats(
                conn, req, student_id, as_of, excluded,
            )?);
        }
        let counted = per_student.iter().filter(|s| s.total_valid_days > 0).count();
        let rate = stats::center_attendance_rate(per_student);
        Ok(json!({
            "centerAttendanceRate": rate,
            "studentsCounted": counted,
            "asOf": as_of.format("%Y-%m-%d").to_string(),
        }))
    };
    match run() {
        Ok(result) => ok(&req.id, result),
        Err(resp) => resp,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.attendanceStats" => Some(handle_attendance_stats(state, req)),
        "analytics.studentStats" => Some(handle_student_stats(state, req)),
        "analytics.centerRate" => Some(handle_center_rate(state, req)),
        _ => None,
    }
}
