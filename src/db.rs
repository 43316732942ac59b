use anyhow::{anyhow, Context};
use chrono::Weekday;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::achievements::AchievementThresholds;
use crate::ingest::KeywordTable;
use crate::stats;

pub const DB_FILE: &str = "halaqa.sqlite3";

pub const KEY_INGEST_KEYWORDS: &str = "ingest.keywords";
pub const KEY_EXCLUDED_WEEKDAY: &str = "stats.excludedWeekday";
pub const KEY_ACHIEVEMENT_THRESHOLDS: &str = "achievements.thresholds";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS circles(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_name TEXT,
            active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            circle_id TEXT NOT NULL,
            name TEXT NOT NULL,
            guardian_phone TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(circle_id) REFERENCES circles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_circle ON students(circle_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_circle_sort ON students(circle_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            circle_id TEXT NOT NULL,
            date TEXT NOT NULL,
            surah TEXT NOT NULL,
            from_verse INTEGER NOT NULL,
            to_verse INTEGER NOT NULL,
            repeat_type TEXT NOT NULL,
            grade TEXT NOT NULL,
            note TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(circle_id) REFERENCES circles(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_student_date ON reports(student_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reports_circle_date ON reports(circle_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            note TEXT,
            UNIQUE(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_name TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            test_name TEXT NOT NULL,
            score REAL NOT NULL,
            max_score REAL NOT NULL,
            date TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_scores_student ON test_scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS achievements(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            achievement TEXT NOT NULL,
            awarded_on TEXT NOT NULL,
            UNIQUE(student_id, achievement),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_achievements_student ON achievements(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    seed_default_settings(&conn)?;

    Ok(conn)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => {
            let value = serde_json::from_str(&text)
                .with_context(|| format!("settings value for '{}' is not valid JSON", key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Seeds the source deployment's defaults for any missing configuration key,
/// leaving existing values untouched.
fn seed_default_settings(conn: &Connection) -> anyhow::Result<()> {
    let seed = |key: &str, value: serde_json::Value| -> anyhow::Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO settings(key, value) VALUES(?, ?)",
            (key, serde_json::to_string(&value)?),
        )?;
        Ok(())
    };
    seed(
        KEY_INGEST_KEYWORDS,
        serde_json::to_value(KeywordTable::default())?,
    )?;
    seed(
        KEY_EXCLUDED_WEEKDAY,
        serde_json::Value::from(u64::from(stats::weekday_to_index(Weekday::Fri))),
    )?;
    seed(
        KEY_ACHIEVEMENT_THRESHOLDS,
        serde_json::to_value(AchievementThresholds::default())?,
    )?;
    Ok(())
}

// The typed loaders fail loudly on a missing or malformed blob. The engines
// are handed an already-validated value and never fall back to a hidden
// default at call time.

pub fn load_keyword_table(conn: &Connection) -> anyhow::Result<KeywordTable> {
    let raw = settings_get_json(conn, KEY_INGEST_KEYWORDS)?
        .ok_or_else(|| anyhow!("missing setting '{}'", KEY_INGEST_KEYWORDS))?;
    let table: KeywordTable = serde_json::from_value(raw)
        .with_context(|| format!("setting '{}' has the wrong shape", KEY_INGEST_KEYWORDS))?;
    table
        .validate()
        .map_err(|e| anyhow!("setting '{}': {}", KEY_INGEST_KEYWORDS, e))?;
    Ok(table)
}

pub fn load_excluded_weekday(conn: &Connection) -> anyhow::Result<Weekday> {
    let raw = settings_get_json(conn, KEY_EXCLUDED_WEEKDAY)?
        .ok_or_else(|| anyhow!("missing setting '{}'", KEY_EXCLUDED_WEEKDAY))?;
    let index = raw
        .as_u64()
        .ok_or_else(|| anyhow!("setting '{}' must be an integer", KEY_EXCLUDED_WEEKDAY))?;
    u8::try_from(index)
        .ok()
        .and_then(stats::weekday_from_index)
        .ok_or_else(|| {
            anyhow!(
                "setting '{}' must be 0..=6 (Monday = 0), got {}",
                KEY_EXCLUDED_WEEKDAY,
                index
            )
        })
}

pub fn load_achievement_thresholds(conn: &Connection) -> anyhow::Result<AchievementThresholds> {
    let raw = settings_get_json(conn, KEY_ACHIEVEMENT_THRESHOLDS)?
        .ok_or_else(|| anyhow!("missing setting '{}'", KEY_ACHIEVEMENT_THRESHOLDS))?;
    let thresholds: AchievementThresholds = serde_json::from_value(raw).with_context(|| {
        format!(
            "setting '{}' has the wrong shape",
            KEY_ACHIEVEMENT_THRESHOLDS
        )
    })?;
    thresholds
        .validate()
        .map_err(|e| anyhow!("setting '{}': {}", KEY_ACHIEVEMENT_THRESHOLDS, e))?;
    Ok(thresholds)
}
