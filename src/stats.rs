use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;

use crate::ingest::AttendanceStatus;

/// 2-decimal percentage rounding used everywhere a rate is reported.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Weekday index as stored in settings: Monday = 0 .. Sunday = 6.
pub fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Mon),
        1 => Some(Weekday::Tue),
        2 => Some(Weekday::Wed),
        3 => Some(Weekday::Thu),
        4 => Some(Weekday::Fri),
        5 => Some(Weekday::Sat),
        6 => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_to_index(weekday: Weekday) -> u8 {
    weekday.num_days_from_monday() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceStats {
    pub present_count: u32,
    pub excused_count: u32,
    pub unexcused_count: u32,
    pub fled_count: u32,
    pub not_heard_count: u32,
    pub late_count: u32,
    pub total_valid_days: u32,
    pub attendance_rate_percent: f64,
}

/// Tallies attendance records into per-status counts and a presence rate.
///
/// Records dated on the excluded weekday do not count as valid days at all:
/// the center never convenes that day, so marks recorded on it (bulk stamps,
/// stray imports) must not dilute the rate. Zero valid days yields a zero
/// rate, never an error.
pub fn attendance_stats(records: &[AttendanceRecord], excluded_weekday: Weekday) -> AttendanceStats {
    let mut stats = AttendanceStats::default();
    for rec in records {
        if rec.date.weekday() == excluded_weekday {
            continue;
        }
        stats.total_valid_days += 1;
        match rec.status {
            AttendanceStatus::Present => stats.present_count += 1,
            AttendanceStatus::ExcusedAbsent => stats.excused_count += 1,
            AttendanceStatus::UnexcusedAbsent => stats.unexcused_count += 1,
            AttendanceStatus::Fled => stats.fled_count += 1,
            AttendanceStatus::NotHeard => stats.not_heard_count += 1,
            AttendanceStatus::Late => stats.late_count += 1,
        }
    }
    if stats.total_valid_days > 0 {
        stats.attendance_rate_percent = round2(
            f64::from(stats.present_count) / f64::from(stats.total_valid_days) * 100.0,
        );
    }
    stats
}

/// Mean of the per-student rates, counting only students with at least one
/// valid day in their window. Zero when nobody qualifies.
pub fn center_attendance_rate<I>(per_student: I) -> f64
where
    I: IntoIterator<Item = AttendanceStats>,
{
    let mut total = 0.0;
    let mut counted = 0u32;
    for stats in per_student {
        if stats.total_valid_days > 0 {
            total += stats.attendance_rate_percent;
            counted += 1;
        }
    }
    if counted > 0 {
        round2(total / f64::from(counted))
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerseRange {
    pub from_verse: u32,
    pub to_verse: u32,
}

/// Inclusive verse count over a set of ranges.
pub fn verse_total(ranges: &[VerseRange]) -> u64 {
    ranges
        .iter()
        .map(|r| u64::from(r.to_verse.saturating_sub(r.from_verse)) + 1)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub monthly_report_count: usize,
    pub monthly_verse_count: u64,
    pub monthly_attendance: AttendanceStats,
    pub lifetime_report_count: u64,
}

/// Bundles the 30-day-trailing aggregates the dashboards show per student.
/// The caller supplies the windowed snapshots; everything here is pure
/// arithmetic and tolerates empty input.
pub fn student_stats(
    monthly_reports: &[VerseRange],
    monthly_attendance: &[AttendanceRecord],
    lifetime_report_count: u64,
    excluded_weekday: Weekday,
) -> StudentStats {
    StudentStats {
        monthly_report_count: monthly_reports.len(),
        monthly_verse_count: verse_total(monthly_reports),
        monthly_attendance: attendance_stats(monthly_attendance, excluded_weekday),
        lifetime_report_count,
    }
}
