use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Note attached to attendance rows produced by the collective parser, so the
/// attendance screen can tell them apart from manually marked days.
pub const IMPORT_NOTE: &str = "تم الإضافة من التقرير الجماعي";

/// Connectors accepted between the two verse numbers of a range.
/// Teachers type the ASCII hyphen, the tatweel, or an en dash interchangeably.
const RANGE_CONNECTORS: [char; 3] = ['-', 'ـ', '–'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    ExcusedAbsent,
    UnexcusedAbsent,
    Fled,
    NotHeard,
    Late,
}

impl AttendanceStatus {
    pub fn code(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::ExcusedAbsent => "excused_absent",
            AttendanceStatus::UnexcusedAbsent => "unexcused_absent",
            AttendanceStatus::Fled => "fled",
            AttendanceStatus::NotHeard => "not_heard",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "present" => Some(AttendanceStatus::Present),
            "excused_absent" => Some(AttendanceStatus::ExcusedAbsent),
            "unexcused_absent" => Some(AttendanceStatus::UnexcusedAbsent),
            "fled" => Some(AttendanceStatus::Fled),
            "not_heard" => Some(AttendanceStatus::NotHeard),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    NewMemorization,
    Review,
}

impl RepeatType {
    pub fn code(self) -> &'static str {
        match self {
            RepeatType::NewMemorization => "new_memorization",
            RepeatType::Review => "review",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "new_memorization" => Some(RepeatType::NewMemorization),
            "review" => Some(RepeatType::Review),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    VeryGood,
    Good,
    Acceptable,
}

impl Grade {
    pub fn code(self) -> &'static str {
        match self {
            Grade::Excellent => "excellent",
            Grade::VeryGood => "very_good",
            Grade::Good => "good",
            Grade::Acceptable => "acceptable",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "excellent" => Some(Grade::Excellent),
            "very_good" => Some(Grade::VeryGood),
            "good" => Some(Grade::Good),
            "acceptable" => Some(Grade::Acceptable),
            _ => None,
        }
    }
}

/// Keyword/emoji tables driving line classification and recitation grading.
///
/// These are data, not code: the whole table is stored as a settings blob and
/// an alternate language's table can be substituted wholesale. Keywords for
/// cased scripts should be stored lowercase; lines are case-folded before
/// matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordTable {
    pub excused: Vec<String>,
    pub unexcused: Vec<String>,
    pub fled: Vec<String>,
    pub not_heard: Vec<String>,
    pub late: Vec<String>,
    pub review: Vec<String>,
    pub excellent: Vec<String>,
    pub very_good: Vec<String>,
    pub acceptable: Vec<String>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        KeywordTable {
            excused: list(&["✖️", "غائب بعذر", "مستأذن", "غياب", "غائب"]),
            unexcused: list(&["❌", "غائب بلا عذر"]),
            fled: list(&["هروب", "🏃"]),
            not_heard: list(&["لم يسمع"]),
            late: list(&["متأخر", "تأخر"]),
            review: list(&["مراجعة"]),
            excellent: list(&["ممتاز"]),
            very_good: list(&["جيد جدا", "جيد جداً"]),
            acceptable: list(&["مقبول"]),
        }
    }
}

impl KeywordTable {
    /// A usable table needs at least one keyword per signal. Empty lists are
    /// a configuration error surfaced at settings-update time, not at parse
    /// time.
    pub fn validate(&self) -> Result<(), String> {
        let sets: [(&str, &Vec<String>); 9] = [
            ("excused", &self.excused),
            ("unexcused", &self.unexcused),
            ("fled", &self.fled),
            ("notHeard", &self.not_heard),
            ("late", &self.late),
            ("review", &self.review),
            ("excellent", &self.excellent),
            ("veryGood", &self.very_good),
            ("acceptable", &self.acceptable),
        ];
        for (name, set) in sets {
            if set.is_empty() || set.iter().any(|k| k.trim().is_empty()) {
                return Err(format!("keyword set '{}' must not be empty", name));
            }
        }
        Ok(())
    }

    fn status_sets(&self) -> [(&[String], AttendanceStatus); 5] {
        [
            (&self.excused[..], AttendanceStatus::ExcusedAbsent),
            (&self.unexcused[..], AttendanceStatus::UnexcusedAbsent),
            (&self.fled[..], AttendanceStatus::Fled),
            (&self.not_heard[..], AttendanceStatus::NotHeard),
            (&self.late[..], AttendanceStatus::Late),
        ]
    }
}

/// One active student of the circle being reported on. The roster snapshot is
/// read-only input; ordering is the roster's iteration order and decides
/// fuzzy-match ties.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: String,
    pub name: String,
}

/// Strips everything that is not a word character or whitespace, trims, and
/// case-folds. Folding is a no-op for unicased scripts, so Arabic names pass
/// through unchanged apart from punctuation removal.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// First roster entry whose normalized name equals, contains, or is contained
/// by the normalized fragment. The first hit in roster order wins; an exact
/// match later in the roster does NOT beat an earlier substring match.
pub fn resolve_student<'a>(fragment: &str, roster: &'a [RosterEntry]) -> Option<&'a RosterEntry> {
    let needle = normalize_name(fragment);
    if needle.is_empty() {
        return None;
    }
    roster.iter().find(|entry| {
        let candidate = normalize_name(&entry.name);
        !candidate.is_empty()
            && (candidate == needle || candidate.contains(&needle) || needle.contains(&candidate))
    })
}

/// Detects an attendance-exception signal anywhere in the line. Sets are
/// checked in fixed priority; the first set with a hit decides the status.
pub fn classify_line(line: &str, keywords: &KeywordTable) -> Option<AttendanceStatus> {
    let folded = line.to_lowercase();
    for (set, status) in keywords.status_sets() {
        if set.iter().any(|k| folded.contains(&k.to_lowercase())) {
            return Some(status);
        }
    }
    None
}

/// Drops leading bullet/numbering decoration: digits, asterisks, bullet
/// characters, dashes, hashes, dots, and whitespace.
pub fn strip_decoration(line: &str) -> &str {
    line.trim_start_matches(|c: char| {
        c.is_numeric() || c.is_whitespace() || matches!(c, '*' | '🔹' | '•' | '-' | '#' | '.')
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecitationEntry {
    pub surah: String,
    pub from_verse: u32,
    pub to_verse: u32,
    pub repeat_type: RepeatType,
    pub grade: Grade,
}

fn digit_value(c: char) -> Option<u32> {
    match c {
        '0'..='9' => Some(c as u32 - '0' as u32),
        // Arabic-Indic and extended (Persian) digits, both common on phones.
        '٠'..='٩' => Some(c as u32 - '٠' as u32),
        '۰'..='۹' => Some(c as u32 - '۰' as u32),
        _ => None,
    }
}

fn contains_any(folded: &str, set: &[String]) -> bool {
    set.iter().any(|k| folded.contains(&k.to_lowercase()))
}

fn contains_status_keyword(folded: &str, keywords: &KeywordTable) -> bool {
    keywords
        .status_sets()
        .iter()
        .any(|(set, _)| contains_any(folded, set))
}

/// Parses the recitation half of a line into (surah, verse range, repeat
/// type, grade).
///
/// The shape recognized is `<label> <from><connector><to> [+] [grade words]`,
/// scanning left to right for the first digit run that has a non-empty label
/// before it and a connected second run after it. Text carrying any
/// attendance keyword never yields a report; the attendance signal was
/// already taken from the full line.
pub fn extract_recitation(text: &str, keywords: &KeywordTable) -> Option<RecitationEntry> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let folded = trimmed.to_lowercase();
    if contains_status_keyword(&folded, keywords) {
        return None;
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let mut segment_start = 0usize;
    let mut i = 0usize;
    while i < chars.len() {
        if digit_value(chars[i]).is_none() {
            i += 1;
            continue;
        }

        let run_start = i;
        let mut from_verse: u64 = 0;
        while i < chars.len() {
            match digit_value(chars[i]) {
                Some(d) => {
                    from_verse = from_verse.saturating_mul(10).saturating_add(u64::from(d));
                    i += 1;
                }
                None => break,
            }
        }

        // The label is whatever sits between the previous digit run (or the
        // last '+') and this run. A run with no label cannot start a range.
        let prefix: String = chars[segment_start..run_start].iter().collect();
        let label = match prefix.rfind('+') {
            Some(p) => prefix[p + '+'.len_utf8()..].trim().to_string(),
            None => prefix.trim().to_string(),
        };
        segment_start = i;
        if label.is_empty() {
            continue;
        }

        let mut j = i;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j >= chars.len() || !RANGE_CONNECTORS.contains(&chars[j]) {
            continue;
        }
        j += 1;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        let second_start = j;
        let mut to_verse: u64 = 0;
        while j < chars.len() {
            match digit_value(chars[j]) {
                Some(d) => {
                    to_verse = to_verse.saturating_mul(10).saturating_add(u64::from(d));
                    j += 1;
                }
                None => break,
            }
        }
        if j == second_start {
            continue;
        }

        let mut k = j;
        while k < chars.len() && chars[k].is_whitespace() {
            k += 1;
        }
        let plus_marker = k < chars.len() && chars[k] == '+';

        // Degenerate ranges are treated as a pattern failure: the line is
        // dropped rather than recorded with an impossible span.
        if from_verse == 0
            || to_verse < from_verse
            || to_verse > u64::from(u32::MAX)
        {
            return None;
        }

        let repeat_type = if plus_marker
            || trimmed.contains('+')
            || contains_any(&folded, &keywords.review)
        {
            RepeatType::Review
        } else {
            RepeatType::NewMemorization
        };

        let grade = if contains_any(&folded, &keywords.excellent) {
            Grade::Excellent
        } else if contains_any(&folded, &keywords.very_good) {
            Grade::VeryGood
        } else if contains_any(&folded, &keywords.acceptable) {
            Grade::Acceptable
        } else {
            Grade::Good
        };

        return Some(RecitationEntry {
            surah: label,
            from_verse: from_verse as u32,
            to_verse: to_verse as u32,
            repeat_type,
            grade,
        });
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoColon,
    UnknownStudent,
    NoPattern,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedLine {
    pub line_no: usize,
    pub text: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedReport {
    pub student_id: String,
    pub surah: String,
    pub from_verse: u32,
    pub to_verse: u32,
    pub repeat_type: RepeatType,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAttendance {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub note: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseOutcome {
    pub reports: Vec<ParsedReport>,
    pub attendance: Vec<ParsedAttendance>,
    pub skipped: Vec<SkippedLine>,
}

/// Malformed session date. This is the one fatal error of the parser: the
/// whole call fails and nothing is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadDate(pub String);

impl fmt::Display for BadDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid session date '{}', expected YYYY-MM-DD", self.0)
    }
}

impl std::error::Error for BadDate {}

fn strip_status_keywords(text: &str, keywords: &KeywordTable) -> String {
    let mut out = text.to_lowercase();
    for (set, _) in keywords.status_sets() {
        for k in set {
            let folded = k.to_lowercase();
            if !folded.is_empty() {
                out = out.replace(&folded, " ");
            }
        }
    }
    out
}

/// Converts one teacher-typed collective report into structured records.
///
/// Best-effort import: lines that cannot be attributed to a student or
/// matched against the recitation shape are dropped, continue processing,
/// and come back in `skipped` so callers can show "N lines ignored". Output
/// order follows input line order and the function is deterministic for a
/// given input.
pub fn parse_collective_report(
    text: &str,
    roster: &[RosterEntry],
    date: &str,
    keywords: &KeywordTable,
) -> Result<ParseOutcome, BadDate> {
    let session_date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| BadDate(date.to_string()))?;

    let mut outcome = ParseOutcome::default();
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let status = classify_line(line, keywords);
        let remainder = strip_decoration(line);

        let skip = |reason: SkipReason| SkippedLine {
            line_no,
            text: line.to_string(),
            reason,
        };

        match remainder.split_once(':') {
            Some((name_part, recitation_part)) => {
                let Some(student) = resolve_student(name_part, roster) else {
                    outcome.skipped.push(skip(SkipReason::UnknownStudent));
                    continue;
                };
                let mut produced = false;
                if let Some(status) = status {
                    outcome.attendance.push(ParsedAttendance {
                        student_id: student.id.clone(),
                        date: session_date,
                        status,
                        note: IMPORT_NOTE.to_string(),
                    });
                    produced = true;
                }
                if let Some(entry) = extract_recitation(recitation_part, keywords) {
                    outcome.reports.push(ParsedReport {
                        student_id: student.id.clone(),
                        surah: entry.surah,
                        from_verse: entry.from_verse,
                        to_verse: entry.to_verse,
                        repeat_type: entry.repeat_type,
                        grade: entry.grade,
                    });
                    produced = true;
                }
                if !produced {
                    outcome.skipped.push(skip(SkipReason::NoPattern));
                }
            }
            None => {
                // "خالد ✖️"-style lines: no colon, but an attendance signal.
                // What remains after removing the signal words is the name.
                let Some(status) = status else {
                    outcome.skipped.push(skip(SkipReason::NoColon));
                    continue;
                };
                let candidate = strip_status_keywords(remainder, keywords);
                match resolve_student(&candidate, roster) {
                    Some(student) => outcome.attendance.push(ParsedAttendance {
                        student_id: student.id.clone(),
                        date: session_date,
                        status,
                        note: IMPORT_NOTE.to_string(),
                    }),
                    None => outcome.skipped.push(skip(SkipReason::UnknownStudent)),
                }
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry {
                id: "s1".into(),
                name: "Ahmed Ali".into(),
            },
            RosterEntry {
                id: "s2".into(),
                name: "Mohammed Ahmed".into(),
            },
        ]
    }

    fn arabic_roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry {
                id: "s1".into(),
                name: "أحمد علي".into(),
            },
            RosterEntry {
                id: "s2".into(),
                name: "خالد سالم".into(),
            },
        ]
    }

    #[test]
    fn normalize_strips_punctuation_and_folds_case() {
        assert_eq!(normalize_name("  Ahmed-Ali! "), "ahmedali");
        assert_eq!(normalize_name("أحمد، علي"), "أحمد علي");
        assert_eq!(normalize_name("..."), "");
    }

    #[test]
    fn resolver_returns_first_containment_hit_in_roster_order() {
        // "Ahmed" is contained in both names; the first roster entry wins,
        // even though the second contains it as a standalone word too.
        let r = roster();
        let hit = resolve_student("Ahmed", &r).expect("match");
        assert_eq!(hit.id, "s1");

        // A fragment containing a full roster name matches that entry.
        let hit = resolve_student("Mohammed Ahmed (new)", &r).expect("match");
        assert_eq!(hit.id, "s2");
    }

    #[test]
    fn resolver_no_match_and_empty_fragment() {
        let r = roster();
        assert!(resolve_student("Yusuf", &r).is_none());
        assert!(resolve_student("   ", &r).is_none());
        assert!(resolve_student("،؟!", &r).is_none());
    }

    #[test]
    fn classifier_priority_excused_wins_over_fled() {
        let kw = KeywordTable::default();
        // Both signals present: excused is checked first.
        assert_eq!(
            classify_line("أحمد غائب ثم هروب", &kw),
            Some(AttendanceStatus::ExcusedAbsent)
        );
        assert_eq!(
            classify_line("أحمد ❌", &kw),
            Some(AttendanceStatus::UnexcusedAbsent)
        );
        assert_eq!(classify_line("أحمد 🏃", &kw), Some(AttendanceStatus::Fled));
        assert_eq!(
            classify_line("أحمد لم يسمع اليوم", &kw),
            Some(AttendanceStatus::NotHeard)
        );
        assert_eq!(
            classify_line("أحمد متأخر", &kw),
            Some(AttendanceStatus::Late)
        );
        assert_eq!(classify_line("أحمد: البقرة 1-5", &kw), None);
    }

    #[test]
    fn decoration_stripping() {
        assert_eq!(strip_decoration("1. أحمد: البقرة"), "أحمد: البقرة");
        assert_eq!(strip_decoration("- • #3 خالد"), "خالد");
        assert_eq!(strip_decoration("٣- أحمد"), "أحمد");
        assert_eq!(strip_decoration("أحمد - علي"), "أحمد - علي");
    }

    #[test]
    fn extract_plus_marker_means_review() {
        let kw = KeywordTable::default();
        let e = extract_recitation("سورة 1-5+", &kw).expect("entry");
        assert_eq!(e.surah, "سورة");
        assert_eq!(e.from_verse, 1);
        assert_eq!(e.to_verse, 5);
        assert_eq!(e.repeat_type, RepeatType::Review);
        assert_eq!(e.grade, Grade::Good);
    }

    #[test]
    fn extract_grade_keyword_and_default_repeat() {
        let kw = KeywordTable::default();
        let e = extract_recitation("سورة 10-12 ممتاز", &kw).expect("entry");
        assert_eq!(e.from_verse, 10);
        assert_eq!(e.to_verse, 12);
        assert_eq!(e.repeat_type, RepeatType::NewMemorization);
        assert_eq!(e.grade, Grade::Excellent);
    }

    #[test]
    fn extract_grade_precedence_is_fixed_not_positional() {
        let kw = KeywordTable::default();
        // "مقبول" appears first in the line but "ممتاز" has higher priority.
        let e = extract_recitation("البقرة 1-3 مقبول ممتاز", &kw).expect("entry");
        assert_eq!(e.grade, Grade::Excellent);
    }

    #[test]
    fn extract_review_keyword_without_plus() {
        let kw = KeywordTable::default();
        let e = extract_recitation("آل عمران 20-25 مراجعة", &kw).expect("entry");
        assert_eq!(e.repeat_type, RepeatType::Review);
    }

    #[test]
    fn extract_accepts_tatweel_connector_and_arabic_digits() {
        let kw = KeywordTable::default();
        let e = extract_recitation("النبأ ١ـ٤", &kw).expect("entry");
        assert_eq!(e.surah, "النبأ");
        assert_eq!(e.from_verse, 1);
        assert_eq!(e.to_verse, 4);
    }

    #[test]
    fn extract_rejects_degenerate_input() {
        let kw = KeywordTable::default();
        assert!(extract_recitation("", &kw).is_none());
        assert!(extract_recitation("سورة بلا أرقام", &kw).is_none());
        assert!(extract_recitation("سورة 5", &kw).is_none());
        // Inverted range is a pattern failure, not a report.
        assert!(extract_recitation("سورة 12-5", &kw).is_none());
        assert!(extract_recitation("سورة 0-3", &kw).is_none());
        // Attendance keyword in the recitation half suppresses the report.
        assert!(extract_recitation("غائب 1-5", &kw).is_none());
    }

    #[test]
    fn extract_skips_leading_number_noise() {
        let kw = KeywordTable::default();
        // First digit run has no label before it; the scan moves on.
        let e = extract_recitation("3 الكهف 1-10", &kw).expect("entry");
        assert_eq!(e.surah, "الكهف");
        assert_eq!(e.from_verse, 1);
        assert_eq!(e.to_verse, 10);
    }

    #[test]
    fn parser_round_trip_line_forms() {
        let kw = KeywordTable::default();
        let text = "أحمد علي: الملك 1-5+\n\n2. خالد: النبأ 10-12 ممتاز\n";
        let out = parse_collective_report(text, &arabic_roster(), "2025-03-02", &kw)
            .expect("parse");
        assert_eq!(out.reports.len(), 2);
        assert!(out.attendance.is_empty());
        assert!(out.skipped.is_empty());

        assert_eq!(out.reports[0].student_id, "s1");
        assert_eq!(out.reports[0].repeat_type, RepeatType::Review);
        assert_eq!(out.reports[1].student_id, "s2");
        assert_eq!(out.reports[1].grade, Grade::Excellent);
        assert_eq!(out.reports[1].repeat_type, RepeatType::NewMemorization);
    }

    #[test]
    fn parser_excused_line_without_colon_yields_attendance_only() {
        let kw = KeywordTable::default();
        let out = parse_collective_report("خالد ✖️", &arabic_roster(), "2025-03-02", &kw)
            .expect("parse");
        assert!(out.reports.is_empty());
        assert_eq!(out.attendance.len(), 1);
        assert_eq!(out.attendance[0].student_id, "s2");
        assert_eq!(out.attendance[0].status, AttendanceStatus::ExcusedAbsent);
        assert_eq!(out.attendance[0].note, IMPORT_NOTE);
    }

    #[test]
    fn parser_colon_line_with_status_keeps_attendance_drops_report() {
        let kw = KeywordTable::default();
        let out = parse_collective_report("أحمد: غائب بعذر", &arabic_roster(), "2025-03-02", &kw)
            .expect("parse");
        assert!(out.reports.is_empty());
        assert_eq!(out.attendance.len(), 1);
        assert_eq!(out.attendance[0].status, AttendanceStatus::ExcusedAbsent);
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn parser_counts_dropped_lines_with_reasons() {
        let kw = KeywordTable::default();
        let text = "مجهول: البقرة 1-5\nأحمد: كلام بلا أرقام\nسطر حر بلا فاصلة\n";
        let out = parse_collective_report(text, &arabic_roster(), "2025-03-02", &kw)
            .expect("parse");
        assert!(out.reports.is_empty());
        assert!(out.attendance.is_empty());
        let reasons: Vec<SkipReason> = out.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::UnknownStudent,
                SkipReason::NoPattern,
                SkipReason::NoColon
            ]
        );
        assert_eq!(out.skipped[0].line_no, 1);
        assert_eq!(out.skipped[2].line_no, 3);
    }

    #[test]
    fn parser_is_deterministic_and_order_preserving() {
        let kw = KeywordTable::default();
        let text = "خالد: النبأ 1-3\nأحمد علي: الملك 2-4\nخالد ✖️";
        let a = parse_collective_report(text, &arabic_roster(), "2025-03-02", &kw).expect("a");
        let b = parse_collective_report(text, &arabic_roster(), "2025-03-02", &kw).expect("b");
        assert_eq!(a, b);
        assert_eq!(a.reports[0].student_id, "s2");
        assert_eq!(a.reports[1].student_id, "s1");
    }

    #[test]
    fn parser_rejects_malformed_date_before_any_line() {
        let kw = KeywordTable::default();
        let err = parse_collective_report("أحمد: الملك 1-2", &arabic_roster(), "03/02/2025", &kw)
            .expect_err("bad date");
        assert_eq!(err, BadDate("03/02/2025".to_string()));
    }
}
