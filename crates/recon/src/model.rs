use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One row of the store, projected to the fields the detector needs.
///
/// `stored_date` and `trusted_timestamp` are `None` when the column was
/// empty or could not be parsed. Such records are skipped, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: String,
    pub code: String,
    pub stored_date: Option<NaiveDate>,
    pub trusted_timestamp: Option<DateTime<Utc>>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        stored_date: Option<NaiveDate>,
        trusted_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            stored_date,
            trusted_timestamp,
        }
    }

    /// Build a record from raw column text, parsing both date fields.
    pub fn from_raw(
        id: impl Into<String>,
        code: impl Into<String>,
        stored_raw: Option<&str>,
        trusted_raw: Option<&str>,
    ) -> Self {
        let id = id.into();

        let stored_date = stored_raw.and_then(|raw| {
            let parsed = parse_stored_date(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                log::debug!("record '{}': unparseable stored date '{}'", id, raw);
            }
            parsed
        });

        let trusted_timestamp = trusted_raw.and_then(|raw| {
            let parsed = parse_trusted_timestamp(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                log::debug!("record '{}': unparseable trusted timestamp '{}'", id, raw);
            }
            parsed
        });

        Self {
            id,
            code: code.into(),
            stored_date,
            trusted_timestamp,
        }
    }

    /// True when either date field is missing.
    pub fn is_incomplete(&self) -> bool {
        self.stored_date.is_none() || self.trusted_timestamp.is_none()
    }
}

/// Parse a stored business date. Accepts `YYYY-MM-DD`, optionally followed
/// by a time part which is ignored.
pub fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let head = s.get(..10)?;
    let rest = &s[10..];
    if !(rest.is_empty() || rest.starts_with('T') || rest.starts_with(' ')) {
        return None;
    }
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Parse a trusted timestamp into UTC.
///
/// Accepts RFC 3339, PostgreSQL text output (`2026-05-02 10:00:00.123+00`),
/// offset-less date-times (taken as UTC), and bare dates (midnight UTC).
pub fn parse_trusted_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Stored day and month are the trusted month and day, exchanged.
    Swapped,
    /// Stored day and month agree with the trusted timestamp.
    Match,
    /// Anything else, including records with a missing field.
    Unrelated,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Swapped => write!(f, "swapped"),
            Self::Match => write!(f, "match"),
            Self::Unrelated => write!(f, "unrelated"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    /// Present only for `Verdict::Swapped`.
    pub corrected_date: Option<NaiveDate>,
}

impl Classification {
    pub fn swapped(corrected: NaiveDate) -> Self {
        Self {
            verdict: Verdict::Swapped,
            corrected_date: Some(corrected),
        }
    }

    pub fn matched() -> Self {
        Self {
            verdict: Verdict::Match,
            corrected_date: None,
        }
    }

    pub fn unrelated() -> Self {
        Self {
            verdict: Verdict::Unrelated,
            corrected_date: None,
        }
    }

    pub fn is_swapped(&self) -> bool {
        self.verdict == Verdict::Swapped
    }
}

/// Month and day read from a trusted timestamp. Serialized as `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl Serialize for MonthDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    Fix,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyze => write!(f, "analyze"),
            Self::Fix => write!(f, "fix"),
            Self::Verify => write!(f, "verify"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub phase: Phase,
    pub engine_version: String,
    pub run_at: String,
    pub batch_limit: usize,
}

/// Per-verdict counters for one scanned batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub records_scanned: usize,
    pub match_count: usize,
    pub swap_count: usize,
    pub unrelated_count: usize,
    /// Records with a missing or unparseable date field.
    pub skipped_count: usize,
}

/// A swapped record with everything a reviewer needs to judge it.
#[derive(Debug, Clone, Serialize)]
pub struct SwapEvidence {
    pub id: String,
    pub code: String,
    pub stored_date: NaiveDate,
    pub corrected_date: NaiveDate,
    pub trusted_month_day: MonthDay,
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeReport {
    pub meta: RunMeta,
    #[serde(flatten)]
    pub tally: Tally,
    pub samples: Vec<SwapEvidence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixedRecord {
    pub id: String,
    pub code: String,
    pub old_date: NaiveDate,
    pub new_date: NaiveDate,
    /// False in dry-run mode.
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixFailure {
    pub id: String,
    pub code: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub meta: RunMeta,
    pub dry_run: bool,
    #[serde(flatten)]
    pub tally: Tally,
    pub fix_count: usize,
    pub fail_count: usize,
    pub fixed_records: Vec<FixedRecord>,
    pub failures: Vec<FixFailure>,
}

impl FixReport {
    pub fn has_failures(&self) -> bool {
        self.fail_count > 0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemainingSwap {
    pub id: String,
    pub code: String,
    pub stored_date: NaiveDate,
    pub corrected_date: NaiveDate,
    pub trusted_month_day: MonthDay,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub meta: RunMeta,
    pub records_scanned: usize,
    pub remaining_swap_count: usize,
    pub match_count: usize,
    pub unrelated_count: usize,
    pub skipped_count: usize,
    pub remaining: Vec<RemainingSwap>,
}

impl VerifyReport {
    /// Post-condition of a completed fix: nothing left to correct.
    pub fn is_clean(&self) -> bool {
        self.remaining_swap_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn stored_date_plain_and_with_time() {
        let d = parse_stored_date("2026-02-05").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2026, 2, 5));

        assert_eq!(parse_stored_date("2026-02-05T00:00:00"), Some(d));
        assert_eq!(parse_stored_date(" 2026-02-05 00:00:00 "), Some(d));
    }

    #[test]
    fn stored_date_rejects_garbage() {
        assert_eq!(parse_stored_date(""), None);
        assert_eq!(parse_stored_date("05/02/2026"), None);
        assert_eq!(parse_stored_date("2026-13-01"), None);
        assert_eq!(parse_stored_date("2026-02-30"), None);
        assert_eq!(parse_stored_date("2026-02-05junk"), None);
    }

    #[test]
    fn trusted_timestamp_formats() {
        let rfc = parse_trusted_timestamp("2026-05-02T10:00:00Z").unwrap();
        assert_eq!((rfc.month(), rfc.day(), rfc.hour()), (5, 2, 10));

        let pg = parse_trusted_timestamp("2026-05-02 10:00:00.123456+00").unwrap();
        assert_eq!((pg.month(), pg.day(), pg.hour()), (5, 2, 10));

        let offset = parse_trusted_timestamp("2026-05-02T01:00:00+02:00").unwrap();
        assert_eq!((offset.month(), offset.day(), offset.hour()), (5, 1, 23));

        let naive = parse_trusted_timestamp("2026-05-02 10:00:00").unwrap();
        assert_eq!((naive.month(), naive.day()), (5, 2));

        let bare = parse_trusted_timestamp("2026-05-02").unwrap();
        assert_eq!((bare.month(), bare.day(), bare.hour()), (5, 2, 0));
    }

    #[test]
    fn trusted_timestamp_rejects_garbage() {
        assert_eq!(parse_trusted_timestamp(""), None);
        assert_eq!(parse_trusted_timestamp("yesterday"), None);
        assert_eq!(parse_trusted_timestamp("2026-05-02T25:00:00Z"), None);
    }

    #[test]
    fn from_raw_marks_incomplete() {
        let ok = Record::from_raw("1", "A-1", Some("2026-02-05"), Some("2026-05-02T10:00:00Z"));
        assert!(!ok.is_incomplete());

        let bad = Record::from_raw("2", "A-2", Some("not a date"), Some("2026-05-02T10:00:00Z"));
        assert!(bad.is_incomplete());
        assert!(bad.stored_date.is_none());

        let missing = Record::from_raw("3", "A-3", Some("2026-02-05"), None);
        assert!(missing.is_incomplete());
    }

    #[test]
    fn month_day_serializes_as_string() {
        let md = MonthDay { month: 5, day: 2 };
        assert_eq!(md.to_string(), "05-02");
        assert_eq!(serde_json::to_string(&md).unwrap(), "\"05-02\"");
    }
}
