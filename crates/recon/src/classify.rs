//! Swap detection: the single predicate every phase runs.
//!
//! A stored date `(Y, M, D)` is a transposition of the intended date when the
//! trusted timestamp's month is `D` and its day is `M`. Day-equals-month is
//! excluded: exchanging equal values is a no-op and cannot be told apart from
//! a correct entry. The trusted timestamp's year is never read, and the
//! correction never changes the stored year.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};

use crate::model::{Classification, MonthDay, Record};

/// Classifier bound to the offset in which trusted timestamps are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detector {
    offset: FixedOffset,
}

impl Default for Detector {
    fn default() -> Self {
        Self::utc()
    }
}

impl Detector {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Calendar month and day of `ts` in this detector's offset.
    pub fn month_day(&self, ts: &DateTime<Utc>) -> MonthDay {
        let local = ts.with_timezone(&self.offset);
        MonthDay {
            month: local.month(),
            day: local.day(),
        }
    }

    pub fn classify(
        &self,
        stored: Option<NaiveDate>,
        trusted: Option<&DateTime<Utc>>,
    ) -> Classification {
        match (stored, trusted) {
            (Some(stored), Some(ts)) => classify_parts(stored, self.month_day(ts)),
            _ => Classification::unrelated(),
        }
    }

    pub fn classify_record(&self, record: &Record) -> Classification {
        self.classify(record.stored_date, record.trusted_timestamp.as_ref())
    }
}

/// Classify with trusted timestamps read in UTC.
pub fn classify(stored: Option<NaiveDate>, trusted: Option<&DateTime<Utc>>) -> Classification {
    Detector::utc().classify(stored, trusted)
}

/// The detection rule over already-extracted components.
pub fn classify_parts(stored: NaiveDate, trusted: MonthDay) -> Classification {
    let (year, month, day) = (stored.year(), stored.month(), stored.day());

    if day == trusted.month && month == trusted.day && day != month {
        // day <= 12 because it equals a real month, so the exchanged date is
        // always valid; from_ymd_opt only fails on impossible input.
        return match NaiveDate::from_ymd_opt(year, day, month) {
            Some(corrected) => Classification::swapped(corrected),
            None => Classification::unrelated(),
        };
    }

    if day == trusted.day && month == trusted.month {
        return Classification::matched();
    }

    Classification::unrelated()
}

/// Human-readable justification for a `Swapped` verdict.
pub fn reasoning(stored: NaiveDate, trusted: MonthDay) -> String {
    format!(
        "stored day {:02} = created month {:02}, stored month {:02} = created day {:02}",
        stored.day(),
        trusted.month,
        stored.month(),
        trusted.day,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{parse_trusted_timestamp, Verdict};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        parse_trusted_timestamp(s).unwrap()
    }

    #[test]
    fn scenario_swapped() {
        let c = classify(Some(date(2026, 2, 5)), Some(&ts("2026-05-02T10:00:00Z")));
        assert_eq!(c.verdict, Verdict::Swapped);
        assert_eq!(c.corrected_date, Some(date(2026, 5, 2)));
    }

    #[test]
    fn scenario_match() {
        let c = classify(Some(date(2026, 5, 2)), Some(&ts("2026-05-02T10:00:00Z")));
        assert_eq!(c.verdict, Verdict::Match);
        assert_eq!(c.corrected_date, None);
    }

    #[test]
    fn scenario_day_equals_month_match() {
        let c = classify(Some(date(2026, 1, 1)), Some(&ts("2026-01-01T00:00:00Z")));
        assert_eq!(c.verdict, Verdict::Match);
    }

    #[test]
    fn scenario_unrelated() {
        let c = classify(Some(date(2026, 3, 4)), Some(&ts("2026-07-09T00:00:00Z")));
        assert_eq!(c.verdict, Verdict::Unrelated);
        assert_eq!(c.corrected_date, None);
    }

    #[test]
    fn missing_inputs_are_unrelated() {
        let t = ts("2026-05-02T10:00:00Z");
        assert_eq!(classify(None, Some(&t)).verdict, Verdict::Unrelated);
        assert_eq!(classify(Some(date(2026, 2, 5)), None).verdict, Verdict::Unrelated);
        assert_eq!(classify(None, None).verdict, Verdict::Unrelated);
    }

    #[test]
    fn day_equals_month_never_swapped() {
        // 02-02 against a 02-02 timestamp is a match, not a swap.
        let c = classify(Some(date(2026, 2, 2)), Some(&ts("2026-02-02T08:00:00Z")));
        assert_eq!(c.verdict, Verdict::Match);

        // 02-02 against anything else is unrelated.
        let c = classify(Some(date(2026, 2, 2)), Some(&ts("2026-03-02T08:00:00Z")));
        assert_eq!(c.verdict, Verdict::Unrelated);
    }

    #[test]
    fn year_comes_from_stored_date() {
        // Trusted year differs; correction keeps the stored year.
        let c = classify(Some(date(2025, 2, 5)), Some(&ts("2026-05-02T10:00:00Z")));
        assert_eq!(c.corrected_date, Some(date(2025, 5, 2)));
    }

    #[test]
    fn stored_day_above_twelve_cannot_swap() {
        let c = classify(Some(date(2026, 5, 20)), Some(&ts("2026-05-02T10:00:00Z")));
        assert_eq!(c.verdict, Verdict::Unrelated);
    }

    #[test]
    fn corrected_date_reclassifies_as_match() {
        let t = ts("2026-11-03T16:45:00Z");
        let first = classify(Some(date(2026, 3, 11)), Some(&t));
        assert!(first.is_swapped());
        let second = classify(first.corrected_date, Some(&t));
        assert_eq!(second.verdict, Verdict::Match);
    }

    #[test]
    fn offset_changes_calendar_day() {
        // 23:30 UTC on May 1st is May 2nd at +02:00.
        let t = ts("2026-05-01T23:30:00Z");
        let plus_two = Detector::new(FixedOffset::east_opt(2 * 3600).unwrap());

        assert_eq!(plus_two.month_day(&t), MonthDay { month: 5, day: 2 });
        assert_eq!(Detector::utc().month_day(&t), MonthDay { month: 5, day: 1 });

        let stored = Some(date(2026, 2, 5));
        assert_eq!(plus_two.classify(stored, Some(&t)).verdict, Verdict::Swapped);
        assert_eq!(Detector::utc().classify(stored, Some(&t)).verdict, Verdict::Unrelated);
    }

    #[test]
    fn classify_record_uses_both_fields() {
        let record =
            Record::from_raw("r1", "EV-1", Some("2026-02-05"), Some("2026-05-02T10:00:00Z"));
        let c = Detector::default().classify_record(&record);
        assert!(c.is_swapped());
    }

    #[test]
    fn reasoning_text() {
        let text = reasoning(date(2026, 2, 5), MonthDay { month: 5, day: 2 });
        assert_eq!(
            text,
            "stored day 05 = created month 05, stored month 02 = created day 02"
        );
    }
}
