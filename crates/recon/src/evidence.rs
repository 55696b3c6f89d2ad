use chrono::{DateTime, NaiveDate, Utc};

use crate::classify::{reasoning, Detector};
use crate::model::{Classification, Record, RemainingSwap, SwapEvidence, Tally, Verdict};

impl Tally {
    /// Count one classified record. Incomplete records are tallied as
    /// skipped rather than unrelated.
    pub fn observe(&mut self, record: &Record, classification: &Classification) {
        self.records_scanned += 1;

        if record.is_incomplete() {
            self.skipped_count += 1;
            return;
        }

        match classification.verdict {
            Verdict::Swapped => self.swap_count += 1,
            Verdict::Match => self.match_count += 1,
            Verdict::Unrelated => self.unrelated_count += 1,
        }
    }
}

/// Evidence for a swapped record. `None` unless the classification is
/// `Swapped` and both dates are present.
pub fn swap_evidence(
    record: &Record,
    classification: &Classification,
    detector: &Detector,
) -> Option<SwapEvidence> {
    let (stored, corrected, ts) = swapped_parts(record, classification)?;
    let trusted_month_day = detector.month_day(ts);

    Some(SwapEvidence {
        id: record.id.clone(),
        code: record.code.clone(),
        stored_date: stored,
        corrected_date: corrected,
        trusted_month_day,
        reasoning: reasoning(stored, trusted_month_day),
    })
}

pub fn remaining_swap(
    record: &Record,
    classification: &Classification,
    detector: &Detector,
) -> Option<RemainingSwap> {
    let (stored, corrected, ts) = swapped_parts(record, classification)?;

    Some(RemainingSwap {
        id: record.id.clone(),
        code: record.code.clone(),
        stored_date: stored,
        corrected_date: corrected,
        trusted_month_day: detector.month_day(ts),
    })
}

fn swapped_parts<'r>(
    record: &'r Record,
    classification: &Classification,
) -> Option<(NaiveDate, NaiveDate, &'r DateTime<Utc>)> {
    if !classification.is_swapped() {
        return None;
    }
    Some((
        record.stored_date?,
        classification.corrected_date?,
        record.trusted_timestamp.as_ref()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, stored: Option<&str>, created: Option<&str>) -> Record {
        Record::from_raw(id, format!("EV-{id}"), stored, created)
    }

    #[test]
    fn tally_counts() {
        let detector = Detector::utc();
        let records = vec![
            rec("1", Some("2026-02-05"), Some("2026-05-02T10:00:00Z")),
            rec("2", Some("2026-05-02"), Some("2026-05-02T10:00:00Z")),
            rec("3", Some("2026-03-04"), Some("2026-07-09T00:00:00Z")),
            rec("4", None, Some("2026-07-09T00:00:00Z")),
            rec("5", Some("bogus"), Some("2026-07-09T00:00:00Z")),
        ];

        let mut tally = Tally::default();
        for r in &records {
            tally.observe(r, &detector.classify_record(r));
        }

        assert_eq!(tally.records_scanned, 5);
        assert_eq!(tally.swap_count, 1);
        assert_eq!(tally.match_count, 1);
        assert_eq!(tally.unrelated_count, 1);
        assert_eq!(tally.skipped_count, 2);
    }

    #[test]
    fn evidence_only_for_swaps() {
        let detector = Detector::utc();

        let swapped = rec("1", Some("2026-02-05"), Some("2026-05-02T10:00:00Z"));
        let ev = swap_evidence(&swapped, &detector.classify_record(&swapped), &detector).unwrap();
        assert_eq!(ev.code, "EV-1");
        assert_eq!(ev.stored_date.to_string(), "2026-02-05");
        assert_eq!(ev.corrected_date.to_string(), "2026-05-02");
        assert_eq!(ev.trusted_month_day.to_string(), "05-02");
        assert!(ev.reasoning.contains("stored day 05 = created month 05"));

        let matched = rec("2", Some("2026-05-02"), Some("2026-05-02T10:00:00Z"));
        assert!(swap_evidence(&matched, &detector.classify_record(&matched), &detector).is_none());
        assert!(remaining_swap(&matched, &detector.classify_record(&matched), &detector).is_none());
    }
}
