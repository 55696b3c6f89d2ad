//! Phase driver: analyze, fix, verify.
//!
//! Every phase fetches its own batch and re-classifies from scratch. Nothing
//! is carried between invocations, so any phase can be re-run after a partial
//! failure.

use chrono::NaiveDate;

use crate::classify::Detector;
use crate::error::ReconError;
use crate::evidence::{remaining_swap, swap_evidence};
use crate::model::{
    AnalyzeReport, FixFailure, FixReport, FixedRecord, Phase, Record, RunMeta, Tally,
    VerifyReport,
};
use crate::source::RecordSource;

pub const DEFAULT_BATCH_LIMIT: usize = 2000;
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Scan the `batch_limit` most recently created records.
    pub batch_limit: usize,
    /// Swapped records kept as evidence in the analyze report.
    pub sample_size: usize,
    /// Fix only: plan corrections without writing them.
    pub dry_run: bool,
    pub detector: Detector,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            sample_size: DEFAULT_SAMPLE_SIZE,
            dry_run: false,
            detector: Detector::utc(),
        }
    }
}

impl RunOptions {
    pub fn with_limit(batch_limit: usize) -> Self {
        Self {
            batch_limit,
            ..Self::default()
        }
    }
}

/// Read-only scan: counts plus the first `sample_size` swapped records.
pub fn analyze<S>(source: &S, options: &RunOptions) -> Result<AnalyzeReport, ReconError>
where
    S: RecordSource + ?Sized,
{
    let batch = fetch_batch(source, Phase::Analyze, options.batch_limit)?;
    let detector = &options.detector;

    let mut tally = Tally::default();
    let mut samples = Vec::new();

    for record in &batch {
        let classification = detector.classify_record(record);
        tally.observe(record, &classification);

        if samples.len() < options.sample_size {
            if let Some(evidence) = swap_evidence(record, &classification, detector) {
                samples.push(evidence);
            }
        }
    }

    log::info!(
        "analyze: {} scanned, {} match, {} swapped, {} unrelated, {} skipped",
        tally.records_scanned,
        tally.match_count,
        tally.swap_count,
        tally.unrelated_count,
        tally.skipped_count,
    );

    Ok(AnalyzeReport {
        meta: meta(Phase::Analyze, options.batch_limit),
        tally,
        samples,
    })
}

/// Correct every swapped record in the batch, one write at a time.
///
/// A failed write is recorded and the batch continues. Only a failed fetch
/// aborts the phase.
pub fn fix<S>(source: &mut S, options: &RunOptions) -> Result<FixReport, ReconError>
where
    S: RecordSource + ?Sized,
{
    let batch = fetch_batch(&*source, Phase::Fix, options.batch_limit)?;
    let detector = &options.detector;

    let mut tally = Tally::default();
    let mut fixed_records = Vec::new();
    let mut failures = Vec::new();

    for record in &batch {
        let classification = detector.classify_record(record);
        tally.observe(record, &classification);

        let (Some(old_date), Some(new_date)) = (record.stored_date, classification.corrected_date)
        else {
            continue;
        };

        if options.dry_run {
            fixed_records.push(fixed(record, old_date, new_date, false));
            continue;
        }

        match source.update_stored_date(&record.id, new_date) {
            Ok(()) => {
                log::debug!(
                    "fixed '{}' ({}): {} -> {}",
                    record.code,
                    record.id,
                    old_date,
                    new_date
                );
                fixed_records.push(fixed(record, old_date, new_date, true));
            }
            Err(err) => {
                log::warn!(
                    "failed to fix '{}' ({}): {} -> {}: {}",
                    record.code,
                    record.id,
                    old_date,
                    new_date,
                    err
                );
                failures.push(FixFailure {
                    id: record.id.clone(),
                    code: record.code.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    let fix_count = fixed_records.iter().filter(|f| f.applied).count();
    let fail_count = failures.len();

    log::info!(
        "fix{}: {} scanned, {} swapped, {} fixed, {} failed",
        if options.dry_run { " (dry run)" } else { "" },
        tally.records_scanned,
        tally.swap_count,
        fix_count,
        fail_count,
    );

    Ok(FixReport {
        meta: meta(Phase::Fix, options.batch_limit),
        dry_run: options.dry_run,
        tally,
        fix_count,
        fail_count,
        fixed_records,
        failures,
    })
}

/// Post-condition check: any swapped record left in the batch is reported.
pub fn verify<S>(source: &S, options: &RunOptions) -> Result<VerifyReport, ReconError>
where
    S: RecordSource + ?Sized,
{
    let batch = fetch_batch(source, Phase::Verify, options.batch_limit)?;
    let detector = &options.detector;

    let mut tally = Tally::default();
    let mut remaining = Vec::new();

    for record in &batch {
        let classification = detector.classify_record(record);
        tally.observe(record, &classification);

        if let Some(swap) = remaining_swap(record, &classification, detector) {
            log::warn!(
                "still swapped: '{}' ({}) stored {} but created {}",
                swap.code,
                swap.id,
                swap.stored_date,
                swap.trusted_month_day,
            );
            remaining.push(swap);
        }
    }

    if remaining.is_empty() {
        log::info!("verify: {} scanned, no remaining swaps", tally.records_scanned);
    } else {
        log::info!(
            "verify: {} scanned, {} remaining swaps",
            tally.records_scanned,
            remaining.len()
        );
    }

    Ok(VerifyReport {
        meta: meta(Phase::Verify, options.batch_limit),
        records_scanned: tally.records_scanned,
        remaining_swap_count: remaining.len(),
        match_count: tally.match_count,
        unrelated_count: tally.unrelated_count,
        skipped_count: tally.skipped_count,
        remaining,
    })
}

/// Diagnostic volume count of records stored on `date`.
pub fn count<S>(source: &S, date: NaiveDate) -> Result<u64, ReconError>
where
    S: RecordSource + ?Sized,
{
    let n = source.count_matching(date)?;
    log::info!("count: {} record(s) stored on {}", n, date);
    Ok(n)
}

fn fetch_batch<S>(source: &S, phase: Phase, limit: usize) -> Result<Vec<Record>, ReconError>
where
    S: RecordSource + ?Sized,
{
    if limit == 0 {
        return Err(ReconError::InvalidLimit(limit));
    }

    log::info!("{}: fetching up to {} records from {}", phase, limit, source.describe());

    source.fetch_recent(limit).map_err(|err| {
        log::error!("{}: fetch failed: {}", phase, err);
        ReconError::Source(err)
    })
}

fn fixed(record: &Record, old_date: NaiveDate, new_date: NaiveDate, applied: bool) -> FixedRecord {
    FixedRecord {
        id: record.id.clone(),
        code: record.code.clone(),
        old_date,
        new_date,
        applied,
    }
}

fn meta(phase: Phase, batch_limit: usize) -> RunMeta {
    RunMeta {
        phase,
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        run_at: chrono::Utc::now().to_rfc3339(),
        batch_limit,
    }
}
