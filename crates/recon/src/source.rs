//! The store boundary.
//!
//! The engine reads a bounded, newest-first batch and writes one stored date
//! at a time. Adapters own connection lifecycle and per-call timeouts; the
//! caller constructs one and passes it into each phase.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::SourceError;
use crate::model::Record;

pub trait RecordSource {
    /// Up to `limit` records, most recently created (by trusted timestamp)
    /// first. Ties are broken consistently within one call.
    fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>, SourceError>;

    /// Rewrite the stored date of the record `id`. Must not touch any
    /// other field.
    fn update_stored_date(&mut self, id: &str, new_date: NaiveDate) -> Result<(), SourceError>;

    /// Number of records whose stored date is exactly `date`.
    fn count_matching(&self, date: NaiveDate) -> Result<u64, SourceError>;

    /// Short label for log lines.
    fn describe(&self) -> String {
        "record source".to_string()
    }
}

/// Records held in memory, newest first.
///
/// Supports injected failures so callers can exercise the driver's error
/// paths without a real store.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Vec<Record>,
    failing_writes: HashSet<String>,
    unavailable: bool,
    write_count: usize,
}

impl MemorySource {
    pub fn new(mut records: Vec<Record>) -> Self {
        // Stable sort: equal timestamps keep insertion order. Records
        // without a timestamp sort last.
        records.sort_by(|a, b| b.trusted_timestamp.cmp(&a.trusted_timestamp));
        Self {
            records,
            ..Self::default()
        }
    }

    /// Make every write to `id` fail with `SourceError::Rejected`.
    pub fn fail_writes_for(&mut self, id: impl Into<String>) {
        self.failing_writes.insert(id.into());
    }

    pub fn clear_write_failures(&mut self) {
        self.failing_writes.clear();
    }

    /// Make every call fail with `SourceError::Unavailable`.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Successful writes since construction.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable("memory source offline".into()));
        }
        Ok(())
    }
}

impl RecordSource for MemorySource {
    fn fetch_recent(&self, limit: usize) -> Result<Vec<Record>, SourceError> {
        self.check_available()?;
        Ok(self.records.iter().take(limit).cloned().collect())
    }

    fn update_stored_date(&mut self, id: &str, new_date: NaiveDate) -> Result<(), SourceError> {
        self.check_available()?;
        if self.failing_writes.contains(id) {
            return Err(SourceError::Rejected {
                id: id.to_string(),
                message: "injected write failure".into(),
            });
        }
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        record.stored_date = Some(new_date);
        self.write_count += 1;
        Ok(())
    }

    fn count_matching(&self, date: NaiveDate) -> Result<u64, SourceError> {
        self.check_available()?;
        Ok(self
            .records
            .iter()
            .filter(|r| r.stored_date == Some(date))
            .count() as u64)
    }

    fn describe(&self) -> String {
        format!("memory ({} records)", self.records.len())
    }
}
