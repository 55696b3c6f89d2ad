//! `swapfix-recon`: day/month transposition repair engine.
//!
//! Pure engine crate: classifies records against a trusted timestamp and
//! drives the analyze → fix → verify phases through a [`RecordSource`].
//! No CLI or network dependencies.

pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod model;
pub mod source;

pub use classify::{classify, Detector};
pub use config::{ColumnMapping, SourceKind, SwapfixConfig};
pub use engine::{analyze, count, fix, verify, RunOptions};
pub use error::{ReconError, SourceError};
pub use model::{
    AnalyzeReport, Classification, FixReport, MonthDay, Record, Verdict, VerifyReport,
};
pub use source::{MemorySource, RecordSource};
