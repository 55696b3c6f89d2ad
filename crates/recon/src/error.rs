use std::fmt;

/// Failure reported by a [`RecordSource`](crate::source::RecordSource).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Transport, auth, or driver failure. The store could not be reached.
    Unavailable(String),
    /// The store refused a write for one record.
    Rejected { id: String, message: String },
    /// An update matched no record.
    NotFound(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(msg) => write!(f, "source unavailable: {msg}"),
            Self::Rejected { id, message } => {
                write!(f, "record '{id}': write rejected: {message}")
            }
            Self::NotFound(id) => write!(f, "record '{id}': not found"),
        }
    }
}

impl std::error::Error for SourceError {}

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (missing path, bad identifier, etc.).
    ConfigValidation(String),
    /// A phase was asked to scan zero records.
    InvalidLimit(usize),
    /// Phase-level source failure (the batch could not be fetched).
    Source(SourceError),
    /// IO error (config file read, etc.).
    Io(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::InvalidLimit(limit) => {
                write!(f, "batch limit must be at least 1, got {limit}")
            }
            Self::Source(err) => write!(f, "{err}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SourceError> for ReconError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}
