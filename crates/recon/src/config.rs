use std::path::Path;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::classify::Detector;
use crate::engine::{RunOptions, DEFAULT_BATCH_LIMIT, DEFAULT_SAMPLE_SIZE};
use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwapfixConfig {
    pub name: String,
    pub source: SourceConfig,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub table: String,
    /// SQLite database file, relative to the config file.
    #[serde(default)]
    pub path: Option<String>,
    /// PostgREST base URL (without `/rest/v1`).
    #[serde(default)]
    pub url: Option<String>,
    /// Environment variable holding the PostgREST API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Sqlite,
    Rest,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Rest => write!(f, "rest"),
        }
    }
}

fn default_api_key_env() -> String {
    "SWAPFIX_API_KEY".into()
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Projection from store columns to record fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub id: String,
    pub code: String,
    pub stored_date: String,
    pub trusted_timestamp: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: "id".into(),
            code: "code".into(),
            stored_date: "date".into(),
            trusted_timestamp: "created_at".into(),
        }
    }
}

impl ColumnMapping {
    fn named(&self) -> [(&'static str, &str); 4] {
        [
            ("id", &self.id),
            ("code", &self.code),
            ("stored_date", &self.stored_date),
            ("trusted_timestamp", &self.trusted_timestamp),
        ]
    }
}

// ---------------------------------------------------------------------------
// Run + Detector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub batch_limit: usize,
    pub sample_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Offset in which trusted timestamps are read, `±HH:MM` or `Z`.
    pub timestamp_offset: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            timestamp_offset: "+00:00".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SwapfixConfig {
    /// Read, parse and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ReconError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ReconError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SwapfixConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        match self.source.kind {
            SourceKind::Sqlite => {
                if self.source.path.as_deref().map_or(true, |p| p.trim().is_empty()) {
                    return Err(ReconError::ConfigValidation(
                        "source kind 'sqlite' requires 'path'".into(),
                    ));
                }
            }
            SourceKind::Rest => {
                let url = self.source.url.as_deref().unwrap_or("");
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ReconError::ConfigValidation(
                        "source kind 'rest' requires an http(s) 'url'".into(),
                    ));
                }
                if self.source.api_key_env.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(
                        "api_key_env must not be empty".into(),
                    ));
                }
            }
        }

        if !is_identifier(&self.source.table) {
            return Err(ReconError::ConfigValidation(format!(
                "table '{}' is not a valid identifier",
                self.source.table
            )));
        }

        for (field, column) in self.columns.named() {
            if !is_identifier(column) {
                return Err(ReconError::ConfigValidation(format!(
                    "columns.{field}: '{column}' is not a valid identifier"
                )));
            }
        }

        if self.run.batch_limit == 0 {
            return Err(ReconError::ConfigValidation(
                "run.batch_limit must be at least 1".into(),
            ));
        }

        self.detector.offset()?;

        Ok(())
    }

    /// Detector reading trusted timestamps in the configured offset.
    pub fn detector(&self) -> Result<Detector, ReconError> {
        Ok(Detector::new(self.detector.offset()?))
    }

    pub fn run_options(&self) -> Result<RunOptions, ReconError> {
        Ok(RunOptions {
            batch_limit: self.run.batch_limit,
            sample_size: self.run.sample_size,
            dry_run: false,
            detector: self.detector()?,
        })
    }
}

impl DetectorConfig {
    pub fn offset(&self) -> Result<FixedOffset, ReconError> {
        parse_offset(&self.timestamp_offset).ok_or_else(|| {
            ReconError::ConfigValidation(format!(
                "detector.timestamp_offset: '{}' is not ±HH:MM",
                self.timestamp_offset
            ))
        })
    }
}

/// Parse `Z`, `+HH:MM`, or `-HH:MM`.
pub fn parse_offset(s: &str) -> Option<FixedOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }

    let sign = match s.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let (hh, mm) = s[1..].split_once(':')?;
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hh) || !two_digits(mm) {
        return None;
    }
    let hours: i32 = hh.parse().ok()?;
    let minutes: i32 = mm.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Plain SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_SQLITE: &str = r#"
name = "orders event date"

[source]
kind = "sqlite"
path = "store.db"
table = "orders"

[columns]
id = "id"
code = "order_code"
stored_date = "event_date"
trusted_timestamp = "created_at"

[run]
batch_limit = 500
sample_size = 5
"#;

    #[test]
    fn parse_valid_sqlite() {
        let config = SwapfixConfig::from_toml(VALID_SQLITE).unwrap();
        assert_eq!(config.name, "orders event date");
        assert_eq!(config.source.kind, SourceKind::Sqlite);
        assert_eq!(config.source.path.as_deref(), Some("store.db"));
        assert_eq!(config.columns.stored_date, "event_date");
        assert_eq!(config.run.batch_limit, 500);
        assert_eq!(config.run.sample_size, 5);
        assert_eq!(config.detector.timestamp_offset, "+00:00");
        assert_eq!(config.source.api_key_env, "SWAPFIX_API_KEY");
    }

    #[test]
    fn defaults_apply() {
        let input = r#"
name = "minimal"
[source]
kind = "sqlite"
path = "x.db"
table = "events"
"#;
        let config = SwapfixConfig::from_toml(input).unwrap();
        assert_eq!(config.columns, ColumnMapping::default());
        assert_eq!(config.run.batch_limit, DEFAULT_BATCH_LIMIT);
        assert_eq!(config.run.sample_size, DEFAULT_SAMPLE_SIZE);

        let options = config.run_options().unwrap();
        assert_eq!(options.batch_limit, DEFAULT_BATCH_LIMIT);
        assert!(!options.dry_run);
    }

    #[test]
    fn parse_rest_with_offset() {
        let input = r#"
name = "remote"
[source]
kind = "rest"
url = "https://example.supabase.co"
table = "visits"
api_key_env = "SUPABASE_SERVICE_KEY"

[detector]
timestamp_offset = "-03:00"
"#;
        let config = SwapfixConfig::from_toml(input).unwrap();
        assert_eq!(config.source.kind, SourceKind::Rest);
        assert_eq!(config.source.api_key_env, "SUPABASE_SERVICE_KEY");
        let detector = config.detector().unwrap();
        assert_eq!(detector.offset().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn reject_sqlite_without_path() {
        let input = r#"
name = "bad"
[source]
kind = "sqlite"
table = "orders"
"#;
        let err = SwapfixConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("requires 'path'"));
    }

    #[test]
    fn reject_rest_without_url() {
        let input = r#"
name = "bad"
[source]
kind = "rest"
table = "orders"
"#;
        let err = SwapfixConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("http(s) 'url'"));
    }

    #[test]
    fn reject_bad_identifier() {
        let input = r#"
name = "bad"
[source]
kind = "sqlite"
path = "x.db"
table = "orders; DROP TABLE orders"
"#;
        let err = SwapfixConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("not a valid identifier"));

        let input = r#"
name = "bad"
[source]
kind = "sqlite"
path = "x.db"
table = "orders"
[columns]
stored_date = "event date"
"#;
        let err = SwapfixConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("columns.stored_date"));
    }

    #[test]
    fn reject_zero_batch_limit() {
        let input = VALID_SQLITE.replace("batch_limit = 500", "batch_limit = 0");
        let err = SwapfixConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("batch_limit"));
    }

    #[test]
    fn reject_bad_offset() {
        let input = format!(
            r#"{VALID_SQLITE}
[detector]
timestamp_offset = "UTC+2"
"#
        );
        let err = SwapfixConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("timestamp_offset"));
    }

    #[test]
    fn reject_unknown_kind_and_fields() {
        let input = r#"
name = "bad"
[source]
kind = "mysql"
table = "orders"
"#;
        assert!(matches!(
            SwapfixConfig::from_toml(input),
            Err(ReconError::ConfigParse(_))
        ));

        let input = format!("{VALID_SQLITE}\nunexpected = true\n");
        assert!(SwapfixConfig::from_toml(&input).is_err());
    }

    #[test]
    fn from_file_missing_is_io() {
        let err = SwapfixConfig::from_file(Path::new("/nonexistent/swapfix.toml")).unwrap_err();
        assert!(matches!(err, ReconError::Io(_)));
        assert!(err.to_string().contains("/nonexistent/swapfix.toml"));
    }

    #[test]
    fn offsets() {
        assert_eq!(parse_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_offset("+05:30").unwrap().local_minus_utc(), 5 * 3600 + 1800);
        assert_eq!(parse_offset("-08:00").unwrap().local_minus_utc(), -8 * 3600);
        assert!(parse_offset("0530").is_none());
        assert!(parse_offset("+24:00").is_none());
        assert!(parse_offset("").is_none());
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("created_at"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a\"b"));
    }
}
