//! Config loading and record source construction.

use std::path::{Path, PathBuf};

use swapfix_io::{RestSource, SqliteSource};
use swapfix_recon::{ReconError, RecordSource, SourceKind, SwapfixConfig};

use crate::exit_codes::{EXIT_CONFIG, EXIT_MISSING_API_KEY, EXIT_SOURCE_UNAVAILABLE};
use crate::CliError;

pub fn load_config(path: &Path) -> Result<SwapfixConfig, CliError> {
    let config = SwapfixConfig::from_file(path).map_err(|e| match e {
        ReconError::Io(msg) => CliError::new(EXIT_CONFIG, format!("cannot read config {}", msg))
            .with_hint("pass --config <path> or set SWAPFIX_CONFIG"),
        other => CliError::new(EXIT_CONFIG, format!("{}: {}", path.display(), other)),
    })?;
    log::debug!("loaded config '{}' from {}", config.name, path.display());
    Ok(config)
}

/// SQLite path from the config, resolved against the config file's directory.
pub fn sqlite_path(config: &SwapfixConfig, config_path: &Path) -> PathBuf {
    let raw = config.source.path.as_deref().unwrap_or_default();
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    base_dir.join(raw)
}

/// Flag > env > error.
pub fn resolve_api_key(flag: Option<&str>, env_var: &str) -> Result<String, CliError> {
    let missing = || {
        CliError::new(
            EXIT_MISSING_API_KEY,
            format!("missing API key (use --api-key or set {})", env_var),
        )
    };

    if let Some(key) = flag {
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(missing());
        }
        return Ok(trimmed.to_string());
    }

    if let Ok(key) = std::env::var(env_var) {
        let trimmed = key.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    Err(missing())
}

/// Open the configured store. Called once per invocation.
pub fn open_source(
    config: &SwapfixConfig,
    config_path: &Path,
    api_key_flag: Option<&str>,
) -> Result<Box<dyn RecordSource>, CliError> {
    let table = &config.source.table;

    let source: Box<dyn RecordSource> = match config.source.kind {
        SourceKind::Sqlite => {
            let path = sqlite_path(config, config_path);
            let source = SqliteSource::open(&path, table, &config.columns)
                .map_err(|e| CliError::new(EXIT_SOURCE_UNAVAILABLE, e.to_string()))?;
            Box::new(source)
        }
        SourceKind::Rest => {
            let api_key = resolve_api_key(api_key_flag, &config.source.api_key_env)?;
            let url = config.source.url.as_deref().unwrap_or_default();
            let source = RestSource::new(url, table, &config.columns, api_key)
                .map_err(|e| CliError::new(EXIT_SOURCE_UNAVAILABLE, e.to_string()))?;
            Box::new(source)
        }
    };
    log::info!("opened {}", source.describe());
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> SwapfixConfig {
        SwapfixConfig::from_toml(toml).unwrap()
    }

    #[test]
    fn sqlite_path_is_relative_to_config() {
        let c = config(
            r#"
name = "t"
[source]
kind = "sqlite"
path = "data/store.db"
table = "orders"
"#,
        );
        assert_eq!(
            sqlite_path(&c, Path::new("/etc/swapfix/orders.toml")),
            PathBuf::from("/etc/swapfix/data/store.db")
        );
        assert_eq!(
            sqlite_path(&c, Path::new("swapfix.toml")),
            PathBuf::from("data/store.db")
        );
    }

    #[test]
    fn api_key_flag_wins() {
        let key = resolve_api_key(Some("  flag-key "), "SWAPFIX_TEST_UNUSED_KEY_VAR").unwrap();
        assert_eq!(key, "flag-key");
    }

    #[test]
    fn api_key_missing() {
        let err = resolve_api_key(None, "SWAPFIX_TEST_DEFINITELY_UNSET_VAR").unwrap_err();
        assert_eq!(err.code, EXIT_MISSING_API_KEY);
        assert!(err.message.contains("SWAPFIX_TEST_DEFINITELY_UNSET_VAR"));

        let err = resolve_api_key(Some("   "), "X").unwrap_err();
        assert_eq!(err.code, EXIT_MISSING_API_KEY);
    }

    #[test]
    fn missing_config_file() {
        let err = load_config(Path::new("/nonexistent/swapfix.toml")).unwrap_err();
        assert_eq!(err.code, EXIT_CONFIG);
        assert!(err.hint.is_some());
    }
}
