//! `swapfix analyze | fix | verify | count | config check`

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

use swapfix_recon::{engine, RunOptions, SourceKind, SwapfixConfig};

use crate::exit_codes::{EXIT_ERROR, EXIT_FIX_FAILURES, EXIT_VERIFY_REMAINING};
use crate::store;
use crate::CliError;

/// Global flags shared by every subcommand.
pub struct Context {
    pub config_path: PathBuf,
    pub api_key: Option<String>,
}

fn run_options(config: &SwapfixConfig, limit: Option<usize>) -> Result<RunOptions, CliError> {
    let mut options = config.run_options()?;
    if let Some(limit) = limit {
        options.batch_limit = limit;
    }
    Ok(options)
}

/// Write the report to `--output` and/or stdout. Stdout gets exactly one
/// JSON value.
fn emit_json<T: Serialize>(
    report: &T,
    json_output: bool,
    output_file: Option<&PathBuf>,
) -> Result<(), CliError> {
    if !json_output && output_file.is_none() {
        return Ok(());
    }

    let json_str = serde_json::to_string_pretty(report)
        .map_err(|e| CliError::new(EXIT_ERROR, format!("JSON serialization error: {e}")))?;

    if let Some(path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| CliError::new(EXIT_ERROR, format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }
    Ok(())
}

// ============================================================================
// analyze
// ============================================================================

pub fn cmd_analyze(
    ctx: &Context,
    limit: Option<usize>,
    samples: Option<usize>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = store::load_config(&ctx.config_path)?;
    let mut options = run_options(&config, limit)?;
    if let Some(samples) = samples {
        options.sample_size = samples;
    }

    let source = store::open_source(&config, &ctx.config_path, ctx.api_key.as_deref())?;
    let report = engine::analyze(&*source, &options)?;

    emit_json(&report, json_output, output_file.as_ref())?;

    let t = &report.tally;
    eprintln!(
        "analyze: {} records scanned: {} swapped, {} match, {} unrelated, {} skipped",
        t.records_scanned, t.swap_count, t.match_count, t.unrelated_count, t.skipped_count,
    );
    for s in &report.samples {
        eprintln!(
            "  {}  {} -> {}  ({})",
            s.code, s.stored_date, s.corrected_date, s.reasoning,
        );
    }
    if t.swap_count > report.samples.len() {
        eprintln!("  ... {} more", t.swap_count - report.samples.len());
    }

    Ok(())
}

// ============================================================================
// fix
// ============================================================================

pub fn cmd_fix(
    ctx: &Context,
    limit: Option<usize>,
    dry_run: bool,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = store::load_config(&ctx.config_path)?;
    let mut options = run_options(&config, limit)?;
    options.dry_run = dry_run;

    let mut source = store::open_source(&config, &ctx.config_path, ctx.api_key.as_deref())?;
    let report = engine::fix(&mut *source, &options)?;

    emit_json(&report, json_output, output_file.as_ref())?;

    let verb = if report.dry_run { "would fix" } else { "fixed" };
    for item in &report.fixed_records {
        eprintln!("  {} {}  {} -> {}", verb, item.code, item.old_date, item.new_date);
    }
    for failure in &report.failures {
        eprintln!("  failed {}  {}", failure.code, failure.error);
    }

    if report.dry_run {
        eprintln!(
            "fix (dry run): {} records scanned, {} swapped, nothing written",
            report.tally.records_scanned, report.tally.swap_count,
        );
    } else {
        eprintln!(
            "fix: {} records scanned, {} swapped, {} fixed, {} failed",
            report.tally.records_scanned,
            report.tally.swap_count,
            report.fix_count,
            report.fail_count,
        );
    }

    if report.has_failures() {
        return Err(CliError::new(
            EXIT_FIX_FAILURES,
            format!("{} record(s) could not be written", report.fail_count),
        )
        .with_hint("re-run `swapfix fix`; unwritten records are picked up again"));
    }

    Ok(())
}

// ============================================================================
// verify
// ============================================================================

pub fn cmd_verify(
    ctx: &Context,
    limit: Option<usize>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = store::load_config(&ctx.config_path)?;
    let options = run_options(&config, limit)?;

    let source = store::open_source(&config, &ctx.config_path, ctx.api_key.as_deref())?;
    let report = engine::verify(&*source, &options)?;

    emit_json(&report, json_output, output_file.as_ref())?;

    for r in &report.remaining {
        eprintln!(
            "  remaining {}  stored {}, created {}, should be {}",
            r.code, r.stored_date, r.trusted_month_day, r.corrected_date,
        );
    }
    eprintln!(
        "verify: {} records scanned, {} swapped remaining",
        report.records_scanned, report.remaining_swap_count,
    );

    if !report.is_clean() {
        return Err(CliError::new(
            EXIT_VERIFY_REMAINING,
            format!("{} swapped record(s) remaining", report.remaining_swap_count),
        )
        .with_hint("run `swapfix fix`"));
    }

    Ok(())
}

// ============================================================================
// count
// ============================================================================

#[derive(Serialize)]
struct CountResult {
    date: NaiveDate,
    count: u64,
}

pub fn cmd_count(ctx: &Context, date: NaiveDate, json_output: bool) -> Result<(), CliError> {
    let config = store::load_config(&ctx.config_path)?;
    let source = store::open_source(&config, &ctx.config_path, ctx.api_key.as_deref())?;
    let count = engine::count(&*source, date)?;

    if json_output {
        emit_json(&CountResult { date, count }, true, None)?;
    } else {
        println!("{count}");
        eprintln!("count: {} records with stored date {}", count, date);
    }
    Ok(())
}

// ============================================================================
// config check
// ============================================================================

pub fn cmd_config_check(ctx: &Context) -> Result<(), CliError> {
    let config = store::load_config(&ctx.config_path)?;

    let target = match config.source.kind {
        SourceKind::Sqlite => store::sqlite_path(&config, &ctx.config_path)
            .display()
            .to_string(),
        SourceKind::Rest => {
            store::resolve_api_key(ctx.api_key.as_deref(), &config.source.api_key_env)?;
            config.source.url.clone().unwrap_or_default()
        }
    };

    let c = &config.columns;
    eprintln!("config ok: {}", config.name);
    eprintln!("  source:   {} {} (table {})", config.source.kind, target, config.source.table);
    eprintln!(
        "  columns:  id={} code={} stored_date={} trusted_timestamp={}",
        c.id, c.code, c.stored_date, c.trusted_timestamp,
    );
    eprintln!(
        "  run:      batch_limit={} sample_size={} timestamp_offset={}",
        config.run.batch_limit, config.run.sample_size, config.detector.timestamp_offset,
    );
    Ok(())
}
