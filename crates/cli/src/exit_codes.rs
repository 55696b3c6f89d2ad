//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `swapfix` exit codes.
//! Exit codes are part of the shell contract: scripts chain
//! `swapfix fix && swapfix verify` and branch on the result.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success (fix: no failures, verify: nothing remaining) |
//! | 1    | General error (unspecified)                           |
//! | 2    | Usage error (bad arguments)                           |
//! | 3    | Config missing, unparseable, or invalid               |
//! | 4    | Source unavailable (cannot open or read the store)    |
//! | 5    | Fix completed with per-record write failures          |
//! | 6    | Verify found remaining swaps                          |
//! | 7    | REST API key missing                                  |

use swapfix_recon::ReconError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed `--date`, zero `--limit`.
pub const EXIT_USAGE: u8 = 2;

/// Config file could not be read, parsed, or validated.
pub const EXIT_CONFIG: u8 = 3;

/// The store could not be opened, or a phase-level read failed.
pub const EXIT_SOURCE_UNAVAILABLE: u8 = 4;

/// `fix` finished but at least one record could not be written.
pub const EXIT_FIX_FAILURES: u8 = 5;

/// `verify` found swapped records in the window.
pub const EXIT_VERIFY_REMAINING: u8 = 6;

/// `kind = "rest"` but no API key in `--api-key` or the configured env var.
pub const EXIT_MISSING_API_KEY: u8 = 7;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_CONFIG,
        ReconError::InvalidLimit(_) => EXIT_USAGE,
        ReconError::Source(_) => EXIT_SOURCE_UNAVAILABLE,
        ReconError::Io(_) => EXIT_ERROR,
    }
}
