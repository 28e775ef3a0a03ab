//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | files            | Upload, parse and lookup failures        |
//! | 10-19   | ai               | Reasoning-service codes                  |
//! | 20-29   | viz              | Chart generation codes                   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `exit_code_for`

use crate::service::ApiResponse;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Files (3-9)
// =============================================================================

/// Upload rejected (unsupported extension, too large, bad request field).
pub const EXIT_REJECTED: u8 = 3;

/// Requested file, analysis or image does not exist.
pub const EXIT_NOT_FOUND: u8 = 4;

/// Reading, parsing or writing a file failed.
pub const EXIT_IO: u8 = 5;

// =============================================================================
// AI (10-19)
// =============================================================================

/// AI disabled (provider=none).
pub const EXIT_AI_DISABLED: u8 = 10;

/// AI provider configured but API key missing.
pub const EXIT_AI_MISSING_KEY: u8 = 11;

/// The model answered but no table could be extracted.
pub const EXIT_AI_EXTRACTION: u8 = 12;

// =============================================================================
// Viz (20-29)
// =============================================================================

/// Analysis finished but no chart could be produced.
pub const EXIT_VIZ_NO_CHARTS: u8 = 20;

/// Exit code for a handler response, by status and body.
pub fn exit_code_for(response: &ApiResponse) -> u8 {
    match response.status {
        200 => EXIT_SUCCESS,
        400 => EXIT_REJECTED,
        404 => EXIT_NOT_FOUND,
        _ if response.body.get("aiExplanation").is_some() => EXIT_AI_EXTRACTION,
        _ => EXIT_ERROR,
    }
}
