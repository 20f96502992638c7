pub mod prepare;
pub mod run_offline;
pub mod run_online;
pub mod scan;

use std::path::Path;
use tracing::error;

/// Process exit codes shared by every subcommand.
pub const EXIT_OK: i32 = 0;
pub const EXIT_COMPARE_FAILED: i32 = 2;
pub const EXIT_CONFIG_ERROR: i32 = 3;

/// Write text to `out` when given, stdout otherwise.
pub fn emit(out: Option<&Path>, text: &str) -> std::io::Result<()> {
    match out {
        Some(path) => std::fs::write(path, text),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

/// Log a fatal error and map it to the config-error exit code.
pub fn fail(context: &str, error: &dyn std::fmt::Display) -> i32 {
    error!(%error, "{context}");
    EXIT_CONFIG_ERROR
}
