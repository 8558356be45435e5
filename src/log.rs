//! Logging setup for tierflow.
//!
//! Call sites use the `tracing` macros directly. This module installs the
//! subscriber that writes them to `~/.tierflow/tierflow.log`.
//!
//! Debug mode can be enabled with `--debug` flag or `TIERFLOW_DEBUG=1` env var.
//! `RUST_LOG` takes precedence over both when set.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Environment variable that turns on debug logging.
pub const DEBUG_ENV: &str = "TIERFLOW_DEBUG";

/// Initialize logging with explicit debug mode setting.
pub fn init_with_debug(debug: bool) {
    let debug_enabled = debug || env_debug();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    let Some(path) = log_path() else {
        return;
    };
    if let Some(dir) = path.parent() {
        let _ = std::fs::create_dir_all(dir);
    }
    // Truncate file on startup
    let Ok(file) = File::create(&path) else {
        return;
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init();
}

/// Location of the log file, if a home directory exists.
pub fn log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".tierflow").join("tierflow.log"))
}

fn env_debug() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "tierflow=debug"
    } else {
        "tierflow=info"
    }
}
