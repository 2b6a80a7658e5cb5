//! Diagnostic-aware logging configuration.
//!
//! The configured level is the baseline. When diagnostics are disabled only
//! WARN and ERROR logs are output.

use lazy_static::lazy_static;
use log::LevelFilter;
use std::str::FromStr;
use std::sync::Mutex;

lazy_static! {
    static ref BASE_LEVEL: Mutex<LevelFilter> = Mutex::new(LevelFilter::Info);
}

/// Unknown names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    LevelFilter::from_str(level.trim()).unwrap_or(LevelFilter::Info)
}

/// Initialize the logging system. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, diagnostics: bool) {
    let env_filter = std::env::var("RUST_LOG").ok();

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(parse_level(level))
        .format_timestamp_millis()
        .format_module_path(true);
    if let Some(spec) = &env_filter {
        builder.parse_filters(spec);
    }

    // The env filter does its own per-module limiting.
    let base = match env_filter {
        Some(_) => LevelFilter::Trace,
        None => parse_level(level),
    };
    if let Ok(mut stored) = BASE_LEVEL.lock() {
        *stored = base;
    }
    if let Err(e) = builder.try_init() {
        eprintln!("[DiagnosticLogger] Logger already initialized: {}", e);
    }

    set_diagnostics_enabled(diagnostics);
}

/// When disabled, debug/info logs are silenced.
pub fn set_diagnostics_enabled(enabled: bool) {
    log::set_max_level(effective_level(enabled));
}

fn effective_level(enabled: bool) -> LevelFilter {
    let base = BASE_LEVEL.lock().map(|l| *l).unwrap_or(LevelFilter::Info);
    if enabled {
        base
    } else {
        base.min(LevelFilter::Warn)
    }
}
