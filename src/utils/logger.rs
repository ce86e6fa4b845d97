//! Logger setup shared by both binaries.

use std::io;

use env_logger::{Builder, Env, DEFAULT_FILTER_ENV};
use log::{info, LevelFilter};

/// Maps a configured level name to a filter. Unknown names fall back to
/// `Info`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// Initializes the logger with timestamps and module paths.
///
/// Runs before the configuration is read, so it starts at `Info`; call
/// [`apply_level`] once the configured level is known. A `RUST_LOG`
/// filter takes precedence over both.
///
/// # Returns
///
/// * `Ok(())` - The global logger is installed
/// * `Err(io::Error)` - Another logger was already installed
pub fn init() -> Result<(), io::Error> {
    let mut builder = Builder::new();
    builder
        .format_timestamp_secs()
        .format_module_path(true)
        .filter_level(LevelFilter::Trace)
        .parse_env(Env::default());

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    if !env_override() {
        log::set_max_level(LevelFilter::Info);
    }
    Ok(())
}

/// Switches to the configured level unless `RUST_LOG` is set.
pub fn apply_level(level: &str) {
    if env_override() {
        return;
    }
    log::set_max_level(level_filter(level));
    info!("Logging at {} level", level);
}

fn env_override() -> bool {
    std::env::var_os(DEFAULT_FILTER_ENV).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::Debug);
        assert_eq!(level_filter("Warning"), LevelFilter::Warn);
        assert_eq!(level_filter("verbose"), LevelFilter::Info);
    }

    #[test]
    fn configured_level_applies_after_init() {
        init().unwrap();
        assert!(init().is_err());
        if env_override() {
            return;
        }

        // Messages logged while the config loads are kept at Info.
        assert_eq!(log::max_level(), LevelFilter::Info);
        apply_level("debug");
        assert_eq!(log::max_level(), LevelFilter::Debug);
        apply_level("warning");
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}
