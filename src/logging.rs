use crate::{Error, Result};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

/// Validates that a log level string is valid
pub fn validate_log_level(level: &str) -> Result<()> {
    level.parse::<LevelFilter>().map_err(|_| {
        Error::config(format!(
            "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
            level
        ))
    })?;
    Ok(())
}

/// Settings that carry the configured log level.
pub trait LogLevel {
    fn log_level(&self) -> &str;
}

/// Loads settings with `load`, then installs logging at their level. Prints
/// the failure and exits with status 1 when either step fails.
pub fn bootstrap<T: LogLevel>(load: impl FnOnce() -> Result<T>) -> T {
    try_bootstrap(load).unwrap_or_else(|message| {
        eprintln!("{}", message);
        std::process::exit(1)
    })
}

fn try_bootstrap<T: LogLevel>(load: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    let settings = load().map_err(|e| format!("Failed to load configuration: {}", e))?;
    init(settings.log_level()).map_err(|e| e.to_string())?;
    Ok(settings)
}

/// Installs the JSON subscriber on stderr. `RUST_LOG` overrides the configured level.
pub fn init(configured_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            validate_log_level(configured_level)?;
            EnvFilter::new(configured_level)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to install subscriber: {}", e)))?;

    Ok(())
}
