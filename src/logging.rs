//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level, so a single run
//! can be made verbose without editing the config file:
//!
//! ```text
//! RUST_LOG=confocal_daq::nanodrive=debug confocal_daq --simulate acquire --ramp 0,10,100
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{AppResult, DaqError};

/// Installs the global subscriber.
///
/// Returns `Ok(false)` if a subscriber was already installed (tests, or a
/// host application), which is left in place.
pub fn init(config: &LoggingConfig) -> AppResult<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            DaqError::Configuration(format!("invalid log level '{}': {e}", config.log_level))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match config.log_format {
        LogFormat::Pretty => builder.with_target(true).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };
    Ok(installed.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_not_an_error() {
        let config = LoggingConfig::default();
        let _ = init(&config).unwrap();
        assert!(!init(&config).unwrap());
    }

    #[test]
    fn test_bad_level_is_rejected() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            log_level: "confocal_daq=verbose".into(),
            ..LoggingConfig::default()
        };
        assert!(matches!(init(&config), Err(DaqError::Configuration(_))));
    }
}
