//! Configuration System using Figment
//!
//! Settings are layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. A TOML file (`confocal.toml` in the working directory, or an explicit path)
//! 3. Environment variables prefixed with `CONFOCAL_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! CONFOCAL_APPLICATION__LOG_LEVEL=debug
//! CONFOCAL_NANODRIVE__SERIAL=2849
//! CONFOCAL_SCAN__RESOLUTION_UM=0.05
//! ```
//!
//! # Example
//!
//! ```no_run
//! use confocal_daq::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load(None)?;
//!     println!("Nano Drive serial: {}", settings.nanodrive.serial);
//!     println!("Read rate: {} ms", settings.nanodrive.read_rate_ms);
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};
use crate::experiment::ConfocalScan;
use crate::nanodrive::{validate_point_count, AxisId, LoadRate, ReadRate};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "confocal.toml";

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "CONFOCAL_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging settings
    #[serde(default)]
    pub application: LoggingConfig,
    /// Stage controller settings
    #[serde(default)]
    pub nanodrive: NanoDriveConfig,
    /// Confocal scan geometry and timing
    #[serde(default)]
    pub scan: ScanConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// `[application]` section: logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Output format
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// `[nanodrive]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NanoDriveConfig {
    /// Controller serial (lab LP100: 2849, HS3: 2850)
    pub serial: i16,
    /// Default axis for waveform commands (x, y, z, aux)
    pub axis: String,
    /// Read rate in ms: 0.267, 0.5, 1, 2, 10, 17 or 20
    pub read_rate_ms: f64,
    /// Load rate in ms, 1/6 to 5
    pub load_rate_ms: f64,
    /// Single-axis waveform length, 1 to 6666
    pub num_datapoints: usize,
    /// Distance from the target counted as settled, in microns
    pub settle_tolerance_um: f64,
    /// Settle timeout in milliseconds
    pub settle_timeout_ms: u64,
    /// Delay between settle polls in milliseconds
    pub settle_poll_interval_ms: u64,
    /// Wait of the attached check in milliseconds
    pub attach_timeout_ms: u32,
}

impl Default for NanoDriveConfig {
    fn default() -> Self {
        Self {
            serial: 2850,
            axis: "x".to_string(),
            read_rate_ms: 2.0,
            load_rate_ms: 2.0,
            num_datapoints: 1,
            settle_tolerance_um: 0.01,
            settle_timeout_ms: 500,
            settle_poll_interval_ms: 2,
            attach_timeout_ms: 0,
        }
    }
}

/// Stage coordinates in microns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub x: f64,
    pub y: f64,
}

/// `[scan]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Lower-left corner
    pub point_a: ScanPoint,
    /// Upper-right corner
    pub point_b: ScanPoint,
    /// Pixel pitch in microns
    pub resolution_um: f64,
    /// Dwell per pixel in ms, also the load rate of the y waveform
    pub time_per_point_ms: f64,
    /// Sensor read rate during a line
    pub read_rate_ms: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            point_a: ScanPoint { x: 0.0, y: 0.0 },
            point_b: ScanPoint { x: 10.0, y: 10.0 },
            resolution_um: 0.1,
            time_per_point_ms: 0.5,
            read_rate_ms: 0.5,
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from `path` (or `confocal.toml`) and the environment.
    ///
    /// An explicit path must exist; the default file is optional.
    ///
    /// # Errors
    ///
    /// Returns a `DaqError` if the file cannot be parsed, a value has the
    /// wrong type, or validation fails.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(DaqError::Configuration(format!(
                    "config file not found: {}",
                    path.display()
                )))
            }
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Self::figment(&file).extract::<Self>()?.validated()
    }

    /// The provider stack used by [`load`](Self::load).
    pub fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn validated(self) -> AppResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid
    /// - Axis label, rates and point count are accepted by the stage
    /// - Settle tolerance is positive
    /// - Scan resolution and timing are positive and the corners are ordered
    /// - The scan grid fits the line and waveform point limits
    ///
    /// # Errors
    ///
    /// Returns `DaqError::Configuration` with a descriptive message.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let nd = &self.nanodrive;
        nd.axis
            .parse::<AxisId>()
            .map_err(|e| invalid(format!("nanodrive.axis: {e}")))?;
        ReadRate::from_ms(nd.read_rate_ms)
            .map_err(|e| invalid(format!("nanodrive.read_rate_ms: {e}")))?;
        LoadRate::from_ms(nd.load_rate_ms)
            .map_err(|e| invalid(format!("nanodrive.load_rate_ms: {e}")))?;
        validate_point_count(nd.num_datapoints)
            .map_err(|e| invalid(format!("nanodrive.num_datapoints: {e}")))?;
        if !(nd.settle_tolerance_um > 0.0) {
            return Err(invalid(format!(
                "nanodrive.settle_tolerance_um must be positive, got {}",
                nd.settle_tolerance_um
            )));
        }

        let scan = &self.scan;
        if !(scan.resolution_um > 0.0) {
            return Err(invalid(format!(
                "scan.resolution_um must be positive, got {}",
                scan.resolution_um
            )));
        }
        if !(scan.time_per_point_ms > 0.0) {
            return Err(invalid(format!(
                "scan.time_per_point_ms must be positive, got {}",
                scan.time_per_point_ms
            )));
        }
        ReadRate::from_ms(scan.read_rate_ms)
            .map_err(|e| invalid(format!("scan.read_rate_ms: {e}")))?;
        if scan.point_b.x < scan.point_a.x || scan.point_b.y < scan.point_a.y {
            return Err(invalid(format!(
                "scan.point_b ({}, {}) must not lie below or left of scan.point_a ({}, {})",
                scan.point_b.x, scan.point_b.y, scan.point_a.x, scan.point_a.y
            )));
        }
        ConfocalScan::grid_size(scan).map_err(|e| invalid(format!("scan: {e}")))?;

        Ok(())
    }
}

fn invalid(message: String) -> DaqError {
    DaqError::Configuration(message)
}
