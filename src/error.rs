//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides one consistent way to surface
//! everything from local validation failures to faults reported by the
//! NanoDrive firmware.
//!
//! ## Error Hierarchy
//!
//! - **Local validation** (`InvalidAxis`, `LengthMismatch`, `InvalidRate`,
//!   `PointCountOutOfRange`, `NotConfigured`): detected before any device call
//!   is issued, so a rejected request never costs a hardware round-trip.
//! - **`Device`**: a vendor entry point returned a negative status. The
//!   categorized [`DeviceFault`] is kept as the error source together with the
//!   name of the entry point that failed.
//! - **`HandleUnavailable`** / **`SettleTimeout`**: lifecycle and positioning
//!   failures of the stage itself.
//! - **`Config`** / **`Configuration`**: parse errors from `figment` and
//!   semantic errors caught by `Settings::validate`.
//!
//! Nothing here is retried internally. Re-triggering hardware without first
//! re-synchronizing state risks duplicate motion, so the caller decides.

use std::time::Duration;

use thiserror::Error;

use crate::nanodrive::axis::AxisId;
use crate::nanodrive::rate::RateKind;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Categorized failure reported by the NanoDrive firmware.
///
/// Status codes `-1..=-8` map 1:1 onto the named variants; any other negative
/// status is preserved verbatim in [`DeviceFault::Unclassified`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    #[error("GENERAL_ERROR: an internal sanity check failed")]
    GeneralFault,

    #[error("DEVICE_ERROR: data transfer to the Nano Drive failed, a power cycle is likely required")]
    DeviceTransferFault,

    #[error("DEVICE_NOT_ATTACHED: the Nano Drive is not attached")]
    DeviceNotAttached,

    #[error("USAGE_ERROR: the Nano Drive does not support this function")]
    UnsupportedOperation,

    #[error("DEVICE_NOT_READY: the Nano Drive is completing or waiting to complete another task")]
    DeviceBusy,

    #[error("ARGUMENT_ERROR: an argument is out of range or a required pointer is NULL")]
    ArgumentOutOfRange,

    #[error("INVALID_AXIS: the axis does not exist on this Nano Drive")]
    InvalidAxis,

    #[error("INVALID_HANDLE: the handle is not valid in this instance of the library")]
    InvalidHandle,

    #[error("unclassified device error (status {0})")]
    Unclassified(i32),
}

impl DeviceFault {
    /// Raw status code as returned by the vendor library.
    pub fn code(self) -> i32 {
        match self {
            Self::GeneralFault => -1,
            Self::DeviceTransferFault => -2,
            Self::DeviceNotAttached => -3,
            Self::UnsupportedOperation => -4,
            Self::DeviceBusy => -5,
            Self::ArgumentOutOfRange => -6,
            Self::InvalidAxis => -7,
            Self::InvalidHandle => -8,
            Self::Unclassified(code) => code,
        }
    }
}

/// A readiness track that must be configured before a trigger or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// Single-axis read waveform (`setup_read`).
    Read,
    /// Single-axis load waveform (`setup_load`).
    Load,
    /// Both single-axis tracks, as required by `acquire`.
    ReadAndLoad,
    /// Multi-axis waveform (`MultiAxis::setup`).
    MultiAxis,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read waveform"),
            Self::Load => write!(f, "load waveform"),
            Self::ReadAndLoad => write!(f, "read and load waveforms"),
            Self::MultiAxis => write!(f, "multi-axis waveform"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Invalid axis '{label}': expected one of x, y, z, aux")]
    InvalidAxis { label: String },

    #[error("Waveform length mismatch{}: expected {expected} points, got {actual}", axis_suffix(.axis))]
    LengthMismatch {
        axis: Option<AxisId>,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {kind}: {value_ms} ms is not an allowed value")]
    InvalidRate { kind: RateKind, value_ms: f64 },

    #[error("Number of datapoints {requested} is outside 1..={max}")]
    PointCountOutOfRange { requested: usize, max: usize },

    #[error("{0} has not been set up")]
    NotConfigured(Track),

    #[error("{operation} failed: {fault}")]
    Device {
        operation: &'static str,
        #[source]
        fault: DeviceFault,
    },

    #[error("No Nano Drive handle available for serial {serial}")]
    HandleUnavailable { serial: i16 },

    #[error("Axis {axis} did not settle at {target} um within {timeout:?} (last reading {last} um)")]
    SettleTimeout {
        axis: AxisId,
        target: f64,
        last: f64,
        timeout: Duration,
    },

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaqError {
    /// Wraps a device fault with the entry point that reported it.
    pub fn device(operation: &'static str, fault: DeviceFault) -> Self {
        Self::Device { operation, fault }
    }

    /// The device fault behind this error, if any.
    pub fn fault(&self) -> Option<DeviceFault> {
        match self {
            Self::Device { fault, .. } => Some(*fault),
            _ => None,
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

fn axis_suffix(axis: &Option<AxisId>) -> String {
    axis.map(|a| format!(" on axis {a}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::NotConfigured(Track::Read);
        assert_eq!(err.to_string(), "read waveform has not been set up");
    }

    #[test]
    fn test_length_mismatch_names_axis() {
        let err = DaqError::LengthMismatch {
            axis: Some(AxisId::Y),
            expected: 10,
            actual: 9,
        };
        assert_eq!(
            err.to_string(),
            "Waveform length mismatch on axis y: expected 10 points, got 9"
        );

        let err = DaqError::LengthMismatch {
            axis: None,
            expected: 3,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "Waveform length mismatch: expected 3 points, got 4"
        );
    }

    #[test]
    fn test_device_error_keeps_fault() {
        let err = DaqError::device("MCL_Trigger_ReadWaveFormN", DeviceFault::DeviceBusy);
        assert_eq!(err.fault(), Some(DeviceFault::DeviceBusy));
        assert!(err.to_string().starts_with("MCL_Trigger_ReadWaveFormN failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_fault_codes_round_trip_to_raw() {
        assert_eq!(DeviceFault::InvalidAxis.code(), -7);
        assert_eq!(DeviceFault::Unclassified(-99).code(), -99);
    }
}
