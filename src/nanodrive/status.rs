//! Status code translation.
//!
//! Every vendor entry point reports failure through a negative sentinel. All
//! call sites go through these helpers so nothing above this module branches
//! on raw integers.

use crate::error::{AppResult, DaqError, DeviceFault};

/// Maps a vendor status code onto success or a categorized fault.
///
/// Zero and positive codes are success and are passed through (some entry
/// points return a count). Unknown negative codes are never coerced to
/// success; they come back as [`DeviceFault::Unclassified`].
pub fn translate(status: i32) -> Result<i32, DeviceFault> {
    match status {
        s if s >= 0 => Ok(s),
        -1 => Err(DeviceFault::GeneralFault),
        -2 => Err(DeviceFault::DeviceTransferFault),
        -3 => Err(DeviceFault::DeviceNotAttached),
        -4 => Err(DeviceFault::UnsupportedOperation),
        -5 => Err(DeviceFault::DeviceBusy),
        -6 => Err(DeviceFault::ArgumentOutOfRange),
        -7 => Err(DeviceFault::InvalidAxis),
        -8 => Err(DeviceFault::InvalidHandle),
        other => Err(DeviceFault::Unclassified(other)),
    }
}

/// Translates a reading returned as a double.
///
/// Position and calibration reads return the value itself, or one of the
/// integral error sentinels. Positions are never negative, so any negative
/// integral value is a fault.
pub fn translate_reading(value: f64) -> Result<f64, DeviceFault> {
    if value < 0.0 && value.fract() == 0.0 && value >= f64::from(i32::MIN) {
        translate(value as i32).map(|_| value)
    } else {
        Ok(value)
    }
}

/// Checks `status` from `operation`, wrapping faults in [`DaqError::Device`].
pub(crate) fn check(operation: &'static str, status: i32) -> AppResult<i32> {
    translate(status).map_err(|fault| DaqError::device(operation, fault))
}

/// Checks a double-valued reading from `operation`.
pub(crate) fn check_reading(operation: &'static str, value: f64) -> AppResult<f64> {
    translate_reading(value).map_err(|fault| DaqError::device(operation, fault))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_codes() {
        assert_eq!(translate(0), Ok(0));
        assert_eq!(translate(3), Ok(3));
    }

    #[test]
    fn test_known_fault_codes() {
        let expected = [
            DeviceFault::GeneralFault,
            DeviceFault::DeviceTransferFault,
            DeviceFault::DeviceNotAttached,
            DeviceFault::UnsupportedOperation,
            DeviceFault::DeviceBusy,
            DeviceFault::ArgumentOutOfRange,
            DeviceFault::InvalidAxis,
            DeviceFault::InvalidHandle,
        ];
        for (i, fault) in expected.into_iter().enumerate() {
            let code = -(i as i32) - 1;
            assert_eq!(translate(code), Err(fault));
            assert_eq!(fault.code(), code);
        }
    }

    #[test]
    fn test_invalid_axis_status() {
        assert_eq!(translate(-7), Err(DeviceFault::InvalidAxis));
    }

    #[test]
    fn test_unknown_code_preserved() {
        assert_eq!(translate(-99), Err(DeviceFault::Unclassified(-99)));
        assert_eq!(translate(i32::MIN), Err(DeviceFault::Unclassified(i32::MIN)));
    }

    #[test]
    fn test_readings() {
        assert_eq!(translate_reading(12.5), Ok(12.5));
        assert_eq!(translate_reading(0.0), Ok(0.0));
        assert_eq!(translate_reading(-3.0), Err(DeviceFault::DeviceNotAttached));
        assert_eq!(translate_reading(-99.0), Err(DeviceFault::Unclassified(-99)));
        // Small negative drift around zero is a position, not a sentinel.
        assert_eq!(translate_reading(-0.002), Ok(-0.002));
    }

    #[test]
    fn test_check_names_operation() {
        let err = check("MCL_WfmaTrigger", -5).unwrap_err();
        assert_eq!(err.fault(), Some(DeviceFault::DeviceBusy));
        assert!(err.to_string().contains("MCL_WfmaTrigger"));
    }
}
