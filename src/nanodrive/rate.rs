//! Sample rate settings.
//!
//! Read rates and multi-axis time steps are restricted to a fixed table of
//! device codes; load rates are passed through in milliseconds but must lie
//! within the range the DAC can step at. Invalid values are rejected, never
//! clamped.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};

/// Which rate setting a value was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKind {
    Read,
    Load,
    TimeStep,
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateKind::Read => write!(f, "read rate"),
            RateKind::Load => write!(f, "load rate"),
            RateKind::TimeStep => write!(f, "multi-axis time step"),
        }
    }
}

// Float table lookups tolerate config round-off, nothing more.
const MS_EPSILON: f64 = 1e-6;

fn same_ms(a: f64, b: f64) -> bool {
    (a - b).abs() < MS_EPSILON
}

// =============================================================================
// ReadRate
// =============================================================================

/// Sensor sampling period for waveform reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub enum ReadRate {
    /// 0.267 ms
    Ms0267,
    /// 0.5 ms
    Ms0_5,
    /// 1 ms
    Ms1,
    /// 2 ms
    Ms2,
    /// 10 ms
    Ms10,
    /// 17 ms
    Ms17,
    /// 20 ms
    Ms20,
}

impl ReadRate {
    /// Every legal read rate, fastest first.
    pub const ALL: [ReadRate; 7] = [
        ReadRate::Ms0267,
        ReadRate::Ms0_5,
        ReadRate::Ms1,
        ReadRate::Ms2,
        ReadRate::Ms10,
        ReadRate::Ms17,
        ReadRate::Ms20,
    ];

    /// Period in milliseconds.
    pub fn millis(self) -> f64 {
        match self {
            ReadRate::Ms0267 => 0.267,
            ReadRate::Ms0_5 => 0.5,
            ReadRate::Ms1 => 1.0,
            ReadRate::Ms2 => 2.0,
            ReadRate::Ms10 => 10.0,
            ReadRate::Ms17 => 17.0,
            ReadRate::Ms20 => 20.0,
        }
    }

    /// Rate code understood by the waveform read entry points.
    pub fn device_code(self) -> f64 {
        match self {
            ReadRate::Ms0267 => 3.0,
            ReadRate::Ms0_5 => 4.0,
            ReadRate::Ms1 => 5.0,
            ReadRate::Ms2 => 6.0,
            ReadRate::Ms10 => 7.0,
            ReadRate::Ms17 => 8.0,
            ReadRate::Ms20 => 9.0,
        }
    }

    /// Looks up the rate for a period in milliseconds.
    pub fn from_ms(ms: f64) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| same_ms(rate.millis(), ms))
            .ok_or(DaqError::InvalidRate {
                kind: RateKind::Read,
                value_ms: ms,
            })
    }
}

impl From<ReadRate> for f64 {
    fn from(rate: ReadRate) -> f64 {
        rate.millis()
    }
}

impl TryFrom<f64> for ReadRate {
    type Error = DaqError;

    fn try_from(ms: f64) -> AppResult<Self> {
        Self::from_ms(ms)
    }
}

// =============================================================================
// LoadRate
// =============================================================================

/// DAC stepping period for waveform loads, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub struct LoadRate(f64);

impl LoadRate {
    /// Fastest allowed period (1/6 ms).
    pub const MIN_MS: f64 = 1.0 / 6.0;
    /// Slowest allowed period.
    pub const MAX_MS: f64 = 5.0;
    /// 2 ms, the power-on default.
    pub const DEFAULT: LoadRate = LoadRate(2.0);

    /// Validates a period in milliseconds.
    pub fn from_ms(ms: f64) -> AppResult<Self> {
        if (Self::MIN_MS - MS_EPSILON..=Self::MAX_MS).contains(&ms) {
            Ok(Self(ms))
        } else {
            Err(DaqError::InvalidRate {
                kind: RateKind::Load,
                value_ms: ms,
            })
        }
    }

    /// Period in milliseconds, which is also what the device receives.
    pub fn millis(self) -> f64 {
        self.0
    }
}

impl From<LoadRate> for f64 {
    fn from(rate: LoadRate) -> f64 {
        rate.0
    }
}

impl TryFrom<f64> for LoadRate {
    type Error = DaqError;

    fn try_from(ms: f64) -> AppResult<Self> {
        Self::from_ms(ms)
    }
}

// =============================================================================
// TimeStep
// =============================================================================

/// Shared point period of a multi-axis waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub enum TimeStep {
    /// 0.267 ms
    Ms0267,
    /// 0.5 ms
    Ms0_5,
    /// 1 ms
    Ms1,
    /// 2 ms
    Ms2,
}

impl TimeStep {
    /// Every legal time step, fastest first.
    pub const ALL: [TimeStep; 4] = [
        TimeStep::Ms0267,
        TimeStep::Ms0_5,
        TimeStep::Ms1,
        TimeStep::Ms2,
    ];

    /// Period in milliseconds.
    pub fn millis(self) -> f64 {
        match self {
            TimeStep::Ms0267 => 0.267,
            TimeStep::Ms0_5 => 0.5,
            TimeStep::Ms1 => 1.0,
            TimeStep::Ms2 => 2.0,
        }
    }

    /// Code understood by the multi-axis setup entry point.
    pub fn device_code(self) -> f64 {
        match self {
            TimeStep::Ms0267 => 3.0,
            TimeStep::Ms0_5 => 4.0,
            TimeStep::Ms1 => 5.0,
            TimeStep::Ms2 => 6.0,
        }
    }

    /// Looks up the time step for a period in milliseconds.
    pub fn from_ms(ms: f64) -> AppResult<Self> {
        Self::ALL
            .into_iter()
            .find(|step| same_ms(step.millis(), ms))
            .ok_or(DaqError::InvalidRate {
                kind: RateKind::TimeStep,
                value_ms: ms,
            })
    }
}

impl From<TimeStep> for f64 {
    fn from(step: TimeStep) -> f64 {
        step.millis()
    }
}

impl TryFrom<f64> for TimeStep {
    type Error = DaqError;

    fn try_from(ms: f64) -> AppResult<Self> {
        Self::from_ms(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_rate_table() {
        let codes: Vec<f64> = [0.267, 0.5, 1.0, 2.0, 10.0, 17.0, 20.0]
            .into_iter()
            .map(|ms| ReadRate::from_ms(ms).unwrap().device_code())
            .collect();
        assert_eq!(codes, vec![3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_read_rate_rejects_unlisted_values() {
        for ms in [0.0, 0.25, 3.0, 5.0, 100.0, f64::NAN] {
            assert!(matches!(
                ReadRate::from_ms(ms),
                Err(DaqError::InvalidRate {
                    kind: RateKind::Read,
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_load_rate_bounds() {
        assert!(LoadRate::from_ms(1.0 / 6.0).is_ok());
        assert!(LoadRate::from_ms(5.0).is_ok());
        assert_eq!(LoadRate::from_ms(0.5).unwrap().millis(), 0.5);
        for ms in [0.1, 5.01, -1.0, f64::NAN] {
            assert!(LoadRate::from_ms(ms).is_err(), "{ms} should be rejected");
        }
    }

    #[test]
    fn test_time_step_excludes_slow_read_rates() {
        assert_eq!(TimeStep::from_ms(1.0).unwrap().device_code(), 5.0);
        assert!(TimeStep::from_ms(10.0).is_err());
    }

    #[test]
    fn test_rates_serialize_as_millis() {
        let json = serde_json::to_string(&ReadRate::Ms0_5).unwrap();
        assert_eq!(json, "0.5");
        let rate: ReadRate = serde_json::from_str("17.0").unwrap();
        assert_eq!(rate, ReadRate::Ms17);
        assert!(serde_json::from_str::<LoadRate>("9.0").is_err());
    }
}
