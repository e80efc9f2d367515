//! Fixed-length waveform buffers.
//!
//! A [`WaveformBuffer`] is a value-semantics snapshot of one axis trajectory.
//! Building one copies the caller's samples, so later changes to the source
//! slice never reach a buffer that has already been handed to the device.

use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};
use crate::nanodrive::axis::AxisId;

/// Largest waveform the NanoDrive accepts, in points.
pub const MAX_DATAPOINTS: usize = 6666;

/// Validates a requested point count against the device limit.
pub fn validate_point_count(num_points: usize) -> AppResult<usize> {
    if num_points == 0 || num_points > MAX_DATAPOINTS {
        return Err(DaqError::PointCountOutOfRange {
            requested: num_points,
            max: MAX_DATAPOINTS,
        });
    }
    Ok(num_points)
}

/// Immutable displacement trajectory in microns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaveformBuffer {
    samples: Box<[f64]>,
}

impl WaveformBuffer {
    /// Copies `values` into a buffer, requiring exactly `expected_length` points.
    pub fn build(values: &[f64], expected_length: usize) -> AppResult<Self> {
        Self::build_for(None, values, expected_length)
    }

    /// Like [`build`](Self::build), naming `axis` in a length mismatch.
    pub fn build_for(
        axis: Option<AxisId>,
        values: &[f64],
        expected_length: usize,
    ) -> AppResult<Self> {
        if values.len() != expected_length {
            return Err(DaqError::LengthMismatch {
                axis,
                expected: expected_length,
                actual: values.len(),
            });
        }
        Ok(Self {
            samples: values.into(),
        })
    }

    /// Zero-filled buffer, used for unused axes of a multi-axis job.
    pub fn zeros(len: usize) -> Self {
        Self {
            samples: vec![0.0; len].into_boxed_slice(),
        }
    }

    /// Takes ownership of samples filled in by the device.
    pub(crate) fn from_device(samples: Vec<f64>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    /// Evenly spaced ramp from `start` to `end` inclusive.
    ///
    /// A single-point ramp holds `start`.
    pub fn ramp(start: f64, end: f64, num_points: usize) -> AppResult<Self> {
        validate_point_count(num_points)?;
        let step = if num_points > 1 {
            (end - start) / (num_points - 1) as f64
        } else {
            0.0
        };
        let samples = (0..num_points).map(|i| start + step * i as f64).collect();
        Ok(Self::from_device(samples))
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for an empty buffer.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    /// Copies the samples out.
    pub fn to_vec(&self) -> Vec<f64> {
        self.samples.to_vec()
    }
}

impl Deref for WaveformBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.samples
    }
}

impl AsRef<[f64]> for WaveformBuffer {
    fn as_ref(&self) -> &[f64] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_wrong_length() {
        let err = WaveformBuffer::build(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(
            err,
            DaqError::LengthMismatch {
                axis: None,
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_build_copies_source() {
        let mut source = vec![0.0, 1.0, 2.0];
        let buffer = WaveformBuffer::build(&source, 3).unwrap();
        source[0] = 42.0;
        source.push(3.0);
        assert_eq!(buffer.as_slice(), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_point_count_limits() {
        assert!(validate_point_count(1).is_ok());
        assert!(validate_point_count(MAX_DATAPOINTS).is_ok());
        assert!(matches!(
            validate_point_count(0),
            Err(DaqError::PointCountOutOfRange { requested: 0, .. })
        ));
        assert!(matches!(
            validate_point_count(MAX_DATAPOINTS + 1),
            Err(DaqError::PointCountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_ramp_endpoints() {
        let ramp = WaveformBuffer::ramp(0.0, 9.0, 10).unwrap();
        assert_eq!(ramp.len(), 10);
        assert_eq!(ramp[0], 0.0);
        assert_eq!(ramp[9], 9.0);
        assert_eq!(ramp[4], 4.0);

        let single = WaveformBuffer::ramp(5.0, 9.0, 1).unwrap();
        assert_eq!(single.as_slice(), &[5.0]);
    }

    #[test]
    fn test_zeros() {
        let zeros = WaveformBuffer::zeros(4);
        assert_eq!(zeros.as_slice(), &[0.0; 4]);
    }
}
