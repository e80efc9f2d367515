//! Axis addressing: logical axis labels to NanoDrive channel codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};

/// Logical stage axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    X,
    Y,
    Z,
    Aux,
}

/// Channel code the vendor library expects for an axis (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisChannel(u32);

impl AxisChannel {
    /// Raw code passed to the vendor entry points.
    pub fn code(self) -> u32 {
        self.0
    }
}

impl AxisId {
    /// All axes in channel order.
    pub const ALL: [AxisId; 4] = [AxisId::X, AxisId::Y, AxisId::Z, AxisId::Aux];

    /// Axes driven by a multi-axis waveform, in buffer order.
    pub const MULTI_AXIS: [AxisId; 3] = [AxisId::X, AxisId::Y, AxisId::Z];

    /// Device channel code for this axis.
    pub fn channel(self) -> AxisChannel {
        match self {
            AxisId::X => AxisChannel(1),
            AxisId::Y => AxisChannel(2),
            AxisId::Z => AxisChannel(3),
            AxisId::Aux => AxisChannel(4),
        }
    }

    /// Buffer slot in a multi-axis job. `Aux` has none.
    pub fn multi_axis_slot(self) -> Option<usize> {
        match self {
            AxisId::X => Some(0),
            AxisId::Y => Some(1),
            AxisId::Z => Some(2),
            AxisId::Aux => None,
        }
    }

    /// Lowercase label, as accepted by [`resolve`].
    pub fn label(self) -> &'static str {
        match self {
            AxisId::X => "x",
            AxisId::Y => "y",
            AxisId::Z => "z",
            AxisId::Aux => "aux",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AxisId {
    type Err = DaqError;

    fn from_str(label: &str) -> AppResult<Self> {
        match label.to_ascii_lowercase().as_str() {
            "x" => Ok(AxisId::X),
            "y" => Ok(AxisId::Y),
            "z" => Ok(AxisId::Z),
            "aux" => Ok(AxisId::Aux),
            _ => Err(DaqError::InvalidAxis {
                label: label.to_string(),
            }),
        }
    }
}

/// Resolves a case-insensitive axis label to its device channel code.
pub fn resolve(label: &str) -> AppResult<AxisChannel> {
    label.parse::<AxisId>().map(AxisId::channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(resolve("x").unwrap().code(), 1);
        assert_eq!(resolve("Y").unwrap().code(), 2);
        assert_eq!(resolve("z").unwrap().code(), 3);
        assert_eq!(resolve("AUX").unwrap().code(), 4);
        assert_eq!(resolve("Aux").unwrap().code(), 4);
    }

    #[test]
    fn test_resolve_rejects_unknown_labels() {
        for label in ["", "w", "x_pos", " x", "xy"] {
            match resolve(label) {
                Err(DaqError::InvalidAxis { label: got }) => assert_eq!(got, label),
                other => panic!("expected InvalidAxis for {label:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_multi_axis_slots() {
        let slots: Vec<_> = AxisId::ALL.iter().map(|a| a.multi_axis_slot()).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2), None]);
    }

    #[test]
    fn test_label_round_trip() {
        for axis in AxisId::ALL {
            assert_eq!(axis.label().parse::<AxisId>().unwrap(), axis);
        }
    }
}
