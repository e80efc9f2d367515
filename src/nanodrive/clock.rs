//! ISS clock outputs.
//!
//! The controller has four TTL outputs that can be driven manually, pulsed,
//! or bound to an axis or waveform event:
//!
//! - bound to `read`, a pulse is emitted for every recorded sample
//! - bound to `load`, a pulse is emitted before the first and after the last point
//!
//! The binding polarity codes of the vendor library run opposite to the
//! plain polarity codes; [`ClockPolarity`] hides that so low-to-high always
//! means low-to-high.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppResult, DaqError, DeviceFault};
use crate::hardware::Madlib;

use super::axis::AxisId;
use super::NanoDrive;

/// One of the four clock outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Clock {
    Pixel,
    Line,
    Frame,
    Aux,
}

impl Clock {
    pub const ALL: [Clock; 4] = [Clock::Pixel, Clock::Line, Clock::Frame, Clock::Aux];

    /// Code used by the ISS entry points.
    pub fn code(self) -> i32 {
        match self {
            Clock::Pixel => 1,
            Clock::Line => 2,
            Clock::Frame => 3,
            Clock::Aux => 4,
        }
    }

    fn slot(self) -> usize {
        self.code() as usize - 1
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Clock::Pixel => "Pixel",
            Clock::Line => "Line",
            Clock::Frame => "Frame",
            Clock::Aux => "Aux",
        };
        f.write_str(name)
    }
}

impl FromStr for Clock {
    type Err = DaqError;

    fn from_str(name: &str) -> AppResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pixel" => Ok(Clock::Pixel),
            "line" => Ok(Clock::Line),
            "frame" => Ok(Clock::Frame),
            "aux" => Ok(Clock::Aux),
            _ => Err(DaqError::Configuration(format!(
                "unknown clock '{name}': expected pixel, line, frame or aux"
            ))),
        }
    }
}

/// Idle level of an unbound clock output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    #[default]
    Low,
    High,
}

impl ClockMode {
    fn code(self) -> i32 {
        match self {
            ClockMode::Low => 0,
            ClockMode::High => 1,
        }
    }
}

/// Pulse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockPolarity {
    #[default]
    LowToHigh,
    HighToLow,
}

impl ClockPolarity {
    /// Code for `MCL_IssConfigurePolarity`.
    fn pulse_code(self) -> i32 {
        match self {
            ClockPolarity::LowToHigh => 2,
            ClockPolarity::HighToLow => 3,
        }
    }

    /// Code for `MCL_IssBindClockToAxis`.
    fn bind_code(self) -> i32 {
        match self {
            ClockPolarity::LowToHigh => 3,
            ClockPolarity::HighToLow => 2,
        }
    }
}

const UNBIND_CODE: i32 = 4;

/// What a clock output is tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockBinding {
    Axis(AxisId),
    Read,
    Load,
    #[default]
    None,
}

impl ClockBinding {
    fn code(self) -> Option<i32> {
        match self {
            ClockBinding::Axis(axis) => Some(axis.channel().code() as i32),
            ClockBinding::Read => Some(5),
            ClockBinding::Load => Some(6),
            ClockBinding::None => None,
        }
    }
}

impl FromStr for ClockBinding {
    type Err = DaqError;

    fn from_str(target: &str) -> AppResult<Self> {
        match target.to_ascii_lowercase().as_str() {
            "read" => Ok(ClockBinding::Read),
            "load" => Ok(ClockBinding::Load),
            "none" => Ok(ClockBinding::None),
            other => other.parse().map(ClockBinding::Axis),
        }
    }
}

/// Cached settings of one clock output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockState {
    pub mode: ClockMode,
    pub polarity: ClockPolarity,
    pub binding: ClockBinding,
}

/// Cached settings of all four clocks, as last applied through this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSettings {
    pub pixel: ClockState,
    pub line: ClockState,
    pub frame: ClockState,
    pub aux: ClockState,
}

impl Default for ClockSettings {
    /// Power-on state: pixel pulses on reads, line on loads.
    fn default() -> Self {
        Self {
            pixel: ClockState {
                binding: ClockBinding::Read,
                ..ClockState::default()
            },
            line: ClockState {
                binding: ClockBinding::Load,
                ..ClockState::default()
            },
            frame: ClockState::default(),
            aux: ClockState::default(),
        }
    }
}

impl ClockSettings {
    pub fn get(&self, clock: Clock) -> &ClockState {
        match clock {
            Clock::Pixel => &self.pixel,
            Clock::Line => &self.line,
            Clock::Frame => &self.frame,
            Clock::Aux => &self.aux,
        }
    }

    fn get_mut(&mut self, clock: Clock) -> &mut ClockState {
        match clock {
            Clock::Pixel => &mut self.pixel,
            Clock::Line => &mut self.line,
            Clock::Frame => &mut self.frame,
            Clock::Aux => &mut self.aux,
        }
    }
}

// One pulse entry point per clock.
const PULSE: [(&str, fn(&mut dyn Madlib, i32) -> i32); 4] = [
    ("MCL_PixelClock", |d, h| d.pixel_clock(h)),
    ("MCL_LineClock", |d, h| d.line_clock(h)),
    ("MCL_FrameClock", |d, h| d.frame_clock(h)),
    ("MCL_AuxClock", |d, h| d.aux_clock(h)),
];

impl<D: Madlib> NanoDrive<D> {
    /// Cached clock settings.
    pub fn clock_settings(&self) -> &ClockSettings {
        &self.clocks
    }

    /// Sets the idle level of `clock`.
    pub fn set_clock_mode(&mut self, clock: Clock, mode: ClockMode) -> AppResult<()> {
        self.call("MCL_IssSetClock", |d, h| {
            d.iss_set_clock(clock.code(), mode.code(), h)
        })?;
        self.clocks.get_mut(clock).mode = mode;
        Ok(())
    }

    /// Sets the direction of manual pulses on `clock`.
    pub fn set_clock_polarity(&mut self, clock: Clock, polarity: ClockPolarity) -> AppResult<()> {
        self.call("MCL_IssConfigurePolarity", |d, h| {
            d.iss_configure_polarity(clock.code(), polarity.pulse_code(), h)
        })?;
        self.clocks.get_mut(clock).polarity = polarity;
        Ok(())
    }

    /// Binds `clock` to an axis or waveform event, or unbinds it with
    /// [`ClockBinding::None`].
    ///
    /// The aux clock cannot be bound to load events. Unbinding a clock that
    /// is not bound sends nothing.
    pub fn bind_clock(
        &mut self,
        clock: Clock,
        polarity: ClockPolarity,
        binding: ClockBinding,
    ) -> AppResult<()> {
        if clock == Clock::Aux && binding == ClockBinding::Load {
            return Err(DaqError::device(
                "MCL_IssBindClockToAxis",
                DeviceFault::ArgumentOutOfRange,
            ));
        }

        let (mode, target) = match binding.code() {
            Some(target) => (polarity.bind_code(), target),
            None => match self.clocks.get(clock).binding.code() {
                Some(bound) => (UNBIND_CODE, bound),
                None => return Ok(()),
            },
        };

        self.call("MCL_IssBindClockToAxis", |d, h| {
            d.iss_bind_clock_to_axis(clock.code(), mode, target, h)
        })?;

        let state = self.clocks.get_mut(clock);
        state.binding = binding;
        if binding != ClockBinding::None {
            state.polarity = polarity;
        }
        info!(%clock, ?binding, ?polarity, "clock binding changed");
        Ok(())
    }

    /// Restores every clock to its power-on state.
    pub fn reset_clocks(&mut self) -> AppResult<()> {
        self.call("MCL_IssResetDefaults", |d, h| d.iss_reset_defaults(h))?;
        self.clocks = ClockSettings::default();
        Ok(())
    }

    /// Emits one 250 ns pulse on `clock`.
    pub fn pulse_clock(&mut self, clock: Clock) -> AppResult<()> {
        let (operation, pulse) = PULSE[clock.slot()];
        self.call(operation, |d, h| pulse(d, h))?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockMadlib, MOCK_SERIAL};

    fn stage() -> NanoDrive<MockMadlib> {
        NanoDrive::open(MockMadlib::new(), MOCK_SERIAL).unwrap()
    }

    #[test]
    fn test_clock_names() {
        assert_eq!("PIXEL".parse::<Clock>().unwrap(), Clock::Pixel);
        assert_eq!("aux".parse::<Clock>().unwrap().code(), 4);
        assert!("shutter".parse::<Clock>().is_err());
        assert_eq!("y".parse::<ClockBinding>().unwrap(), ClockBinding::Axis(AxisId::Y));
        assert_eq!("Read".parse::<ClockBinding>().unwrap(), ClockBinding::Read);
    }

    #[test]
    fn test_polarity_codes_are_swapped_for_binding() {
        let mut drive = stage();
        drive
            .set_clock_polarity(Clock::Frame, ClockPolarity::HighToLow)
            .unwrap();
        assert_eq!(drive.device().clock_polarity(3), Some(3));

        drive
            .bind_clock(Clock::Frame, ClockPolarity::HighToLow, ClockBinding::Axis(AxisId::Z))
            .unwrap();
        assert_eq!(drive.device().clock_binding(3), Some((2, 3)));

        drive
            .bind_clock(Clock::Frame, ClockPolarity::LowToHigh, ClockBinding::Read)
            .unwrap();
        assert_eq!(drive.device().clock_binding(3), Some((3, 5)));
        assert_eq!(drive.clock_settings().frame.binding, ClockBinding::Read);
    }

    #[test]
    fn test_unbind_uses_current_target() {
        let mut drive = stage();
        drive
            .bind_clock(Clock::Pixel, ClockPolarity::LowToHigh, ClockBinding::None)
            .unwrap();
        assert_eq!(drive.device().clock_binding(1), Some((4, 5)));
        assert_eq!(drive.clock_settings().pixel.binding, ClockBinding::None);

        drive
            .bind_clock(Clock::Pixel, ClockPolarity::LowToHigh, ClockBinding::None)
            .unwrap();
        assert_eq!(drive.device().call_count("MCL_IssBindClockToAxis"), 1);
    }

    #[test]
    fn test_aux_clock_cannot_bind_to_load() {
        let mut drive = stage();
        let err = drive
            .bind_clock(Clock::Aux, ClockPolarity::LowToHigh, ClockBinding::Load)
            .unwrap_err();
        assert_eq!(err.fault(), Some(DeviceFault::ArgumentOutOfRange));
        assert_eq!(drive.device().call_count("MCL_IssBindClockToAxis"), 0);
    }

    #[test]
    fn test_pulse_uses_matching_entry_point() {
        let mut drive = stage();
        drive.pulse_clock(Clock::Line).unwrap();
        drive.pulse_clock(Clock::Line).unwrap();
        drive.pulse_clock(Clock::Aux).unwrap();
        assert_eq!(drive.device().pulses(2), Some(2));
        assert_eq!(drive.device().pulses(4), Some(1));
        assert_eq!(drive.device().pulses(1), Some(0));
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut drive = stage();
        drive.set_clock_mode(Clock::Line, ClockMode::High).unwrap();
        assert_eq!(drive.clock_settings().line.mode, ClockMode::High);
        drive.reset_clocks().unwrap();
        assert_eq!(*drive.clock_settings(), ClockSettings::default());
        assert_eq!(drive.device().clock_mode(2), Some(0));
    }
}
