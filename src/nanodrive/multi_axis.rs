//! Multi-axis waveforms.
//!
//! One triggered command drives synchronized trajectories on x, y and z.
//! Axes without a waveform are committed as zero-filled buffers of the same
//! length.
//!
//! ```text
//!   Unconfigured --setup--> Configured --trigger--> Running
//!                               ^                      |
//!                               +----- read / stop ----+
//! ```
//!
//! The committed point count is remembered separately from the single-axis
//! `num_datapoints` setting, and [`read`](NanoDrive::read_multi_axis) always
//! sizes its buffers from it.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{AppResult, DaqError, Track};
use crate::hardware::Madlib;

use super::axis::AxisId;
use super::rate::TimeStep;
use super::waveform::{validate_point_count, WaveformBuffer};
use super::NanoDrive;

/// Iteration count that repeats the waveform until stopped.
pub const RUN_FOREVER: u16 = 0;

/// A multi-axis waveform request.
///
/// Waveforms are copied in when attached; lengths are checked by
/// [`NanoDrive::setup_multi_axis`].
#[derive(Debug, Clone, PartialEq)]
pub struct MultiAxisJob {
    num_points: usize,
    time_step: TimeStep,
    iterations: u16,
    waveforms: [Option<Vec<f64>>; 3],
}

impl MultiAxisJob {
    /// Empty job. `iterations` of [`RUN_FOREVER`] loops until stopped.
    pub fn new(num_points: usize, time_step: TimeStep, iterations: u16) -> Self {
        Self {
            num_points,
            time_step,
            iterations,
            waveforms: [None, None, None],
        }
    }

    /// Attaches the trajectory for `axis`. `Aux` cannot take part.
    pub fn with_waveform(mut self, axis: AxisId, values: &[f64]) -> AppResult<Self> {
        let slot = axis.multi_axis_slot().ok_or_else(|| DaqError::InvalidAxis {
            label: axis.label().to_string(),
        })?;
        self.waveforms[slot] = Some(values.to_vec());
        Ok(self)
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn time_step(&self) -> TimeStep {
        self.time_step
    }

    pub fn iterations(&self) -> u16 {
        self.iterations
    }

    /// Builds the three committed buffers, zero-filling unused axes.
    fn buffers(&self) -> AppResult<[WaveformBuffer; 3]> {
        let n = validate_point_count(self.num_points)?;
        let build = |axis: AxisId, slot: usize| match &self.waveforms[slot] {
            Some(values) => WaveformBuffer::build_for(Some(axis), values, n),
            None => Ok(WaveformBuffer::zeros(n)),
        };
        Ok([build(AxisId::X, 0)?, build(AxisId::Y, 1)?, build(AxisId::Z, 2)?])
    }
}

/// What the controller currently holds for the multi-axis track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MultiAxisState {
    Unconfigured,
    Configured {
        points: usize,
        time_step: TimeStep,
        iterations: u16,
    },
    Running {
        points: usize,
        time_step: TimeStep,
        iterations: u16,
    },
}

impl MultiAxisState {
    pub fn is_configured(&self) -> bool {
        !matches!(self, MultiAxisState::Unconfigured)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, MultiAxisState::Running { .. })
    }

    /// Point count of the committed waveforms.
    pub fn committed_points(&self) -> Option<usize> {
        match *self {
            MultiAxisState::Unconfigured => None,
            MultiAxisState::Configured { points, .. } | MultiAxisState::Running { points, .. } => {
                Some(points)
            }
        }
    }

    /// State after the running waveform ends. Buffers stay committed.
    pub(super) fn stopped(self) -> Self {
        match self {
            MultiAxisState::Running {
                points,
                time_step,
                iterations,
            } => MultiAxisState::Configured {
                points,
                time_step,
                iterations,
            },
            other => other,
        }
    }

    fn started(self) -> Self {
        match self {
            MultiAxisState::Configured {
                points,
                time_step,
                iterations,
            } => MultiAxisState::Running {
                points,
                time_step,
                iterations,
            },
            other => other,
        }
    }
}

impl<D: Madlib> NanoDrive<D> {
    /// State of the multi-axis track.
    pub fn multi_axis_state(&self) -> MultiAxisState {
        self.multi_axis
    }

    /// Commits all three axis waveforms, the time step and iteration count.
    ///
    /// Every attached waveform must have the job's point count; a mismatch
    /// names the axis and leaves the track unconfigured without a setup being
    /// sent. A waveform still running is stopped first, whether or not the
    /// new job is accepted.
    pub fn setup_multi_axis(&mut self, job: &MultiAxisJob) -> AppResult<()> {
        let buffers = job.buffers();

        if self.multi_axis.is_running() {
            let stopped = self.call("MCL_WfmaStop", |d, h| d.wfma_stop(h));
            self.multi_axis = self.multi_axis.stopped();
            stopped?;
            info!("running multi-axis waveform stopped for new setup");
        }

        let [x, y, z] = match buffers {
            Ok(buffers) => buffers,
            Err(e) => {
                self.multi_axis = MultiAxisState::Unconfigured;
                return Err(e);
            }
        };
        let time_step = job.time_step();
        let iterations = job.iterations();

        self.call("MCL_WfmaSetup", |d, h| {
            d.wfma_setup(&x, &y, &z, time_step.device_code(), iterations, h)
        })?;

        self.multi_axis = MultiAxisState::Configured {
            points: x.len(),
            time_step,
            iterations,
        };
        info!(
            points = x.len(),
            time_step_ms = time_step.millis(),
            iterations,
            "multi-axis waveform set up"
        );
        Ok(())
    }

    /// Starts the committed multi-axis waveform.
    pub fn trigger_multi_axis(&mut self) -> AppResult<()> {
        if !self.multi_axis.is_configured() {
            return Err(DaqError::NotConfigured(Track::MultiAxis));
        }
        self.call("MCL_WfmaTrigger", |d, h| d.wfma_trigger(h))?;
        self.multi_axis = self.multi_axis.started();
        debug!(state = ?self.multi_axis, "multi-axis waveform triggered");
        Ok(())
    }

    /// Stops the multi-axis waveform. Safe to call in any state.
    ///
    /// The stop command is always sent. A fault is only reported while a
    /// waveform is running; otherwise it is logged and ignored.
    pub fn stop_multi_axis(&mut self) -> AppResult<()> {
        let was_running = self.multi_axis.is_running();
        let result = self.call("MCL_WfmaStop", |d, h| d.wfma_stop(h));
        self.multi_axis = self.multi_axis.stopped();

        match result {
            Ok(_) => Ok(()),
            Err(e) if !was_running => {
                debug!(error = %e, "stop with no multi-axis waveform running");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Blocks until the running waveform finishes and returns the x, y and z
    /// sensor traces. An infinite waveform is stopped by the read.
    ///
    /// Buffers are sized to the committed point count.
    pub fn read_multi_axis(
        &mut self,
    ) -> AppResult<(WaveformBuffer, WaveformBuffer, WaveformBuffer)> {
        let points = self
            .multi_axis
            .committed_points()
            .ok_or(DaqError::NotConfigured(Track::MultiAxis))?;

        let (mut x, mut y, mut z) = (vec![0.0; points], vec![0.0; points], vec![0.0; points]);
        self.call("MCL_WfmaRead", |d, h| d.wfma_read(&mut x, &mut y, &mut z, h))?;
        self.multi_axis = self.multi_axis.stopped();

        Ok((
            WaveformBuffer::from_device(x),
            WaveformBuffer::from_device(y),
            WaveformBuffer::from_device(z),
        ))
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
    fn test_aux_cannot_join_job() {
        let err = MultiAxisJob::new(3, TimeStep::Ms1, 1)
            .with_waveform(AxisId::Aux, &[1.0, 2.0, 3.0])
            .unwrap_err();
        assert!(matches!(err, DaqError::InvalidAxis { label } if label == "aux"));
    }

    #[test]
    fn test_unused_axes_are_zero_filled() {
        let mut drive = stage();
        let job = MultiAxisJob::new(3, TimeStep::Ms0_5, 2)
            .with_waveform(AxisId::Y, &[1.0, 2.0, 3.0])
            .unwrap();
        drive.setup_multi_axis(&job).unwrap();

        let committed = drive.device().committed_wfma().unwrap();
        assert_eq!(committed.waveforms[0], vec![0.0; 3]);
        assert_eq!(committed.waveforms[1], vec![1.0, 2.0, 3.0]);
        assert_eq!(committed.waveforms[2], vec![0.0; 3]);
        assert_eq!(committed.time_step, 4.0);
        assert_eq!(committed.iterations, 2);
    }

    #[test]
    fn test_length_mismatch_names_axis_and_stays_unconfigured() {
        let mut drive = stage();
        let job = MultiAxisJob::new(3, TimeStep::Ms1, 1)
            .with_waveform(AxisId::X, &[1.0, 2.0, 3.0])
            .unwrap()
            .with_waveform(AxisId::Z, &[1.0, 2.0])
            .unwrap();

        let err = drive.setup_multi_axis(&job).unwrap_err();
        assert!(matches!(
            err,
            DaqError::LengthMismatch {
                axis: Some(AxisId::Z),
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(drive.multi_axis_state(), MultiAxisState::Unconfigured);
        assert_eq!(drive.device().call_count("MCL_WfmaSetup"), 0);
    }

    #[test]
    fn test_trigger_requires_setup() {
        let mut drive = stage();
        assert!(matches!(
            drive.trigger_multi_axis(),
            Err(DaqError::NotConfigured(Track::MultiAxis))
        ));
        assert!(matches!(
            drive.read_multi_axis(),
            Err(DaqError::NotConfigured(Track::MultiAxis))
        ));
    }

    #[test]
    fn test_stop_when_idle_is_harmless() {
        let mut drive = stage();
        drive.device_mut().fail_next("MCL_WfmaStop", -4);
        drive.stop_multi_axis().unwrap();
        drive.stop_multi_axis().unwrap();
        assert_eq!(drive.multi_axis_state(), MultiAxisState::Unconfigured);
        assert_eq!(drive.device().call_count("MCL_WfmaStop"), 2);
    }

    #[test]
    fn test_stop_returns_to_configured() {
        let mut drive = stage();
        let job = MultiAxisJob::new(2, TimeStep::Ms2, RUN_FOREVER)
            .with_waveform(AxisId::X, &[5.0, 6.0])
            .unwrap();
        drive.setup_multi_axis(&job).unwrap();
        drive.trigger_multi_axis().unwrap();
        assert!(drive.multi_axis_state().is_running());

        drive.stop_multi_axis().unwrap();
        assert_eq!(
            drive.multi_axis_state(),
            MultiAxisState::Configured {
                points: 2,
                time_step: TimeStep::Ms2,
                iterations: RUN_FOREVER
            }
        );
        drive.trigger_multi_axis().unwrap();
        assert_eq!(drive.device().wfma_triggers(), 2);
    }

    #[test]
    fn test_read_uses_committed_point_count() {
        let mut drive = stage();
        let x: Vec<f64> = (0..8).map(f64::from).collect();
        let job = MultiAxisJob::new(8, TimeStep::Ms1, 1)
            .with_waveform(AxisId::X, &x)
            .unwrap();
        drive.setup_multi_axis(&job).unwrap();
        drive.set_num_datapoints(3).unwrap();
        drive.trigger_multi_axis().unwrap();

        let (rx, ry, rz) = drive.read_multi_axis().unwrap();
        assert_eq!(rx.as_slice(), x.as_slice());
        assert_eq!(ry.len(), 8);
        assert_eq!(rz.len(), 8);
        assert!(!drive.multi_axis_state().is_running());
    }

    #[test]
    fn test_resetup_while_running_stops_old_waveform() {
        let mut drive = stage();
        let job = MultiAxisJob::new(2, TimeStep::Ms1, RUN_FOREVER);
        drive.setup_multi_axis(&job).unwrap();
        drive.trigger_multi_axis().unwrap();

        drive.setup_multi_axis(&job).unwrap();
        assert!(!drive.device().wfma_running());
        assert_eq!(drive.device().call_count("MCL_WfmaStop"), 1);
        assert!(!drive.multi_axis_state().is_running());

        drive.release().unwrap();
        let calls = drive.device().calls();
        let stop = calls.iter().position(|c| *c == "MCL_WfmaStop").unwrap();
        let second_setup = calls.iter().rposition(|c| *c == "MCL_WfmaSetup").unwrap();
        assert!(stop < second_setup);
        assert!(!drive.device().wfma_running());
    }

    #[test]
    fn test_rejected_resetup_while_running_still_stops() {
        let mut drive = stage();
        let job = MultiAxisJob::new(2, TimeStep::Ms1, RUN_FOREVER);
        drive.setup_multi_axis(&job).unwrap();
        drive.trigger_multi_axis().unwrap();

        let bad = MultiAxisJob::new(2, TimeStep::Ms1, 1)
            .with_waveform(AxisId::Z, &[1.0])
            .unwrap();
        assert!(drive.setup_multi_axis(&bad).is_err());
        assert!(!drive.device().wfma_running());
        assert_eq!(drive.multi_axis_state(), MultiAxisState::Unconfigured);
        assert_eq!(drive.device().call_count("MCL_WfmaSetup"), 1);
    }

    #[test]
    fn test_drop_stops_running_waveform() {
        let mut drive = stage();
        let job = MultiAxisJob::new(1, TimeStep::Ms1, RUN_FOREVER);
        drive.setup_multi_axis(&job).unwrap();
        drive.trigger_multi_axis().unwrap();
        drive.release().unwrap();
        assert!(!drive.device().wfma_running());
        assert_eq!(drive.device().calls().last(), Some(&"MCL_ReleaseHandle"));
    }
}
