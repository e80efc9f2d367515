//! Mad City Labs NanoDrive piezo stage controller.
//!
//! [`NanoDrive`] owns one device handle and all long-lived protocol state:
//!
//! - the settings cache ([`DriveSettings`]): last-applied axis, rates and
//!   point count, a read-through cache rather than the truth of the hardware
//! - two single-axis readiness tracks (read and load), see [`single_axis`]
//! - the multi-axis track, see [`multi_axis`]
//! - the ISS clock output cache, see [`clock`]
//!
//! Every vendor call goes through the status translation layer in [`status`];
//! nothing above it branches on raw return codes.
//!
//! # Example
//!
//! ```
//! use confocal_daq::hardware::MockMadlib;
//! use confocal_daq::nanodrive::{AxisId, LoadRate, NanoDrive, ReadRate};
//!
//! # fn main() -> confocal_daq::error::AppResult<()> {
//! let mut stage = NanoDrive::open(MockMadlib::new(), 2850)?;
//! let ramp: Vec<f64> = (0..10).map(f64::from).collect();
//!
//! stage.setup_read(AxisId::X, ramp.len(), ReadRate::Ms0_5)?;
//! stage.setup_load(AxisId::X, &ramp, LoadRate::from_ms(0.5)?)?;
//! let trace = stage.acquire(AxisId::X)?;
//! assert_eq!(trace.as_slice(), ramp.as_slice());
//!
//! stage.close()?;
//! # Ok(())
//! # }
//! ```

pub mod axis;
pub mod clock;
pub mod multi_axis;
pub mod rate;
pub mod single_axis;
pub mod status;
pub mod waveform;

use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::NanoDriveConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::Madlib;

pub use axis::{resolve, AxisChannel, AxisId};
pub use clock::{Clock, ClockBinding, ClockMode, ClockPolarity, ClockSettings, ClockState};
pub use multi_axis::{MultiAxisJob, MultiAxisState};
pub use rate::{LoadRate, RateKind, ReadRate, TimeStep};
pub use single_axis::{LoadConfig, ReadConfig, TrackState};
pub use waveform::{validate_point_count, WaveformBuffer, MAX_DATAPOINTS};

// =============================================================================
// Settings cache
// =============================================================================

/// How [`NanoDrive::wait_settled`] decides a move is complete.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SettlePolicy {
    /// Accepted distance from the target, in microns.
    pub tolerance_um: f64,
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between position reads.
    pub poll_interval: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            tolerance_um: 0.01,
            timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(2),
        }
    }
}

/// Last-applied stage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriveSettings {
    /// Default axis for waveform commands.
    pub axis: AxisId,
    pub read_rate: ReadRate,
    pub load_rate: LoadRate,
    /// Point count every single-axis waveform must have.
    pub num_datapoints: usize,
    pub settle: SettlePolicy,
    /// Wait passed to the attached check, in milliseconds.
    pub attach_timeout_ms: u32,
}

impl Default for DriveSettings {
    fn default() -> Self {
        Self {
            axis: AxisId::X,
            read_rate: ReadRate::Ms2,
            load_rate: LoadRate::DEFAULT,
            num_datapoints: 1,
            settle: SettlePolicy::default(),
            attach_timeout_ms: 0,
        }
    }
}

impl DriveSettings {
    /// Converts the `[nanodrive]` configuration section, rejecting illegal values.
    pub fn from_config(config: &NanoDriveConfig) -> AppResult<Self> {
        Ok(Self {
            axis: config.axis.parse()?,
            read_rate: ReadRate::from_ms(config.read_rate_ms)?,
            load_rate: LoadRate::from_ms(config.load_rate_ms)?,
            num_datapoints: validate_point_count(config.num_datapoints)?,
            settle: SettlePolicy {
                tolerance_um: config.settle_tolerance_um,
                timeout: Duration::from_millis(config.settle_timeout_ms),
                poll_interval: Duration::from_millis(config.settle_poll_interval_ms),
            },
            attach_timeout_ms: config.attach_timeout_ms,
        })
    }
}

// =============================================================================
// NanoDrive
// =============================================================================

/// An open NanoDrive controller.
///
/// The handle is acquired by [`open`](Self::open) and released exactly once,
/// by [`close`](Self::close) or on drop. A multi-axis waveform still running
/// at that point is stopped first.
pub struct NanoDrive<D: Madlib> {
    device: D,
    handle: i32,
    serial: i16,
    released: bool,
    settings: DriveSettings,
    read_track: TrackState<ReadConfig>,
    load_track: TrackState<LoadConfig>,
    multi_axis: MultiAxisState,
    clocks: ClockSettings,
    last_loaded: Option<WaveformBuffer>,
    last_read: Option<WaveformBuffer>,
}

impl<D: Madlib> std::fmt::Debug for NanoDrive<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NanoDrive")
            .field("serial", &self.serial)
            .field("handle", &self.handle)
            .field("settings", &self.settings)
            .field("read_track", &self.read_track)
            .field("load_track", &self.load_track)
            .field("multi_axis", &self.multi_axis)
            .finish_non_exhaustive()
    }
}

impl<D: Madlib> NanoDrive<D> {
    /// Opens the controller with the given serial using default settings.
    pub fn open(device: D, serial: i16) -> AppResult<Self> {
        Self::open_with_settings(device, serial, DriveSettings::default())
    }

    /// Opens the controller described by a `[nanodrive]` configuration section.
    pub fn from_config(device: D, config: &NanoDriveConfig) -> AppResult<Self> {
        let settings = DriveSettings::from_config(config)?;
        Self::open_with_settings(device, config.serial, settings)
    }

    /// Grabs all attached controllers and keeps the one matching `serial`.
    ///
    /// Fails with [`DaqError::HandleUnavailable`] if no grabbed controller has
    /// that serial, after releasing everything that was grabbed.
    pub fn open_with_settings(
        mut device: D,
        serial: i16,
        settings: DriveSettings,
    ) -> AppResult<Self> {
        let grabbed = device.grab_all_handles();
        debug!(grabbed, "MCL_GrabAllHandles");

        let handle = device.get_handle_by_serial(serial);
        if handle == 0 {
            warn!(serial, grabbed, "no Nano Drive handle for serial");
            device.release_all_handles();
            return Err(DaqError::HandleUnavailable { serial });
        }
        info!(serial, handle, "Nano Drive handle acquired");

        Ok(Self {
            device,
            handle,
            serial,
            released: false,
            settings,
            read_track: TrackState::Unconfigured,
            load_track: TrackState::Unconfigured,
            multi_axis: MultiAxisState::Unconfigured,
            clocks: ClockSettings::default(),
            last_loaded: None,
            last_read: None,
        })
    }

    /// Stops any running multi-axis waveform and releases the handle.
    pub fn close(mut self) -> AppResult<()> {
        self.release()
    }

    fn release(&mut self) -> AppResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let stopped = if self.multi_axis.is_running() {
            let result = self.call("MCL_WfmaStop", |d, h| d.wfma_stop(h));
            self.multi_axis = self.multi_axis.stopped();
            result.map(|_| ())
        } else {
            Ok(())
        };

        self.device.release_handle(self.handle);
        info!(serial = self.serial, handle = self.handle, "Nano Drive handle released");
        stopped
    }

    /// Issues one vendor call and translates its status.
    pub(crate) fn call(
        &mut self,
        operation: &'static str,
        command: impl FnOnce(&mut D, i32) -> i32,
    ) -> AppResult<i32> {
        let status = command(&mut self.device, self.handle);
        debug!(operation, status, "madlib call");
        status::check(operation, status)
    }

    /// Issues one double-valued vendor read and translates sentinels.
    pub(crate) fn call_reading(
        &mut self,
        operation: &'static str,
        command: impl FnOnce(&mut D, i32) -> f64,
    ) -> AppResult<f64> {
        let value = command(&mut self.device, self.handle);
        debug!(operation, value, "madlib call");
        status::check_reading(operation, value)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Serial number this instance was opened with.
    pub fn serial(&self) -> i16 {
        self.serial
    }

    /// Vendor handle for this controller.
    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// Settings cache.
    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    /// The underlying device command layer.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutable access to the device command layer.
    ///
    /// Calls made through it bypass the readiness tracks.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Last waveform handed to the DAC, by a load trigger or an immediate load.
    pub fn last_loaded(&self) -> Option<&WaveformBuffer> {
        self.last_loaded.as_ref()
    }

    /// Last waveform read back from the sensor.
    pub fn last_read(&self) -> Option<&WaveformBuffer> {
        self.last_read.as_ref()
    }

    // -------------------------------------------------------------------------
    // Settings changes
    // -------------------------------------------------------------------------

    /// Changes the default waveform axis.
    ///
    /// Single-axis tracks committed on another axis become unconfigured.
    pub fn set_axis(&mut self, axis: AxisId) {
        self.settings.axis = axis;
        self.invalidate_stale_tracks();
    }

    /// Changes the single-axis point count.
    ///
    /// Single-axis tracks committed with another count become unconfigured.
    /// The multi-axis track keeps its own committed count.
    pub fn set_num_datapoints(&mut self, num_points: usize) -> AppResult<()> {
        self.settings.num_datapoints = validate_point_count(num_points)?;
        self.invalidate_stale_tracks();
        Ok(())
    }

    /// Changes the read rate, invalidating a read track committed at another rate.
    pub fn set_read_rate(&mut self, rate: ReadRate) {
        self.settings.read_rate = rate;
        self.invalidate_stale_tracks();
    }

    /// Changes the load rate, invalidating a load track committed at another rate.
    pub fn set_load_rate(&mut self, rate: LoadRate) {
        self.settings.load_rate = rate;
        self.invalidate_stale_tracks();
    }

    /// Replaces the settle policy used by [`wait_settled`](Self::wait_settled).
    pub fn set_settle_policy(&mut self, policy: SettlePolicy) {
        self.settings.settle = policy;
    }

    // -------------------------------------------------------------------------
    // Device info
    // -------------------------------------------------------------------------

    /// True if the controller answers within the configured attach timeout.
    pub fn is_attached(&mut self) -> bool {
        let wait_ms = self.settings.attach_timeout_ms;
        let attached = self.device.device_attached(wait_ms, self.handle);
        debug!(wait_ms, attached, "MCL_DeviceAttached");
        attached
    }

    /// Prints product, firmware and library information to stdout.
    pub fn device_info(&mut self) {
        self.device.print_device_info(self.handle);
    }

    // -------------------------------------------------------------------------
    // Positioning
    // -------------------------------------------------------------------------

    /// Commands `axis` to `position_um`. Returns without waiting for the move.
    pub fn move_to(&mut self, axis: AxisId, position_um: f64) -> AppResult<()> {
        let channel = axis.channel().code();
        debug!(%axis, position_um, "move");
        self.call("MCL_SingleWriteN", |d, h| {
            d.single_write_n(position_um, channel, h)
        })?;
        Ok(())
    }

    /// Current sensor position of `axis` in microns.
    pub fn position(&mut self, axis: AxisId) -> AppResult<f64> {
        let channel = axis.channel().code();
        self.call_reading("MCL_SingleReadN", |d, h| d.single_read_n(channel, h))
    }

    /// Travel range of `axis` in microns.
    pub fn axis_range(&mut self, axis: AxisId) -> AppResult<f64> {
        let channel = axis.channel().code();
        self.call_reading("MCL_GetCalibration", |d, h| d.get_calibration(channel, h))
    }

    /// Polls `axis` until it reads within tolerance of `target_um`.
    ///
    /// Returns the settled reading, or [`DaqError::SettleTimeout`] with the
    /// last reading once the settle timeout has passed.
    pub fn wait_settled(&mut self, axis: AxisId, target_um: f64) -> AppResult<f64> {
        let policy = self.settings.settle;
        let deadline = Instant::now() + policy.timeout;
        let mut polls = 0u32;
        loop {
            let reading = self.position(axis)?;
            polls += 1;
            if (reading - target_um).abs() <= policy.tolerance_um {
                debug!(%axis, target_um, reading, polls, "settled");
                return Ok(reading);
            }
            if Instant::now() >= deadline {
                warn!(%axis, target_um, reading, polls, "axis did not settle");
                return Err(DaqError::SettleTimeout {
                    axis,
                    target: target_um,
                    last: reading,
                    timeout: policy.timeout,
                });
            }
            thread::sleep(policy.poll_interval);
        }
    }

    /// [`move_to`](Self::move_to) followed by [`wait_settled`](Self::wait_settled).
    pub fn move_and_settle(&mut self, axis: AxisId, target_um: f64) -> AppResult<f64> {
        self.move_to(axis, target_um)?;
        self.wait_settled(axis, target_um)
    }
}

impl<D: Madlib> Drop for NanoDrive<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(serial = self.serial, error = %e, "cleanup on drop failed");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
