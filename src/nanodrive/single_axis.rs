//! Single-axis waveform protocol.
//!
//! Two independent readiness tracks, read and load, each either
//! [`TrackState::Unconfigured`] or holding the configuration that was
//! committed to the controller. Setup calls are the only transitions into
//! `Configured`; triggers and [`acquire`](NanoDrive::acquire) only inspect.
//!
//! A track also drops back to `Unconfigured` when the settings it was
//! committed with (axis, point count, rate) change underneath it, and a
//! trigger on an axis other than the committed one is treated as
//! unconfigured.
//!
//! Reads must follow a load within a few milliseconds or they sample the
//! current position instead of the trajectory. [`acquire`](NanoDrive::acquire)
//! issues both in a single device call and is the reliable way to record a
//! trajectory.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppResult, DaqError, Track};
use crate::hardware::Madlib;

use super::axis::AxisId;
use super::rate::{LoadRate, ReadRate};
use super::waveform::{validate_point_count, WaveformBuffer};
use super::NanoDrive;

/// Readiness of one protocol track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "config", rename_all = "snake_case")]
pub enum TrackState<C> {
    Unconfigured,
    Configured(C),
}

impl<C> TrackState<C> {
    /// The committed configuration, if any.
    pub fn config(&self) -> Option<&C> {
        match self {
            TrackState::Configured(config) => Some(config),
            TrackState::Unconfigured => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, TrackState::Configured(_))
    }
}

/// Read configuration committed by [`NanoDrive::setup_read`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadConfig {
    pub axis: AxisId,
    pub num_points: usize,
    pub rate: ReadRate,
}

/// Load configuration committed by [`NanoDrive::setup_load`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadConfig {
    pub axis: AxisId,
    pub rate: LoadRate,
    pub waveform: WaveformBuffer,
}

impl LoadConfig {
    pub fn num_points(&self) -> usize {
        self.waveform.len()
    }
}

impl<D: Madlib> NanoDrive<D> {
    /// State of the read track.
    pub fn read_track(&self) -> &TrackState<ReadConfig> {
        &self.read_track
    }

    /// State of the load track.
    pub fn load_track(&self) -> &TrackState<LoadConfig> {
        &self.load_track
    }

    /// Commits a read of `num_points` samples on `axis` at `rate`.
    ///
    /// On success the settings cache takes the new axis, point count and
    /// rate, and a load track that no longer matches them is invalidated.
    /// On device rejection nothing changes.
    pub fn setup_read(&mut self, axis: AxisId, num_points: usize, rate: ReadRate) -> AppResult<()> {
        let num_points = validate_point_count(num_points)?;
        let channel = axis.channel().code();
        // validate_point_count bounds the count well inside u32.
        let points = num_points as u32;

        self.call("MCL_Setup_ReadWaveFormN", |d, h| {
            d.setup_read_waveform_n(channel, points, rate.device_code(), h)
        })?;

        self.settings.axis = axis;
        self.settings.num_datapoints = num_points;
        self.settings.read_rate = rate;
        self.read_track = TrackState::Configured(ReadConfig {
            axis,
            num_points,
            rate,
        });
        self.invalidate_stale_tracks();
        info!(%axis, num_points, rate_ms = rate.millis(), "read waveform set up");
        Ok(())
    }

    /// Commits `waveform` to be stepped through on `axis` at `rate`.
    ///
    /// The waveform must have exactly the configured number of datapoints;
    /// a mismatch is reported before anything is sent to the device.
    pub fn setup_load(&mut self, axis: AxisId, waveform: &[f64], rate: LoadRate) -> AppResult<()> {
        let buffer = WaveformBuffer::build_for(Some(axis), waveform, self.settings.num_datapoints)?;
        let channel = axis.channel().code();

        self.call("MCL_Setup_LoadWaveFormN", |d, h| {
            d.setup_load_waveform_n(channel, rate.millis(), &buffer, h)
        })?;

        self.settings.axis = axis;
        self.settings.load_rate = rate;
        info!(%axis, num_points = buffer.len(), rate_ms = rate.millis(), "load waveform set up");
        self.load_track = TrackState::Configured(LoadConfig {
            axis,
            rate,
            waveform: buffer,
        });
        self.invalidate_stale_tracks();
        Ok(())
    }

    /// Triggers the committed read on `axis` and returns the samples.
    ///
    /// The track stays configured, so repeated triggers each return fresh data.
    pub fn trigger_read(&mut self, axis: AxisId) -> AppResult<WaveformBuffer> {
        let config = match self.read_track.config() {
            Some(config) if config.axis == axis => *config,
            _ => return Err(DaqError::NotConfigured(Track::Read)),
        };

        let channel = axis.channel().code();
        let mut samples = vec![0.0; config.num_points];
        self.call("MCL_Trigger_ReadWaveFormN", |d, h| {
            d.trigger_read_waveform_n(channel, &mut samples, h)
        })?;

        let buffer = WaveformBuffer::from_device(samples);
        self.last_read = Some(buffer.clone());
        Ok(buffer)
    }

    /// Starts stepping through the committed load waveform on `axis`.
    pub fn trigger_load(&mut self, axis: AxisId) -> AppResult<()> {
        let waveform = match self.load_track.config() {
            Some(config) if config.axis == axis => config.waveform.clone(),
            _ => return Err(DaqError::NotConfigured(Track::Load)),
        };

        let channel = axis.channel().code();
        self.call("MCL_Trigger_LoadWaveFormN", |d, h| {
            d.trigger_load_waveform_n(channel, h)
        })?;

        self.last_loaded = Some(waveform);
        Ok(())
    }

    /// Runs the committed load and read on `axis` as one device operation.
    ///
    /// Both tracks must be configured for `axis`; the error names whichever
    /// is missing.
    pub fn acquire(&mut self, axis: AxisId) -> AppResult<WaveformBuffer> {
        let read = self.read_track.config().filter(|c| c.axis == axis).copied();
        let load = self
            .load_track
            .config()
            .filter(|c| c.axis == axis)
            .map(|c| c.waveform.clone());

        let (read, waveform) = match (read, load) {
            (Some(read), Some(waveform)) => (read, waveform),
            (None, None) => return Err(DaqError::NotConfigured(Track::ReadAndLoad)),
            (Some(_), None) => return Err(DaqError::NotConfigured(Track::Load)),
            (None, Some(_)) => return Err(DaqError::NotConfigured(Track::Read)),
        };

        let channel = axis.channel().code();
        let mut samples = vec![0.0; read.num_points];
        self.call("MCL_TriggerWaveformAcquisition", |d, h| {
            d.trigger_waveform_acquisition(channel, &mut samples, h)
        })?;

        let buffer = WaveformBuffer::from_device(samples);
        self.last_loaded = Some(waveform);
        self.last_read = Some(buffer.clone());
        Ok(buffer)
    }

    /// Loads and runs `waveform` on `axis` immediately, without a setup.
    ///
    /// Like [`setup_load`](Self::setup_load), the length must match the
    /// configured number of datapoints. Readiness tracks are not touched.
    pub fn load_waveform(
        &mut self,
        axis: AxisId,
        waveform: &[f64],
        rate: LoadRate,
    ) -> AppResult<()> {
        let buffer = WaveformBuffer::build_for(Some(axis), waveform, self.settings.num_datapoints)?;
        let channel = axis.channel().code();

        self.call("MCL_LoadWaveFormN", |d, h| {
            d.load_waveform_n(channel, rate.millis(), &buffer, h)
        })?;

        debug!(%axis, num_points = buffer.len(), "waveform loaded");
        self.last_loaded = Some(buffer);
        Ok(())
    }

    /// Samples `num_points` positions of `axis` immediately.
    ///
    /// Called within ~3 ms of a load this records the trajectory; later it
    /// returns the current position repeated.
    pub fn read_waveform(
        &mut self,
        axis: AxisId,
        num_points: usize,
        rate: ReadRate,
    ) -> AppResult<WaveformBuffer> {
        let num_points = validate_point_count(num_points)?;
        let channel = axis.channel().code();
        let mut samples = vec![0.0; num_points];

        self.call("MCL_ReadWaveFormN", |d, h| {
            d.read_waveform_n(channel, rate.device_code(), &mut samples, h)
        })?;

        let buffer = WaveformBuffer::from_device(samples);
        self.last_read = Some(buffer.clone());
        Ok(buffer)
    }

    /// Drops tracks whose committed configuration no longer matches the settings.
    pub(super) fn invalidate_stale_tracks(&mut self) {
        let settings = &self.settings;

        if let Some(read) = self.read_track.config() {
            if read.axis != settings.axis
                || read.num_points != settings.num_datapoints
                || read.rate != settings.read_rate
            {
                warn!(
                    axis = %read.axis,
                    num_points = read.num_points,
                    "read waveform setup invalidated"
                );
                self.read_track = TrackState::Unconfigured;
            }
        }

        if let Some(load) = self.load_track.config() {
            if load.axis != settings.axis
                || load.num_points() != settings.num_datapoints
                || load.rate != settings.load_rate
            {
                warn!(
                    axis = %load.axis,
                    num_points = load.num_points(),
                    "load waveform setup invalidated"
                );
                self.load_track = TrackState::Unconfigured;
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
