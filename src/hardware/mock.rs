//! Mock NanoDrive Implementation
//!
//! Provides a simulated Madlib device for testing without physical hardware.
//!
//! # Behaviour
//!
//! - Positions follow writes immediately, unless a settle lag or drift is set.
//! - A loaded waveform becomes the stage trajectory: the next read (triggered,
//!   immediate or combined acquisition) returns it exactly. Reads with no
//!   pending trajectory return the current position repeated, which is what
//!   the real controller does when a read misses the load window.
//! - Multi-axis reads return the committed buffers.
//! - Every entry point is recorded by name, and any entry point can be made to
//!   fail once with a chosen status code.
//!
//! # Example
//!
//! ```
//! use confocal_daq::hardware::{Madlib, MockMadlib};
//!
//! let mut device = MockMadlib::new();
//! device.grab_all_handles();
//! let handle = device.get_handle_by_serial(2850);
//! assert_eq!(device.single_write_n(5.0, 1, handle), 0);
//! assert_eq!(device.single_read_n(1, handle), 5.0);
//! assert_eq!(device.call_count("MCL_SingleWriteN"), 1);
//! ```

use std::collections::HashMap;

use tracing::trace;

use super::madlib::Madlib;

/// Serial of the simulated controller (the lab HS3 stage).
pub const MOCK_SERIAL: i16 = 2850;

/// Handle the simulated controller answers with.
pub const MOCK_HANDLE: i32 = 1;

const INVALID_AXIS: i32 = -7;
const INVALID_HANDLE: i32 = -8;
const ARGUMENT_ERROR: i32 = -6;
const USAGE_ERROR: i32 = -4;

/// Committed single-axis read configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MockReadSetup {
    pub axis: u32,
    pub num_points: u32,
    pub rate: f64,
}

/// Committed single-axis load configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MockLoadSetup {
    pub axis: u32,
    pub rate: f64,
    pub waveform: Vec<f64>,
}

/// Committed multi-axis configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MockWfmaSetup {
    pub waveforms: [Vec<f64>; 3],
    pub time_step: f64,
    pub iterations: u16,
}

/// Simulated NanoDrive controller.
#[derive(Debug)]
pub struct MockMadlib {
    serial: i16,
    grabbed: bool,
    released: Vec<i32>,
    attached: bool,
    positions: [f64; 4],
    ranges: [f64; 4],
    drift: [f64; 4],
    settle_reads: u32,
    lagging: Option<(usize, f64, u32)>,
    trajectory: Option<(u32, Vec<f64>)>,
    read_setup: Option<MockReadSetup>,
    load_setup: Option<MockLoadSetup>,
    wfma_setup: Option<MockWfmaSetup>,
    wfma_running: bool,
    wfma_triggers: u32,
    clock_modes: [i32; 4],
    clock_polarities: [i32; 4],
    clock_bindings: [(i32, i32); 4],
    pulses: [u32; 4],
    failures: HashMap<&'static str, i32>,
    calls: Vec<&'static str>,
}

impl Default for MockMadlib {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMadlib {
    /// Attached controller with serial [`MOCK_SERIAL`] and 100 um travel on x, y and z.
    pub fn new() -> Self {
        Self::with_serial(MOCK_SERIAL)
    }

    /// Attached controller answering to `serial`.
    pub fn with_serial(serial: i16) -> Self {
        Self {
            serial,
            grabbed: false,
            released: Vec::new(),
            attached: true,
            positions: [0.0; 4],
            ranges: [100.0, 100.0, 100.0, 0.0],
            drift: [0.0; 4],
            settle_reads: 0,
            lagging: None,
            trajectory: None,
            read_setup: None,
            load_setup: None,
            wfma_setup: None,
            wfma_running: false,
            wfma_triggers: 0,
            clock_modes: [0; 4],
            clock_polarities: [0; 4],
            clock_bindings: [(0, 0); 4],
            pulses: [0; 4],
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }

    /// Simulates a disconnected cable.
    pub fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    /// Makes the next call to `entry_point` return `status` without side effects.
    pub fn fail_next(&mut self, entry_point: &'static str, status: i32) {
        self.failures.insert(entry_point, status);
    }

    /// Every reading of `axis` is offset by `drift` microns.
    pub fn set_drift(&mut self, axis: u32, drift: f64) {
        if let Some(slot) = slot(axis) {
            self.drift[slot] = drift;
        }
    }

    /// After each write, the next `reads` position reads still report the old position.
    pub fn set_settle_reads(&mut self, reads: u32) {
        self.settle_reads = reads;
    }

    /// Names of all entry points called so far, in order.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    /// How many times `entry_point` has been called.
    pub fn call_count(&self, entry_point: &str) -> usize {
        self.calls.iter().filter(|c| **c == entry_point).count()
    }

    /// Total number of recorded calls.
    pub fn total_calls(&self) -> usize {
        self.calls.len()
    }

    /// Handles released so far.
    pub fn released_handles(&self) -> &[i32] {
        &self.released
    }

    /// Last commanded position of `axis` (1-based).
    pub fn position(&self, axis: u32) -> Option<f64> {
        slot(axis).map(|s| self.positions[s])
    }

    /// Committed read setup, if any.
    pub fn read_setup(&self) -> Option<&MockReadSetup> {
        self.read_setup.as_ref()
    }

    /// Committed load setup, if any.
    pub fn load_setup(&self) -> Option<&MockLoadSetup> {
        self.load_setup.as_ref()
    }

    /// Committed multi-axis setup, if any.
    pub fn committed_wfma(&self) -> Option<&MockWfmaSetup> {
        self.wfma_setup.as_ref()
    }

    /// True between a multi-axis trigger and the matching read or stop.
    pub fn wfma_running(&self) -> bool {
        self.wfma_running
    }

    /// Number of multi-axis triggers accepted.
    pub fn wfma_triggers(&self) -> u32 {
        self.wfma_triggers
    }

    /// Mode last set on `clock` (1-based).
    pub fn clock_mode(&self, clock: i32) -> Option<i32> {
        clock_slot(clock).map(|s| self.clock_modes[s])
    }

    /// Polarity code last set on `clock` (1-based).
    pub fn clock_polarity(&self, clock: i32) -> Option<i32> {
        clock_slot(clock).map(|s| self.clock_polarities[s])
    }

    /// `(polarity, axis)` codes of the last binding on `clock` (1-based).
    pub fn clock_binding(&self, clock: i32) -> Option<(i32, i32)> {
        clock_slot(clock).map(|s| self.clock_bindings[s])
    }

    /// Pulses issued on `clock` (1-based).
    pub fn pulses(&self, clock: i32) -> Option<u32> {
        clock_slot(clock).map(|s| self.pulses[s])
    }

    /// Records the call and returns an injected or precondition failure.
    fn enter(&mut self, entry_point: &'static str, handle: i32) -> Option<i32> {
        trace!(entry_point, handle, "mock madlib call");
        self.calls.push(entry_point);
        if let Some(status) = self.failures.remove(entry_point) {
            return Some(status);
        }
        if handle != MOCK_HANDLE || !self.grabbed || self.released.contains(&handle) {
            return Some(INVALID_HANDLE);
        }
        None
    }

    fn reading(&mut self, slot: usize) -> f64 {
        if let Some((lag_slot, old, remaining)) = self.lagging {
            if lag_slot == slot && remaining > 0 {
                self.lagging = Some((lag_slot, old, remaining - 1));
                return old + self.drift[slot];
            }
        }
        self.positions[slot] + self.drift[slot]
    }

    /// Fills `out` with the pending trajectory for `axis`, or the current position.
    fn sample(&mut self, axis: u32, out: &mut [f64]) {
        let Some(slot) = slot(axis) else { return };
        match self.trajectory.take() {
            Some((traj_axis, samples)) if traj_axis == axis && samples.len() == out.len() => {
                out.copy_from_slice(&samples);
            }
            other => {
                self.trajectory = other;
                let position = self.positions[slot] + self.drift[slot];
                out.fill(position);
            }
        }
    }

    fn run_trajectory(&mut self, axis: u32, waveform: Vec<f64>) {
        if let (Some(slot), Some(last)) = (slot(axis), waveform.last()) {
            self.positions[slot] = *last;
        }
        self.trajectory = Some((axis, waveform));
    }
}

fn slot(axis: u32) -> Option<usize> {
    match axis {
        1..=4 => Some(axis as usize - 1),
        _ => None,
    }
}

fn clock_slot(clock: i32) -> Option<usize> {
    match clock {
        1..=4 => Some(clock as usize - 1),
        _ => None,
    }
}

impl Madlib for MockMadlib {
    fn grab_all_handles(&mut self) -> i32 {
        self.calls.push("MCL_GrabAllHandles");
        if self.attached {
            self.grabbed = true;
            self.released.clear();
            1
        } else {
            0
        }
    }

    fn get_handle_by_serial(&mut self, serial: i16) -> i32 {
        self.calls.push("MCL_GetHandleBySerial");
        if self.grabbed && self.attached && serial == self.serial {
            MOCK_HANDLE
        } else {
            0
        }
    }

    fn release_handle(&mut self, handle: i32) {
        self.calls.push("MCL_ReleaseHandle");
        self.released.push(handle);
    }

    fn release_all_handles(&mut self) {
        self.calls.push("MCL_ReleaseAllHandles");
        if self.grabbed {
            self.released.push(MOCK_HANDLE);
        }
        self.grabbed = false;
    }

    fn device_attached(&mut self, _wait_ms: u32, handle: i32) -> bool {
        self.enter("MCL_DeviceAttached", handle).is_none() && self.attached
    }

    fn print_device_info(&mut self, handle: i32) {
        if self.enter("MCL_PrintDeviceInfo", handle).is_none() {
            println!("MockMadlib NanoDrive (serial {}), 3 axes + aux", self.serial);
        }
    }

    fn get_calibration(&mut self, axis: u32, handle: i32) -> f64 {
        if let Some(status) = self.enter("MCL_GetCalibration", handle) {
            return f64::from(status);
        }
        match slot(axis) {
            Some(s) if self.ranges[s] > 0.0 => self.ranges[s],
            _ => f64::from(INVALID_AXIS),
        }
    }

    fn single_read_n(&mut self, axis: u32, handle: i32) -> f64 {
        if let Some(status) = self.enter("MCL_SingleReadN", handle) {
            return f64::from(status);
        }
        match slot(axis) {
            Some(s) => self.reading(s),
            None => f64::from(INVALID_AXIS),
        }
    }

    fn single_write_n(&mut self, position: f64, axis: u32, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_SingleWriteN", handle) {
            return status;
        }
        let Some(s) = slot(axis) else {
            return INVALID_AXIS;
        };
        if position < 0.0 || position > self.ranges[s] {
            return ARGUMENT_ERROR;
        }
        if self.settle_reads > 0 {
            self.lagging = Some((s, self.positions[s], self.settle_reads));
        }
        self.positions[s] = position;
        0
    }

    fn read_waveform_n(&mut self, axis: u32, _rate: f64, out: &mut [f64], handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_ReadWaveFormN", handle) {
            return status;
        }
        if slot(axis).is_none() {
            return INVALID_AXIS;
        }
        self.sample(axis, out);
        0
    }

    fn load_waveform_n(&mut self, axis: u32, _rate: f64, waveform: &[f64], handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_LoadWaveFormN", handle) {
            return status;
        }
        if slot(axis).is_none() {
            return INVALID_AXIS;
        }
        self.run_trajectory(axis, waveform.to_vec());
        0
    }

    fn setup_read_waveform_n(
        &mut self,
        axis: u32,
        num_points: u32,
        rate: f64,
        handle: i32,
    ) -> i32 {
        if let Some(status) = self.enter("MCL_Setup_ReadWaveFormN", handle) {
            return status;
        }
        if slot(axis).is_none() {
            return INVALID_AXIS;
        }
        self.read_setup = Some(MockReadSetup {
            axis,
            num_points,
            rate,
        });
        0
    }

    fn setup_load_waveform_n(
        &mut self,
        axis: u32,
        rate: f64,
        waveform: &[f64],
        handle: i32,
    ) -> i32 {
        if let Some(status) = self.enter("MCL_Setup_LoadWaveFormN", handle) {
            return status;
        }
        if slot(axis).is_none() {
            return INVALID_AXIS;
        }
        self.load_setup = Some(MockLoadSetup {
            axis,
            rate,
            waveform: waveform.to_vec(),
        });
        0
    }

    fn trigger_read_waveform_n(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_Trigger_ReadWaveFormN", handle) {
            return status;
        }
        match &self.read_setup {
            Some(setup) if setup.axis == axis && setup.num_points as usize == out.len() => {}
            Some(_) => return ARGUMENT_ERROR,
            None => return USAGE_ERROR,
        }
        self.sample(axis, out);
        0
    }

    fn trigger_load_waveform_n(&mut self, axis: u32, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_Trigger_LoadWaveFormN", handle) {
            return status;
        }
        let waveform = match &self.load_setup {
            Some(setup) if setup.axis == axis => setup.waveform.clone(),
            Some(_) => return ARGUMENT_ERROR,
            None => return USAGE_ERROR,
        };
        self.run_trajectory(axis, waveform);
        0
    }

    fn trigger_waveform_acquisition(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_TriggerWaveformAcquisition", handle) {
            return status;
        }
        let waveform = match (&self.read_setup, &self.load_setup) {
            (Some(read), Some(load))
                if read.axis == axis
                    && load.axis == axis
                    && load.waveform.len() == out.len()
                    && read.num_points as usize == out.len() =>
            {
                load.waveform.clone()
            }
            (Some(_), Some(_)) => return ARGUMENT_ERROR,
            _ => return USAGE_ERROR,
        };
        self.run_trajectory(axis, waveform);
        self.sample(axis, out);
        0
    }

    fn wfma_setup(
        &mut self,
        x: &[f64],
        y: &[f64],
        z: &[f64],
        time_step: f64,
        iterations: u16,
        handle: i32,
    ) -> i32 {
        if let Some(status) = self.enter("MCL_WfmaSetup", handle) {
            return status;
        }
        if x.len() != y.len() || y.len() != z.len() || x.is_empty() {
            return ARGUMENT_ERROR;
        }
        self.wfma_setup = Some(MockWfmaSetup {
            waveforms: [x.to_vec(), y.to_vec(), z.to_vec()],
            time_step,
            iterations,
        });
        0
    }

    fn wfma_trigger(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_WfmaTrigger", handle) {
            return status;
        }
        if self.wfma_setup.is_none() {
            return USAGE_ERROR;
        }
        self.wfma_running = true;
        self.wfma_triggers += 1;
        0
    }

    fn wfma_read(&mut self, x: &mut [f64], y: &mut [f64], z: &mut [f64], handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_WfmaRead", handle) {
            return status;
        }
        let Some(setup) = &self.wfma_setup else {
            return USAGE_ERROR;
        };
        let [sx, sy, sz] = &setup.waveforms;
        if sx.len() != x.len() || sy.len() != y.len() || sz.len() != z.len() {
            return ARGUMENT_ERROR;
        }
        x.copy_from_slice(sx);
        y.copy_from_slice(sy);
        z.copy_from_slice(sz);
        for (s, samples) in [x, y, z].into_iter().enumerate() {
            if let Some(last) = samples.last() {
                self.positions[s] = *last;
            }
        }
        self.wfma_running = false;
        0
    }

    fn wfma_stop(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_WfmaStop", handle) {
            return status;
        }
        self.wfma_running = false;
        0
    }

    fn iss_set_clock(&mut self, clock: i32, mode: i32, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_IssSetClock", handle) {
            return status;
        }
        match (clock_slot(clock), mode) {
            (Some(s), 0 | 1) => {
                self.clock_modes[s] = mode;
                0
            }
            _ => ARGUMENT_ERROR,
        }
    }

    fn iss_configure_polarity(&mut self, clock: i32, polarity: i32, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_IssConfigurePolarity", handle) {
            return status;
        }
        match (clock_slot(clock), polarity) {
            (Some(s), 2 | 3) => {
                self.clock_polarities[s] = polarity;
                0
            }
            _ => ARGUMENT_ERROR,
        }
    }

    fn iss_bind_clock_to_axis(
        &mut self,
        clock: i32,
        polarity: i32,
        axis: i32,
        handle: i32,
    ) -> i32 {
        if let Some(status) = self.enter("MCL_IssBindClockToAxis", handle) {
            return status;
        }
        match (clock_slot(clock), polarity, axis) {
            (Some(s), 2..=4, 1..=6) => {
                self.clock_bindings[s] = (polarity, axis);
                0
            }
            _ => ARGUMENT_ERROR,
        }
    }

    fn iss_reset_defaults(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_IssResetDefaults", handle) {
            return status;
        }
        self.clock_modes = [0; 4];
        self.clock_polarities = [0; 4];
        self.clock_bindings = [(3, 5), (3, 6), (0, 0), (0, 0)];
        0
    }

    fn pixel_clock(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_PixelClock", handle) {
            return status;
        }
        self.pulses[0] += 1;
        0
    }

    fn line_clock(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_LineClock", handle) {
            return status;
        }
        self.pulses[1] += 1;
        0
    }

    fn frame_clock(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_FrameClock", handle) {
            return status;
        }
        self.pulses[2] += 1;
        0
    }

    fn aux_clock(&mut self, handle: i32) -> i32 {
        if let Some(status) = self.enter("MCL_AuxClock", handle) {
            return status;
        }
        self.pulses[3] += 1;
        0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
