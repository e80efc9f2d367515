//! Device command layer for Mad City Labs NanoDrive controllers.
//!
//! [`Madlib`] mirrors the vendor library one method per entry point, with the
//! vendor argument order and raw status returns. It is the only seam between
//! the stage logic and the hardware: [`MockMadlib`](super::mock::MockMadlib)
//! simulates it for tests and `--simulate` runs, and the `madlib` feature
//! provides the real binding.
//!
//! Status conventions (see `nanodrive::status`):
//! - `i32` returns are `0` on success or a negative fault code.
//! - `f64` returns are the reading itself or a negative integral fault code.
//! - Output slices are sized by the caller; their length is the point count
//!   passed to the vendor call. `MCL_WfmaRead` is the exception: it takes no
//!   count and writes whatever `MCL_WfmaSetup` committed, which
//!   [`WfmaCommits`] tracks.

use std::collections::HashMap;

/// Vendor entry points used by the NanoDrive driver.
///
/// All calls block until the firmware answers.
pub trait Madlib {
    /// `MCL_GrabAllHandles`: claims every attached device, returning the count.
    fn grab_all_handles(&mut self) -> i32;

    /// `MCL_GetHandleBySerial`: handle for a grabbed device, `0` if none.
    fn get_handle_by_serial(&mut self, serial: i16) -> i32;

    /// `MCL_ReleaseHandle`
    fn release_handle(&mut self, handle: i32);

    /// `MCL_ReleaseAllHandles`
    fn release_all_handles(&mut self);

    /// `MCL_DeviceAttached`: waits up to `wait_ms` for the device to answer.
    fn device_attached(&mut self, wait_ms: u32, handle: i32) -> bool;

    /// `MCL_PrintDeviceInfo`: writes product, firmware and library info to stdout.
    fn print_device_info(&mut self, handle: i32);

    /// `MCL_GetCalibration`: travel range of `axis` in microns.
    fn get_calibration(&mut self, axis: u32, handle: i32) -> f64;

    /// `MCL_SingleReadN`: current sensor position of `axis` in microns.
    fn single_read_n(&mut self, axis: u32, handle: i32) -> f64;

    /// `MCL_SingleWriteN`: commands `axis` to `position` microns.
    fn single_write_n(&mut self, position: f64, axis: u32, handle: i32) -> i32;

    /// `MCL_ReadWaveFormN`: samples `out.len()` points immediately.
    fn read_waveform_n(&mut self, axis: u32, rate: f64, out: &mut [f64], handle: i32) -> i32;

    /// `MCL_LoadWaveFormN`: steps through `waveform` immediately.
    fn load_waveform_n(&mut self, axis: u32, rate: f64, waveform: &[f64], handle: i32) -> i32;

    /// `MCL_Setup_ReadWaveFormN`
    fn setup_read_waveform_n(&mut self, axis: u32, num_points: u32, rate: f64, handle: i32)
        -> i32;

    /// `MCL_Setup_LoadWaveFormN`
    fn setup_load_waveform_n(&mut self, axis: u32, rate: f64, waveform: &[f64], handle: i32)
        -> i32;

    /// `MCL_Trigger_ReadWaveFormN`
    fn trigger_read_waveform_n(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32;

    /// `MCL_Trigger_LoadWaveFormN`
    fn trigger_load_waveform_n(&mut self, axis: u32, handle: i32) -> i32;

    /// `MCL_TriggerWaveformAcquisition`: runs the committed load and read together.
    fn trigger_waveform_acquisition(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32;

    /// `MCL_WfmaSetup`: all three buffers share one length.
    fn wfma_setup(
        &mut self,
        x: &[f64],
        y: &[f64],
        z: &[f64],
        time_step: f64,
        iterations: u16,
        handle: i32,
    ) -> i32;

    /// `MCL_WfmaTrigger`
    fn wfma_trigger(&mut self, handle: i32) -> i32;

    /// `MCL_WfmaRead`: blocks until the running waveform finishes, stopping
    /// an infinite one.
    fn wfma_read(&mut self, x: &mut [f64], y: &mut [f64], z: &mut [f64], handle: i32) -> i32;

    /// `MCL_WfmaStop`
    fn wfma_stop(&mut self, handle: i32) -> i32;

    /// `MCL_IssSetClock`
    fn iss_set_clock(&mut self, clock: i32, mode: i32, handle: i32) -> i32;

    /// `MCL_IssConfigurePolarity`
    fn iss_configure_polarity(&mut self, clock: i32, polarity: i32, handle: i32) -> i32;

    /// `MCL_IssBindClockToAxis`
    fn iss_bind_clock_to_axis(&mut self, clock: i32, polarity: i32, axis: i32, handle: i32)
        -> i32;

    /// `MCL_IssResetDefaults`
    fn iss_reset_defaults(&mut self, handle: i32) -> i32;

    /// `MCL_PixelClock`: 250 ns pulse on the pixel clock output.
    fn pixel_clock(&mut self, handle: i32) -> i32;

    /// `MCL_LineClock`
    fn line_clock(&mut self, handle: i32) -> i32;

    /// `MCL_FrameClock`
    fn frame_clock(&mut self, handle: i32) -> i32;

    /// `MCL_AuxClock`
    fn aux_clock(&mut self, handle: i32) -> i32;
}

/// Point count last committed by `MCL_WfmaSetup`, per handle.
#[derive(Debug, Default, Clone)]
pub struct WfmaCommits {
    points: HashMap<i32, usize>,
}

impl WfmaCommits {
    pub fn record(&mut self, handle: i32, points: usize) {
        self.points.insert(handle, points);
    }

    pub fn forget(&mut self, handle: i32) {
        self.points.remove(&handle);
    }

    pub fn forget_all(&mut self) {
        self.points.clear();
    }

    /// True if every buffer can hold the committed point count of `handle`.
    /// Nothing committed through this binding means nothing fits.
    pub fn fits(&self, handle: i32, lens: [usize; 3]) -> bool {
        match self.points.get(&handle) {
            Some(&points) => lens.iter().all(|&len| len >= points),
            None => false,
        }
    }
}

impl<T: Madlib + ?Sized> Madlib for Box<T> {
    fn grab_all_handles(&mut self) -> i32 {
        (**self).grab_all_handles()
    }
    fn get_handle_by_serial(&mut self, serial: i16) -> i32 {
        (**self).get_handle_by_serial(serial)
    }
    fn release_handle(&mut self, handle: i32) {
        (**self).release_handle(handle)
    }
    fn release_all_handles(&mut self) {
        (**self).release_all_handles()
    }
    fn device_attached(&mut self, wait_ms: u32, handle: i32) -> bool {
        (**self).device_attached(wait_ms, handle)
    }
    fn print_device_info(&mut self, handle: i32) {
        (**self).print_device_info(handle)
    }
    fn get_calibration(&mut self, axis: u32, handle: i32) -> f64 {
        (**self).get_calibration(axis, handle)
    }
    fn single_read_n(&mut self, axis: u32, handle: i32) -> f64 {
        (**self).single_read_n(axis, handle)
    }
    fn single_write_n(&mut self, position: f64, axis: u32, handle: i32) -> i32 {
        (**self).single_write_n(position, axis, handle)
    }
    fn read_waveform_n(&mut self, axis: u32, rate: f64, out: &mut [f64], handle: i32) -> i32 {
        (**self).read_waveform_n(axis, rate, out, handle)
    }
    fn load_waveform_n(&mut self, axis: u32, rate: f64, waveform: &[f64], handle: i32) -> i32 {
        (**self).load_waveform_n(axis, rate, waveform, handle)
    }
    fn setup_read_waveform_n(
        &mut self,
        axis: u32,
        num_points: u32,
        rate: f64,
        handle: i32,
    ) -> i32 {
        (**self).setup_read_waveform_n(axis, num_points, rate, handle)
    }
    fn setup_load_waveform_n(
        &mut self,
        axis: u32,
        rate: f64,
        waveform: &[f64],
        handle: i32,
    ) -> i32 {
        (**self).setup_load_waveform_n(axis, rate, waveform, handle)
    }
    fn trigger_read_waveform_n(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        (**self).trigger_read_waveform_n(axis, out, handle)
    }
    fn trigger_load_waveform_n(&mut self, axis: u32, handle: i32) -> i32 {
        (**self).trigger_load_waveform_n(axis, handle)
    }
    fn trigger_waveform_acquisition(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        (**self).trigger_waveform_acquisition(axis, out, handle)
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
        (**self).wfma_setup(x, y, z, time_step, iterations, handle)
    }
    fn wfma_trigger(&mut self, handle: i32) -> i32 {
        (**self).wfma_trigger(handle)
    }
    fn wfma_read(&mut self, x: &mut [f64], y: &mut [f64], z: &mut [f64], handle: i32) -> i32 {
        (**self).wfma_read(x, y, z, handle)
    }
    fn wfma_stop(&mut self, handle: i32) -> i32 {
        (**self).wfma_stop(handle)
    }
    fn iss_set_clock(&mut self, clock: i32, mode: i32, handle: i32) -> i32 {
        (**self).iss_set_clock(clock, mode, handle)
    }
    fn iss_configure_polarity(&mut self, clock: i32, polarity: i32, handle: i32) -> i32 {
        (**self).iss_configure_polarity(clock, polarity, handle)
    }
    fn iss_bind_clock_to_axis(
        &mut self,
        clock: i32,
        polarity: i32,
        axis: i32,
        handle: i32,
    ) -> i32 {
        (**self).iss_bind_clock_to_axis(clock, polarity, axis, handle)
    }
    fn iss_reset_defaults(&mut self, handle: i32) -> i32 {
        (**self).iss_reset_defaults(handle)
    }
    fn pixel_clock(&mut self, handle: i32) -> i32 {
        (**self).pixel_clock(handle)
    }
    fn line_clock(&mut self, handle: i32) -> i32 {
        (**self).line_clock(handle)
    }
    fn frame_clock(&mut self, handle: i32) -> i32 {
        (**self).frame_clock(handle)
    }
    fn aux_clock(&mut self, handle: i32) -> i32 {
        (**self).aux_clock(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_buffers_must_hold_committed_points() {
        let mut commits = WfmaCommits::default();
        assert!(!commits.fits(1, [10, 10, 10]));

        commits.record(1, 100);
        assert!(commits.fits(1, [100, 100, 100]));
        assert!(commits.fits(1, [100, 120, 100]));
        assert!(!commits.fits(1, [1, 100, 100]));
        assert!(!commits.fits(2, [100, 100, 100]));

        commits.record(1, 4);
        assert!(commits.fits(1, [4, 4, 4]));
    }

    #[test]
    fn test_released_handle_forgets_commit() {
        let mut commits = WfmaCommits::default();
        commits.record(1, 3);
        commits.record(2, 3);
        commits.forget(1);
        assert!(!commits.fits(1, [3, 3, 3]));
        assert!(commits.fits(2, [3, 3, 3]));
        commits.forget_all();
        assert!(!commits.fits(2, [3, 3, 3]));
    }
}
