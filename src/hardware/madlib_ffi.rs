//! Binding to the Mad City Labs `Madlib` shared library.
//!
//! Only compiled with the `madlib` feature. The library ships with the
//! NanoDrive installer (`Madlib.dll` on Windows, `libmadlib.so` on Linux);
//! the linker must be able to find it.
//!
//! Every call blocks the calling thread until the controller answers.

#![allow(unsafe_code)]

use libc::{c_double, c_int, c_short, c_uint, c_ushort};

use super::madlib::{Madlib, WfmaCommits};

const ARGUMENT_ERROR: i32 = -6;

#[link(name = "madlib")]
extern "system" {
    fn MCL_GrabAllHandles() -> c_int;
    fn MCL_GetHandleBySerial(serial: c_short) -> c_int;
    fn MCL_ReleaseHandle(handle: c_int);
    fn MCL_ReleaseAllHandles();
    fn MCL_DeviceAttached(milliseconds: c_uint, handle: c_int) -> bool;
    fn MCL_PrintDeviceInfo(handle: c_int);
    fn MCL_GetCalibration(axis: c_uint, handle: c_int) -> c_double;
    fn MCL_SingleReadN(axis: c_uint, handle: c_int) -> c_double;
    fn MCL_SingleWriteN(position: c_double, axis: c_uint, handle: c_int) -> c_int;
    fn MCL_ReadWaveFormN(
        axis: c_uint,
        data_points: c_uint,
        milliseconds: c_double,
        waveform: *mut c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_LoadWaveFormN(
        axis: c_uint,
        data_points: c_uint,
        milliseconds: c_double,
        waveform: *const c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_Setup_ReadWaveFormN(
        axis: c_uint,
        data_points: c_uint,
        milliseconds: c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_Setup_LoadWaveFormN(
        axis: c_uint,
        data_points: c_uint,
        milliseconds: c_double,
        waveform: *const c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_Trigger_ReadWaveFormN(
        axis: c_uint,
        data_points: c_uint,
        waveform: *mut c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_Trigger_LoadWaveFormN(axis: c_uint, handle: c_int) -> c_int;
    fn MCL_TriggerWaveformAcquisition(
        axis: c_uint,
        data_points: c_uint,
        waveform: *mut c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_WfmaSetup(
        x: *const c_double,
        y: *const c_double,
        z: *const c_double,
        data_points: c_int,
        milliseconds: c_double,
        iterations: c_ushort,
        handle: c_int,
    ) -> c_int;
    fn MCL_WfmaTrigger(handle: c_int) -> c_int;
    fn MCL_WfmaRead(
        x: *mut c_double,
        y: *mut c_double,
        z: *mut c_double,
        handle: c_int,
    ) -> c_int;
    fn MCL_WfmaStop(handle: c_int) -> c_int;
    fn MCL_IssSetClock(clock: c_int, mode: c_int, handle: c_int) -> c_int;
    fn MCL_IssConfigurePolarity(clock: c_int, mode: c_int, handle: c_int) -> c_int;
    fn MCL_IssBindClockToAxis(clock: c_int, mode: c_int, axis: c_int, handle: c_int) -> c_int;
    fn MCL_IssResetDefaults(handle: c_int) -> c_int;
    fn MCL_PixelClock(handle: c_int) -> c_int;
    fn MCL_LineClock(handle: c_int) -> c_int;
    fn MCL_FrameClock(handle: c_int) -> c_int;
    fn MCL_AuxClock(handle: c_int) -> c_int;
}

// Point counts are bounded by MAX_DATAPOINTS long before this can saturate.
fn points(len: usize) -> c_uint {
    c_uint::try_from(len).unwrap_or(c_uint::MAX)
}

/// The installed vendor library.
///
/// The library keeps its own handle table; handle ownership lives in
/// `NanoDrive`. The binding only remembers the multi-axis point count it
/// committed on each handle, so reads into short buffers can be refused.
#[derive(Debug, Default)]
pub struct VendorMadlib {
    wfma: WfmaCommits,
}

impl VendorMadlib {
    pub fn new() -> Self {
        Self::default()
    }
}

// SAFETY (all methods): arguments are plain values. Every pointer comes from
// a live slice whose length is the point count passed alongside it, except
// for MCL_WfmaRead, which writes the count committed by MCL_WfmaSetup and is
// only called once all three buffers are known to hold it.
impl Madlib for VendorMadlib {
    fn grab_all_handles(&mut self) -> i32 {
        unsafe { MCL_GrabAllHandles() }
    }

    fn get_handle_by_serial(&mut self, serial: i16) -> i32 {
        unsafe { MCL_GetHandleBySerial(serial) }
    }

    fn release_handle(&mut self, handle: i32) {
        self.wfma.forget(handle);
        unsafe { MCL_ReleaseHandle(handle) }
    }

    fn release_all_handles(&mut self) {
        self.wfma.forget_all();
        unsafe { MCL_ReleaseAllHandles() }
    }

    fn device_attached(&mut self, wait_ms: u32, handle: i32) -> bool {
        unsafe { MCL_DeviceAttached(wait_ms, handle) }
    }

    fn print_device_info(&mut self, handle: i32) {
        unsafe { MCL_PrintDeviceInfo(handle) }
    }

    fn get_calibration(&mut self, axis: u32, handle: i32) -> f64 {
        unsafe { MCL_GetCalibration(axis, handle) }
    }

    fn single_read_n(&mut self, axis: u32, handle: i32) -> f64 {
        unsafe { MCL_SingleReadN(axis, handle) }
    }

    fn single_write_n(&mut self, position: f64, axis: u32, handle: i32) -> i32 {
        unsafe { MCL_SingleWriteN(position, axis, handle) }
    }

    fn read_waveform_n(&mut self, axis: u32, rate: f64, out: &mut [f64], handle: i32) -> i32 {
        unsafe { MCL_ReadWaveFormN(axis, points(out.len()), rate, out.as_mut_ptr(), handle) }
    }

    fn load_waveform_n(&mut self, axis: u32, rate: f64, waveform: &[f64], handle: i32) -> i32 {
        unsafe {
            MCL_LoadWaveFormN(
                axis,
                points(waveform.len()),
                rate,
                waveform.as_ptr(),
                handle,
            )
        }
    }

    fn setup_read_waveform_n(
        &mut self,
        axis: u32,
        num_points: u32,
        rate: f64,
        handle: i32,
    ) -> i32 {
        unsafe { MCL_Setup_ReadWaveFormN(axis, num_points, rate, handle) }
    }

    fn setup_load_waveform_n(
        &mut self,
        axis: u32,
        rate: f64,
        waveform: &[f64],
        handle: i32,
    ) -> i32 {
        unsafe {
            MCL_Setup_LoadWaveFormN(
                axis,
                points(waveform.len()),
                rate,
                waveform.as_ptr(),
                handle,
            )
        }
    }

    fn trigger_read_waveform_n(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        unsafe { MCL_Trigger_ReadWaveFormN(axis, points(out.len()), out.as_mut_ptr(), handle) }
    }

    fn trigger_load_waveform_n(&mut self, axis: u32, handle: i32) -> i32 {
        unsafe { MCL_Trigger_LoadWaveFormN(axis, handle) }
    }

    fn trigger_waveform_acquisition(&mut self, axis: u32, out: &mut [f64], handle: i32) -> i32 {
        unsafe {
            MCL_TriggerWaveformAcquisition(axis, points(out.len()), out.as_mut_ptr(), handle)
        }
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
        // The firmware reads data_points values from each buffer.
        if x.len() != y.len() || y.len() != z.len() {
            return ARGUMENT_ERROR;
        }
        let Ok(data_points) = c_int::try_from(x.len()) else {
            return ARGUMENT_ERROR;
        };
        // A rejected setup leaves no count this binding can trust.
        self.wfma.forget(handle);
        let status = unsafe {
            MCL_WfmaSetup(
                x.as_ptr(),
                y.as_ptr(),
                z.as_ptr(),
                data_points,
                time_step,
                iterations,
                handle,
            )
        };
        if status >= 0 {
            self.wfma.record(handle, x.len());
        }
        status
    }

    fn wfma_trigger(&mut self, handle: i32) -> i32 {
        unsafe { MCL_WfmaTrigger(handle) }
    }

    fn wfma_read(&mut self, x: &mut [f64], y: &mut [f64], z: &mut [f64], handle: i32) -> i32 {
        if !self.wfma.fits(handle, [x.len(), y.len(), z.len()]) {
            return ARGUMENT_ERROR;
        }
        unsafe { MCL_WfmaRead(x.as_mut_ptr(), y.as_mut_ptr(), z.as_mut_ptr(), handle) }
    }

    fn wfma_stop(&mut self, handle: i32) -> i32 {
        unsafe { MCL_WfmaStop(handle) }
    }

    fn iss_set_clock(&mut self, clock: i32, mode: i32, handle: i32) -> i32 {
        unsafe { MCL_IssSetClock(clock, mode, handle) }
    }

    fn iss_configure_polarity(&mut self, clock: i32, polarity: i32, handle: i32) -> i32 {
        unsafe { MCL_IssConfigurePolarity(clock, polarity, handle) }
    }

    fn iss_bind_clock_to_axis(
        &mut self,
        clock: i32,
        polarity: i32,
        axis: i32,
        handle: i32,
    ) -> i32 {
        unsafe { MCL_IssBindClockToAxis(clock, polarity, axis, handle) }
    }

    fn iss_reset_defaults(&mut self, handle: i32) -> i32 {
        unsafe { MCL_IssResetDefaults(handle) }
    }

    fn pixel_clock(&mut self, handle: i32) -> i32 {
        unsafe { MCL_PixelClock(handle) }
    }

    fn line_clock(&mut self, handle: i32) -> i32 {
        unsafe { MCL_LineClock(handle) }
    }

    fn frame_clock(&mut self, handle: i32) -> i32 {
        unsafe { MCL_FrameClock(handle) }
    }

    fn aux_clock(&mut self, handle: i32) -> i32 {
        unsafe { MCL_AuxClock(handle) }
    }
}
