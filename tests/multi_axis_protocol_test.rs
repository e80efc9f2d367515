//! Multi-axis waveform lifecycle against the simulated controller.

use confocal_daq::error::{DaqError, DeviceFault, Track};
use confocal_daq::hardware::mock::MOCK_SERIAL;
use confocal_daq::hardware::MockMadlib;
use confocal_daq::nanodrive::multi_axis::RUN_FOREVER;
use confocal_daq::nanodrive::{
    AxisId, LoadRate, MultiAxisJob, MultiAxisState, NanoDrive, ReadRate, TimeStep,
};

fn open() -> NanoDrive<MockMadlib> {
    NanoDrive::open(MockMadlib::new(), MOCK_SERIAL).unwrap()
}

#[test]
fn test_setup_trigger_read_cycle() {
    let mut stage = open();
    let x = [0.0, 1.0, 2.0, 3.0];
    let y = [10.0, 10.0, 11.0, 11.0];
    let z = [50.0; 4];

    let job = MultiAxisJob::new(4, TimeStep::Ms0267, 1)
        .with_waveform(AxisId::X, &x)
        .unwrap()
        .with_waveform(AxisId::Y, &y)
        .unwrap()
        .with_waveform(AxisId::Z, &z)
        .unwrap();
    stage.setup_multi_axis(&job).unwrap();
    assert!(stage.multi_axis_state().is_configured());

    stage.trigger_multi_axis().unwrap();
    assert!(stage.multi_axis_state().is_running());

    let (rx, ry, rz) = stage.read_multi_axis().unwrap();
    assert_eq!(rx.as_slice(), &x);
    assert_eq!(ry.as_slice(), &y);
    assert_eq!(rz.as_slice(), &z);
    assert_eq!(
        stage.multi_axis_state(),
        MultiAxisState::Configured {
            points: 4,
            time_step: TimeStep::Ms0267,
            iterations: 1
        }
    );

    // The stage rests at the end of each trajectory.
    assert_eq!(stage.position(AxisId::X).unwrap(), 3.0);
    assert_eq!(stage.position(AxisId::Z).unwrap(), 50.0);
}

#[test]
fn test_unequal_lengths_are_rejected_locally() {
    let mut stage = open();
    let job = MultiAxisJob::new(5, TimeStep::Ms1, 1)
        .with_waveform(AxisId::Y, &[1.0; 4])
        .unwrap();

    let err = stage.setup_multi_axis(&job).unwrap_err();
    assert!(matches!(
        err,
        DaqError::LengthMismatch {
            axis: Some(AxisId::Y),
            expected: 5,
            actual: 4
        }
    ));
    assert_eq!(stage.multi_axis_state(), MultiAxisState::Unconfigured);
    assert_eq!(stage.device().call_count("MCL_WfmaSetup"), 0);
}

#[test]
fn test_failed_resetup_leaves_track_unconfigured() {
    let mut stage = open();
    let good = MultiAxisJob::new(2, TimeStep::Ms1, 1);
    stage.setup_multi_axis(&good).unwrap();

    let bad = MultiAxisJob::new(2, TimeStep::Ms1, 1)
        .with_waveform(AxisId::X, &[1.0])
        .unwrap();
    assert!(stage.setup_multi_axis(&bad).is_err());
    assert!(matches!(
        stage.trigger_multi_axis(),
        Err(DaqError::NotConfigured(Track::MultiAxis))
    ));
}

#[test]
fn test_stop_on_idle_machine_is_a_noop() {
    let mut stage = open();
    stage.stop_multi_axis().unwrap();
    assert_eq!(stage.multi_axis_state(), MultiAxisState::Unconfigured);
}

#[test]
fn test_stop_fault_while_running_is_reported() {
    let mut stage = open();
    let job = MultiAxisJob::new(3, TimeStep::Ms2, RUN_FOREVER);
    stage.setup_multi_axis(&job).unwrap();
    stage.trigger_multi_axis().unwrap();
    stage.device_mut().fail_next("MCL_WfmaStop", -1);

    let err = stage.stop_multi_axis().unwrap_err();
    assert_eq!(err.fault(), Some(DeviceFault::GeneralFault));
    assert!(!stage.multi_axis_state().is_running());
}

#[test]
fn test_trigger_fault_keeps_configuration() {
    let mut stage = open();
    let job = MultiAxisJob::new(3, TimeStep::Ms1, 2);
    stage.setup_multi_axis(&job).unwrap();
    stage.device_mut().fail_next("MCL_WfmaTrigger", -5);

    let err = stage.trigger_multi_axis().unwrap_err();
    assert_eq!(err.fault(), Some(DeviceFault::DeviceBusy));
    assert!(stage.multi_axis_state().is_configured());
    assert!(!stage.multi_axis_state().is_running());

    stage.trigger_multi_axis().unwrap();
    assert_eq!(stage.device().wfma_triggers(), 1);
}

#[test]
fn test_single_axis_tracks_are_independent() {
    let mut stage = open();
    stage.setup_read(AxisId::X, 4, ReadRate::Ms1).unwrap();
    stage
        .setup_load(AxisId::X, &[1.0, 2.0, 3.0, 4.0], LoadRate::DEFAULT)
        .unwrap();

    let job = MultiAxisJob::new(2, TimeStep::Ms1, 1);
    stage.setup_multi_axis(&job).unwrap();
    stage.trigger_multi_axis().unwrap();
    stage.read_multi_axis().unwrap();

    assert!(stage.read_track().is_configured());
    assert!(stage.load_track().is_configured());
}
