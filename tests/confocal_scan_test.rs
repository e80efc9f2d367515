//! Confocal scan sequencing with a recording counter.

use confocal_daq::config::{ScanConfig, ScanPoint};
use confocal_daq::error::{AppResult, DaqError, DeviceFault};
use confocal_daq::experiment::{ConfocalScan, PhotonCounter, ScanProgress};
use confocal_daq::hardware::mock::MOCK_SERIAL;
use confocal_daq::hardware::MockMadlib;
use confocal_daq::nanodrive::{AxisId, NanoDrive};
use tracing_test::traced_test;

/// Counts up from 1 within each line and records every call.
#[derive(Default)]
struct RecordingCounter {
    events: Vec<&'static str>,
    armed: bool,
}

impl PhotonCounter for RecordingCounter {
    fn start(&mut self) -> AppResult<()> {
        self.events.push("start");
        self.armed = true;
        Ok(())
    }

    fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>> {
        self.events.push("read");
        assert!(self.armed, "read while disarmed");
        Ok((1..=num_points as u32).collect())
    }

    fn stop(&mut self) -> AppResult<()> {
        self.events.push("stop");
        self.armed = false;
        Ok(())
    }
}

fn small_scan() -> ConfocalScan {
    let config = ScanConfig {
        point_a: ScanPoint { x: 1.0, y: 2.0 },
        point_b: ScanPoint { x: 2.0, y: 4.0 },
        resolution_um: 1.0,
        time_per_point_ms: 0.5,
        read_rate_ms: 0.5,
    };
    ConfocalScan::from_config(&config).unwrap()
}

fn open() -> NanoDrive<MockMadlib> {
    NanoDrive::open(MockMadlib::new(), MOCK_SERIAL).unwrap()
}

#[test]
fn test_scan_records_every_line() {
    let scan = small_scan();
    assert_eq!(scan.x_positions(), &[1.0, 2.0]);
    assert_eq!(scan.y_waveform().as_slice(), &[2.0, 3.0, 4.0]);

    let mut stage = open();
    let mut counter = RecordingCounter::default();
    let data = scan.run(&mut stage, &mut counter).unwrap();

    assert_eq!(
        counter.events,
        ["start", "read", "stop", "start", "read", "stop"]
    );
    assert_eq!(data.x_positions, vec![1.0, 2.0]);
    assert_eq!(data.counts, vec![vec![1, 2, 3], vec![1, 2, 3]]);
    for trace in &data.y_traces {
        assert_eq!(trace.as_slice(), &[2.0, 3.0, 4.0]);
    }
    // counts per 0.5 ms dwell, in kcounts/s
    assert_eq!(data.count_rate, vec![2.0, 4.0, 6.0, 2.0, 4.0, 6.0]);
    assert_eq!(data.image(), vec![vec![2.0, 4.0], vec![6.0, 2.0]]);

    assert_eq!(
        stage.device().call_count("MCL_TriggerWaveformAcquisition"),
        2
    );
    assert_eq!(stage.position(AxisId::X).unwrap(), 2.0);
}

#[test]
fn test_counter_stopped_after_failed_line() {
    let scan = small_scan();
    let mut stage = open();
    stage
        .device_mut()
        .fail_next("MCL_TriggerWaveformAcquisition", -2);
    let mut counter = RecordingCounter::default();

    let err = scan.run(&mut stage, &mut counter).unwrap_err();
    assert!(matches!(err, DaqError::Device { .. }));
    assert_eq!(err.fault(), Some(DeviceFault::DeviceTransferFault));
    assert_eq!(counter.events, ["start", "stop"]);
    assert!(!counter.armed);
}

#[test]
fn test_progress_reported_per_line() {
    let scan = small_scan();
    let mut stage = open();
    let mut counter = RecordingCounter::default();
    let mut seen: Vec<ScanProgress> = Vec::new();

    scan.run_with_progress(&mut stage, &mut counter, |p| seen.push(*p))
        .unwrap();

    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].lines_done, 1);
    assert_eq!(seen[0].points_done, 3);
    assert_eq!(seen[1].total_points, 6);
    assert_eq!(seen[1].percent(), 100.0);
}

#[test]
fn test_short_counter_read_fails_line() {
    struct ShortCounter;
    impl PhotonCounter for ShortCounter {
        fn start(&mut self) -> AppResult<()> {
            Ok(())
        }
        fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>> {
            Ok(vec![0; num_points - 1])
        }
        fn stop(&mut self) -> AppResult<()> {
            Ok(())
        }
    }

    let mut stage = open();
    let err = small_scan().run(&mut stage, &mut ShortCounter).unwrap_err();
    assert!(matches!(err, DaqError::Scan(_)));
}

#[test]
#[traced_test]
fn test_scan_logs_completion() {
    let mut stage = open();
    let mut counter = RecordingCounter::default();
    small_scan().run(&mut stage, &mut counter).unwrap();

    assert!(logs_contain("starting confocal scan"));
    assert!(logs_contain("confocal scan complete"));
}

/// Counter whose stop always fails.
#[derive(Default)]
struct StuckCounter {
    stops: usize,
}

impl PhotonCounter for StuckCounter {
    fn start(&mut self) -> AppResult<()> {
        Ok(())
    }
    fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>> {
        Ok(vec![0; num_points])
    }
    fn stop(&mut self) -> AppResult<()> {
        self.stops += 1;
        Err(DaqError::Scan("counter did not disarm".into()))
    }
}

#[test]
#[traced_test]
fn test_line_error_wins_over_stop_error() {
    let mut stage = open();
    stage
        .device_mut()
        .fail_next("MCL_TriggerWaveformAcquisition", -2);
    let mut counter = StuckCounter::default();

    let err = small_scan().run(&mut stage, &mut counter).unwrap_err();
    assert_eq!(err.fault(), Some(DeviceFault::DeviceTransferFault));
    assert_eq!(counter.stops, 1);
    assert!(logs_contain("counter stop failed after a failed line"));
}

#[test]
fn test_stop_error_fails_an_otherwise_good_line() {
    let mut stage = open();
    let mut counter = StuckCounter::default();
    let err = small_scan().run(&mut stage, &mut counter).unwrap_err();
    assert!(matches!(err, DaqError::Scan(msg) if msg.contains("disarm")));
    assert_eq!(counter.stops, 1);
}
