//! Confocal line scan.
//!
//! The sample is imaged one x-line at a time. For every x position the
//! stage moves there, the photon counter is armed, and a y waveform spanning
//! the scan height is loaded and read back in a single
//! [`acquire`](NanoDrive::acquire). The counter bins one count per waveform
//! point, so the counts of a line line up with its recorded y trace.
//!
//! ```text
//!   y ^   line 0   line 1   line 2
//!     |     |        |        |
//!     |     |        |        |
//!     +-----+--------+--------+----> x
//! ```

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::{AppResult, DaqError};
use crate::hardware::Madlib;
use crate::nanodrive::{
    validate_point_count, AxisId, LoadRate, NanoDrive, ReadRate, WaveformBuffer, MAX_DATAPOINTS,
};

// =============================================================================
// Photon counter
// =============================================================================

/// Gated photon counter that bins one count per stage waveform point.
pub trait PhotonCounter {
    /// Arms the counter for a line.
    fn start(&mut self) -> AppResult<()>;

    /// Returns `num_points` binned counts of the current line.
    fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>>;

    /// Disarms the counter.
    fn stop(&mut self) -> AppResult<()>;
}

impl<T: PhotonCounter + ?Sized> PhotonCounter for Box<T> {
    fn start(&mut self) -> AppResult<()> {
        (**self).start()
    }
    fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>> {
        (**self).read_counts(num_points)
    }
    fn stop(&mut self) -> AppResult<()> {
        (**self).stop()
    }
}

/// Counter producing dark counts with uniform noise, for `--simulate` runs.
#[derive(Debug)]
pub struct SimulatedCounter {
    mean_counts: u32,
    spread: u32,
    armed: bool,
    rng: StdRng,
}

impl SimulatedCounter {
    /// Counts are drawn from `mean_counts ± spread`. Same seed, same image.
    pub fn new(mean_counts: u32, spread: u32, seed: u64) -> Self {
        Self {
            mean_counts,
            spread: spread.min(mean_counts),
            armed: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PhotonCounter for SimulatedCounter {
    fn start(&mut self) -> AppResult<()> {
        self.armed = true;
        Ok(())
    }

    fn read_counts(&mut self, num_points: usize) -> AppResult<Vec<u32>> {
        if !self.armed {
            return Err(DaqError::Scan("counter read before start".into()));
        }
        let low = self.mean_counts - self.spread;
        let high = self.mean_counts + self.spread;
        Ok((0..num_points)
            .map(|_| self.rng.gen_range(low..=high))
            .collect())
    }

    fn stop(&mut self) -> AppResult<()> {
        self.armed = false;
        Ok(())
    }
}

// =============================================================================
// Scan
// =============================================================================

/// Progress after each completed line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScanProgress {
    pub lines_done: usize,
    pub total_lines: usize,
    pub points_done: usize,
    pub total_points: usize,
}

impl ScanProgress {
    pub fn percent(&self) -> f64 {
        if self.total_points == 0 {
            return 100.0;
        }
        100.0 * self.points_done as f64 / self.total_points as f64
    }
}

/// Everything recorded by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanData {
    pub started_at: DateTime<Utc>,
    /// Settled x position of every line, in microns.
    pub x_positions: Vec<f64>,
    /// Recorded y trajectory of every line.
    pub y_traces: Vec<WaveformBuffer>,
    /// Raw counts of every line.
    pub counts: Vec<Vec<u32>>,
    /// Count rate of every pixel in kcounts/s, line after line.
    pub count_rate: Vec<f64>,
}

impl ScanData {
    /// Largest square image the count rates fill, row per line.
    pub fn image(&self) -> Vec<Vec<f64>> {
        let side = (self.count_rate.len() as f64).sqrt().floor() as usize;
        if side == 0 {
            return Vec::new();
        }
        self.count_rate
            .chunks_exact(side)
            .take(side)
            .map(<[f64]>::to_vec)
            .collect()
    }
}

/// A validated scan plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfocalScan {
    x_positions: Vec<f64>,
    y_waveform: WaveformBuffer,
    time_per_point: LoadRate,
    read_rate: ReadRate,
}

/// Most x lines a single scan may have.
pub const MAX_SCAN_LINES: usize = 10_000;

/// Point count of the inclusive grid from `min` to `max`, as a float so
/// huge or infinite counts can be rejected before anything is allocated.
fn grid_len(min: f64, max: f64, step: f64) -> f64 {
    ((max - min) / step + 1e-9).floor().max(0.0) + 1.0
}

/// Inclusive grid from `min` to `max` in steps of `step`. Callers bound the
/// length with [`grid_len`] first.
fn grid(min: f64, max: f64, step: f64) -> Vec<f64> {
    let len = grid_len(min, max, step) as usize;
    (0..len).map(|i| min + step * i as f64).collect()
}

impl ConfocalScan {
    /// Plans a scan over the rectangle of `config`.
    ///
    /// The dwell time doubles as the load rate of the y waveform, so it must
    /// be a legal load rate, and a line must fit in one waveform.
    pub fn from_config(config: &ScanConfig) -> AppResult<Self> {
        let (_, num_points) = Self::grid_size(config)?;
        let (a, b) = (config.point_a, config.point_b);
        let x_positions = grid(a.x, b.x, config.resolution_um);
        let y_positions = grid(a.y, b.y, config.resolution_um);

        Ok(Self {
            x_positions,
            y_waveform: WaveformBuffer::build(&y_positions, num_points)?,
            time_per_point: LoadRate::from_ms(config.time_per_point_ms)?,
            read_rate: ReadRate::from_ms(config.read_rate_ms)?,
        })
    }

    /// Lines and points per line of the scan `config` describes, checked
    /// against [`MAX_SCAN_LINES`] and the waveform point limit without
    /// building the grid.
    pub fn grid_size(config: &ScanConfig) -> AppResult<(usize, usize)> {
        let step = config.resolution_um;
        if !(step > 0.0) || !step.is_finite() {
            return Err(DaqError::Scan(format!(
                "resolution must be positive, got {step} um"
            )));
        }
        let (a, b) = (config.point_a, config.point_b);
        if ![a.x, a.y, b.x, b.y].iter().all(|v| v.is_finite()) {
            return Err(DaqError::Scan("scan corners must be finite".into()));
        }
        if b.x < a.x || b.y < a.y {
            return Err(DaqError::Scan("point_b must lie above and right of point_a".into()));
        }

        let lines = grid_len(a.x, b.x, step);
        if lines > MAX_SCAN_LINES as f64 {
            return Err(DaqError::Scan(format!(
                "{lines} lines exceed the limit of {MAX_SCAN_LINES}"
            )));
        }
        let points = grid_len(a.y, b.y, step);
        if points > MAX_DATAPOINTS as f64 {
            return Err(DaqError::PointCountOutOfRange {
                requested: if points.is_finite() { points as usize } else { usize::MAX },
                max: MAX_DATAPOINTS,
            });
        }
        Ok((lines as usize, validate_point_count(points as usize)?))
    }

    pub fn x_positions(&self) -> &[f64] {
        &self.x_positions
    }

    /// The y trajectory driven on every line.
    pub fn y_waveform(&self) -> &WaveformBuffer {
        &self.y_waveform
    }

    /// Pixels in the whole scan.
    pub fn total_points(&self) -> usize {
        self.x_positions.len() * self.y_waveform.len()
    }

    /// Runs the scan.
    pub fn run<D: Madlib, C: PhotonCounter>(
        &self,
        drive: &mut NanoDrive<D>,
        counter: &mut C,
    ) -> AppResult<ScanData> {
        self.run_with_progress(drive, counter, |_| {})
    }

    /// Runs the scan, calling `on_line` after every line.
    ///
    /// The counter is stopped after every line, including a failed one.
    pub fn run_with_progress<D: Madlib, C: PhotonCounter>(
        &self,
        drive: &mut NanoDrive<D>,
        counter: &mut C,
        mut on_line: impl FnMut(&ScanProgress),
    ) -> AppResult<ScanData> {
        let num_points = self.y_waveform.len();
        let y_start = self.y_waveform[0];
        let dwell_ms = self.time_per_point.millis();
        let mut data = ScanData {
            started_at: Utc::now(),
            x_positions: Vec::with_capacity(self.x_positions.len()),
            y_traces: Vec::with_capacity(self.x_positions.len()),
            counts: Vec::with_capacity(self.x_positions.len()),
            count_rate: Vec::with_capacity(self.total_points()),
        };
        info!(
            lines = self.x_positions.len(),
            points_per_line = num_points,
            dwell_ms,
            "starting confocal scan"
        );

        for (line, &x) in self.x_positions.iter().enumerate() {
            drive.move_to(AxisId::Y, y_start)?;
            let x_settled = drive.move_and_settle(AxisId::X, x)?;
            drive.wait_settled(AxisId::Y, y_start)?;

            counter.start()?;
            let recorded = self.record_line(drive, counter);
            let stopped = counter.stop();
            let (trace, counts) = match (recorded, stopped) {
                (Ok(line), Ok(())) => line,
                (Ok(_), Err(e)) => return Err(e),
                (Err(e), Ok(())) => return Err(e),
                (Err(e), Err(stop_err)) => {
                    warn!(line, error = %stop_err, "counter stop failed after a failed line");
                    return Err(e);
                }
            };

            data.x_positions.push(x_settled);
            data.count_rate
                .extend(counts.iter().map(|&c| f64::from(c) / dwell_ms));
            data.y_traces.push(trace);
            data.counts.push(counts);

            let progress = ScanProgress {
                lines_done: line + 1,
                total_lines: self.x_positions.len(),
                points_done: (line + 1) * num_points,
                total_points: self.total_points(),
            };
            debug!(x = x_settled, percent = progress.percent(), "line done");
            on_line(&progress);
        }

        info!(pixels = data.count_rate.len(), "confocal scan complete");
        Ok(data)
    }

    fn record_line<D: Madlib, C: PhotonCounter>(
        &self,
        drive: &mut NanoDrive<D>,
        counter: &mut C,
    ) -> AppResult<(WaveformBuffer, Vec<u32>)> {
        let num_points = self.y_waveform.len();
        drive.setup_read(AxisId::Y, num_points, self.read_rate)?;
        drive.setup_load(AxisId::Y, &self.y_waveform, self.time_per_point)?;
        let trace = drive.acquire(AxisId::Y)?;

        let counts = counter.read_counts(num_points)?;
        if counts.len() != num_points {
            return Err(DaqError::Scan(format!(
                "counter returned {} bins for a {num_points} point line",
                counts.len()
            )));
        }
        Ok((trace, counts))
    }
}
