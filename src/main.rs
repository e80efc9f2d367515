//! `confocal_daq` command line tool.
//!
//! Every command opens the stage, runs one operation and prints the result
//! as JSON on stdout. Logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use tracing::info;

use confocal_daq::config::Settings;
use confocal_daq::experiment::{ConfocalScan, SimulatedCounter};
use confocal_daq::hardware::{Madlib, MockMadlib};
use confocal_daq::logging;
use confocal_daq::nanodrive::{
    AxisId, Clock, ClockBinding, ClockMode, ClockPolarity, LoadRate, MultiAxisJob, NanoDrive,
    ReadRate, TimeStep, WaveformBuffer,
};

#[derive(Parser, Debug)]
#[command(name = "confocal_daq", version, about = "NanoDrive waveform control and confocal scans")]
struct Cli {
    /// Configuration file (default: ./confocal.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated controller instead of the vendor library
    #[arg(long, global = true)]
    simulate: bool,

    /// Override the configured controller serial
    #[arg(long, global = true)]
    serial: Option<i16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print controller info, axis ranges and positions
    Info,

    /// Move one axis
    Move {
        #[arg(long, value_parser = parse_axis)]
        axis: AxisId,
        /// Target in microns
        #[arg(long)]
        position: f64,
        /// Wait until the sensor reads the target
        #[arg(long)]
        settle: bool,
    },

    /// Sample an axis immediately
    Read {
        #[arg(long, value_parser = parse_axis)]
        axis: AxisId,
        #[arg(long)]
        points: usize,
        /// Read rate in ms
        #[arg(long, default_value_t = 2.0)]
        rate: f64,
    },

    /// Load a waveform and record it in one operation
    Acquire {
        #[arg(long, value_parser = parse_axis)]
        axis: AxisId,
        /// Load rate in ms
        #[arg(long, default_value_t = 2.0)]
        rate: f64,
        /// Read rate in ms
        #[arg(long, default_value_t = 2.0)]
        read_rate: f64,
        /// JSON array of positions in microns
        #[arg(long, conflicts_with = "ramp")]
        file: Option<PathBuf>,
        /// Linear ramp as START,END,POINTS
        #[arg(long, value_parser = parse_ramp)]
        ramp: Option<WaveformBuffer>,
    },

    /// Run a synchronized x/y/z waveform and read it back
    Multi {
        #[arg(long)]
        x_file: Option<PathBuf>,
        #[arg(long)]
        y_file: Option<PathBuf>,
        #[arg(long)]
        z_file: Option<PathBuf>,
        /// Time step in ms: 0.267, 0.5, 1 or 2
        #[arg(long, default_value_t = 1.0)]
        time_step: f64,
        /// Repetitions, 0 repeats until the read stops it
        #[arg(long, default_value_t = 1)]
        iterations: u16,
    },

    /// Configure the ISS clock outputs
    #[command(subcommand)]
    Clock(ClockCommand),

    /// Run the configured confocal scan
    Scan {
        /// Write the scan data here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ClockCommand {
    /// Set the idle level
    Mode {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
        mode: ModeArg,
    },
    /// Set the manual pulse direction
    Polarity {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
        polarity: PolarityArg,
    },
    /// Bind to x, y, z, aux, read or load; `none` unbinds
    Bind {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
        #[arg(value_parser = parse_binding)]
        target: ClockBinding,
        #[arg(long, value_enum, default_value_t = PolarityArg::LowToHigh)]
        polarity: PolarityArg,
    },
    /// Restore power-on defaults on all clocks
    Reset,
    /// Emit one pulse
    Pulse {
        #[arg(value_parser = parse_clock)]
        clock: Clock,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Low,
    High,
}

impl From<ModeArg> for ClockMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Low => ClockMode::Low,
            ModeArg::High => ClockMode::High,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolarityArg {
    LowToHigh,
    HighToLow,
}

impl From<PolarityArg> for ClockPolarity {
    fn from(arg: PolarityArg) -> Self {
        match arg {
            PolarityArg::LowToHigh => ClockPolarity::LowToHigh,
            PolarityArg::HighToLow => ClockPolarity::HighToLow,
        }
    }
}

fn parse_axis(s: &str) -> Result<AxisId, String> {
    s.parse().map_err(|e: confocal_daq::DaqError| e.to_string())
}

fn parse_clock(s: &str) -> Result<Clock, String> {
    s.parse().map_err(|e: confocal_daq::DaqError| e.to_string())
}

fn parse_binding(s: &str) -> Result<ClockBinding, String> {
    s.parse().map_err(|e: confocal_daq::DaqError| e.to_string())
}

fn parse_ramp(s: &str) -> Result<WaveformBuffer, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [start, end, points] = parts.as_slice() else {
        return Err(format!("expected START,END,POINTS, got '{s}'"));
    };
    let start: f64 = start.parse().map_err(|e| format!("start: {e}"))?;
    let end: f64 = end.parse().map_err(|e| format!("end: {e}"))?;
    let points: usize = points.parse().map_err(|e| format!("points: {e}"))?;
    WaveformBuffer::ramp(start, end, points).map_err(|e| e.to_string())
}

fn read_waveform_file(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read waveform file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

fn open_device(simulate: bool, serial: i16) -> Result<Box<dyn Madlib>> {
    if simulate {
        return Ok(Box::new(MockMadlib::with_serial(serial)));
    }
    #[cfg(feature = "madlib")]
    {
        Ok(Box::new(confocal_daq::hardware::VendorMadlib::new()))
    }
    #[cfg(not(feature = "madlib"))]
    {
        bail!("built without the `madlib` feature; pass --simulate to use the simulated controller")
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(serial) = cli.serial {
        settings.nanodrive.serial = serial;
    }
    logging::init(&settings.application).context("Failed to initialize logging")?;

    let device = open_device(cli.simulate, settings.nanodrive.serial)?;
    let mut stage = NanoDrive::from_config(device, &settings.nanodrive)
        .with_context(|| format!("Failed to open Nano Drive {}", settings.nanodrive.serial))?;
    info!(serial = stage.serial(), simulate = cli.simulate, "Nano Drive ready");

    run(cli.command, &mut stage, &settings, cli.simulate)?;
    stage.close().context("Failed to release the Nano Drive")?;
    Ok(())
}

fn run(
    command: Command,
    stage: &mut NanoDrive<Box<dyn Madlib>>,
    settings: &Settings,
    simulate: bool,
) -> Result<()> {
    match command {
        Command::Info => {
            stage.device_info();
            let mut axes = serde_json::Map::new();
            for axis in AxisId::MULTI_AXIS {
                axes.insert(
                    axis.to_string(),
                    json!({
                        "range_um": stage.axis_range(axis)?,
                        "position_um": stage.position(axis)?,
                    }),
                );
            }
            print_json(&json!({
                "serial": stage.serial(),
                "attached": stage.is_attached(),
                "axes": axes,
                "settings": stage.settings(),
                "clocks": stage.clock_settings(),
            }))
        }

        Command::Move {
            axis,
            position,
            settle,
        } => {
            let reading = if settle {
                stage.move_and_settle(axis, position)?
            } else {
                stage.move_to(axis, position)?;
                stage.position(axis)?
            };
            print_json(&json!({ "axis": axis, "target_um": position, "position_um": reading }))
        }

        Command::Read { axis, points, rate } => {
            let trace = stage.read_waveform(axis, points, ReadRate::from_ms(rate)?)?;
            print_json(&json!({ "axis": axis, "read": trace }))
        }

        Command::Acquire {
            axis,
            rate,
            read_rate,
            file,
            ramp,
        } => {
            let waveform = match (file, ramp) {
                (Some(path), _) => read_waveform_file(&path)?,
                (None, Some(ramp)) => ramp.to_vec(),
                (None, None) => bail!("acquire needs --file or --ramp"),
            };
            stage.setup_read(axis, waveform.len(), ReadRate::from_ms(read_rate)?)?;
            stage.setup_load(axis, &waveform, LoadRate::from_ms(rate)?)?;
            let trace = stage.acquire(axis)?;
            print_json(&json!({ "axis": axis, "loaded": waveform, "read": trace }))
        }

        Command::Multi {
            x_file,
            y_file,
            z_file,
            time_step,
            iterations,
        } => {
            let mut waveforms = Vec::new();
            for (axis, path) in [(AxisId::X, x_file), (AxisId::Y, y_file), (AxisId::Z, z_file)] {
                if let Some(path) = path {
                    waveforms.push((axis, read_waveform_file(&path)?));
                }
            }
            let Some(num_points) = waveforms.first().map(|(_, wf)| wf.len()) else {
                bail!("multi needs at least one of --x-file, --y-file, --z-file");
            };

            let mut job = MultiAxisJob::new(num_points, TimeStep::from_ms(time_step)?, iterations);
            for (axis, waveform) in &waveforms {
                job = job.with_waveform(*axis, waveform)?;
            }
            stage.setup_multi_axis(&job)?;
            stage.trigger_multi_axis()?;
            let (x, y, z) = stage.read_multi_axis()?;
            print_json(&json!({ "x": x, "y": y, "z": z }))
        }

        Command::Clock(clock) => {
            match clock {
                ClockCommand::Mode { clock, mode } => stage.set_clock_mode(clock, mode.into())?,
                ClockCommand::Polarity { clock, polarity } => {
                    stage.set_clock_polarity(clock, polarity.into())?
                }
                ClockCommand::Bind {
                    clock,
                    target,
                    polarity,
                } => stage.bind_clock(clock, polarity.into(), target)?,
                ClockCommand::Reset => stage.reset_clocks()?,
                ClockCommand::Pulse { clock } => stage.pulse_clock(clock)?,
            }
            print_json(stage.clock_settings())
        }

        Command::Scan { output } => {
            if !simulate {
                bail!("no photon counter driver is available; run the scan with --simulate");
            }
            let scan = ConfocalScan::from_config(&settings.scan)?;
            let mut counter = SimulatedCounter::new(250, 25, 0);
            let data = scan.run_with_progress(stage, &mut counter, |p| {
                info!(
                    line = p.lines_done,
                    of = p.total_lines,
                    percent = p.percent(),
                    "scan progress"
                );
            })?;

            match output {
                Some(path) => {
                    let text = serde_json::to_string_pretty(&data)?;
                    fs::write(&path, text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    print_json(&json!({ "output": path, "pixels": data.count_rate.len() }))
                }
                None => print_json(&data),
            }
        }
    }
}
