//! Experiments sequencing the stage with other instruments.
//!
//! - [`confocal_scan`]: line-by-line confocal imaging with a gated photon counter
//!
//! # Example
//!
//! ```
//! use confocal_daq::config::{ScanConfig, ScanPoint};
//! use confocal_daq::experiment::{ConfocalScan, SimulatedCounter};
//! use confocal_daq::hardware::MockMadlib;
//! use confocal_daq::nanodrive::NanoDrive;
//!
//! # fn main() -> confocal_daq::error::AppResult<()> {
//! let config = ScanConfig {
//!     point_a: ScanPoint { x: 0.0, y: 0.0 },
//!     point_b: ScanPoint { x: 1.0, y: 1.0 },
//!     resolution_um: 0.5,
//!     ..ScanConfig::default()
//! };
//! let scan = ConfocalScan::from_config(&config)?;
//! let mut stage = NanoDrive::open(MockMadlib::new(), 2850)?;
//! let mut counter = SimulatedCounter::new(50, 5, 1);
//!
//! let data = scan.run(&mut stage, &mut counter)?;
//! assert_eq!(data.image().len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod confocal_scan;

pub use confocal_scan::{
    ConfocalScan, PhotonCounter, ScanData, ScanProgress, SimulatedCounter, MAX_SCAN_LINES,
};
