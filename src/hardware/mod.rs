//! Device command layer.
//!
//! - [`Madlib`]: one method per vendor entry point
//! - [`MockMadlib`]: simulated controller for tests and `--simulate` runs
//! - `VendorMadlib`: the real library (feature `madlib`)

pub mod madlib;
#[cfg(feature = "madlib")]
pub mod madlib_ffi;
pub mod mock;

pub use madlib::{Madlib, WfmaCommits};
#[cfg(feature = "madlib")]
pub use madlib_ffi::VendorMadlib;
pub use mock::MockMadlib;
