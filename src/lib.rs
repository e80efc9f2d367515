//! Core library for the confocal_daq application.
//!
//! This library drives Mad City Labs NanoDrive piezo stages through their
//! waveform protocol (setup, trigger, read for single and multi-axis
//! waveforms) and sequences confocal scans on top of it. It is used by the
//! `confocal_daq` command line tool.
//!
//! - [`nanodrive`]: the stage subsystem and its protocol state machines
//! - [`hardware`]: the vendor command layer, real and simulated
//! - [`experiment`]: scans built from stage and counter calls
//! - [`config`], [`logging`], [`error`]: ambient plumbing

pub mod config;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod nanodrive;

pub use error::{AppResult, DaqError};
