//! Menu screen logic for the printer firmware
//!
//! Screens here are plain state: they react to printer status ticks and
//! user activation, and leave drawing to the display task.

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
extern crate strata_hal;

pub mod printer;
pub mod tune;

pub use printer::{MarlinCommand, PrintState, PrinterStatus};
pub use tune::{Activation, TuneEntry, TuneItem, TuneMenu, TUNE_LABEL};
