//! EEPROM emulation backend for the configuration store
//!
//! This crate provides the concrete implementation of the shared
//! `strata-hal` storage traits:
//!
//! - Key/value map over any multi-write NOR flash partition, built on
//!   `sequential-storage` (implements `strata_hal::ConfigBackend`)
//! - In-memory flash device for host builds and tests ([`ram`])

#![no_std]
#![deny(unsafe_code)]

#[macro_use]
extern crate strata_hal;

pub mod map;
pub mod ram;

pub use map::{EepromMap, Partition, DEFAULT_PARTITION_BASE, DEFAULT_PARTITION_SIZE, MAX_PAYLOAD};
pub use ram::RamFlash;

// Re-export shared traits from strata-hal for convenience
pub use strata_hal::{
    ConfigBackend, EepromError, LoadSummary, RecordKey, RecordStatus, RecordVisitor,
};
