//! Strata Hardware Abstraction Layer
//!
//! This crate defines the storage abstraction that the configuration store
//! persists through. Concrete backends (EEPROM emulation on NOR flash,
//! etc.) implement [`ConfigBackend`] so the store never touches raw bytes
//! on the device itself.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  strata-core (ConfigStore, items)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  strata-hal (this crate - traits)       │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!             ┌───────────────┐
//!             │ strata-hal-   │
//!             │    eeprom     │
//!             └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`eeprom::ConfigBackend`] - Keyed persistent record storage
//! - [`eeprom::RecordVisitor`] - Receives persisted records during load

#![no_std]
#![deny(unsafe_code)]

mod fmt;

pub mod crc;
pub mod eeprom;

// Re-export key items at crate root for convenience
pub use crc::{crc32, key_hash};
pub use eeprom::{
    ConfigBackend, EepromError, LoadSummary, RecordKey, RecordStatus, RecordVisitor,
};
