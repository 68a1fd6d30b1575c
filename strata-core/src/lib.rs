//! Board-agnostic configuration store for the printer firmware
//!
//! This crate holds everything about persistent settings that does not
//! depend on a particular storage device:
//!
//! - Typed configuration items with cached values
//! - The item table with keys and defaults
//! - Loading persisted records at boot
//! - Write-through persistence, factory reset and dump to another backend
//!
//! Storage devices plug in through [`strata_hal::ConfigBackend`].

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

#[macro_use]
extern crate strata_hal;

pub mod store;

pub use store::structure::{
    HOSTNAME_LEN, LANGUAGE_UNSET, SOUND_MODE_ASSIST, SOUND_MODE_COUNT, SOUND_MODE_LOUD,
    SOUND_MODE_ONCE, SOUND_MODE_SILENT,
};
pub use store::{
    CharArray, ConfigItem, ConfigItems, ConfigStore, DumpReport, EncodeError, ItemUpdater,
    ItemValue, StoreItem, MAX_ITEM_SIZE,
};
