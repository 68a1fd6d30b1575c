//! Tune menu
//!
//! Settings reachable while a print is running. The filament change entry
//! is only offered while the printer can actually accept an M600.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use strata_core::{ConfigItem, ConfigStore, SOUND_MODE_COUNT};
use strata_hal::ConfigBackend;

use crate::printer::PrinterStatus;

/// Menu title
pub const TUNE_LABEL: &str = "TUNE";

/// Upper bound on tune menu entries across all feature sets
pub const MAX_TUNE_ENTRIES: usize = 24;

/// Entries the tune menu can show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TuneItem {
    Return,
    LiveAdjustZ,
    /// M600
    FilamentChange,
    Speed,
    Nozzle,
    Heatbed,
    PrintFan,
    FlowFactor,
    FilamentSensor,
    SoundMode,
    SoundVolume,
    FanCheck,
    CrashDetection,
    CrashSensitivityX,
    CrashMaxPeriodX,
    CrashSensitivityY,
    CrashMaxPeriodY,
    CrashFiltering,
    Network,
    Timezone,
    VersionInfo,
    Test,
    Messages,
}

impl TuneItem {
    /// Text shown in the menu row
    pub fn label(&self) -> &'static str {
        match self {
            TuneItem::Return => "Return",
            TuneItem::LiveAdjustZ => "Live Adjust Z",
            TuneItem::FilamentChange => "Change Filament",
            TuneItem::Speed => "Speed",
            TuneItem::Nozzle => "Nozzle",
            TuneItem::Heatbed => "Heatbed",
            TuneItem::PrintFan => "Print Fan",
            TuneItem::FlowFactor => "Flow Factor",
            TuneItem::FilamentSensor => "Filament Sensor",
            TuneItem::SoundMode => "Sound Mode",
            TuneItem::SoundVolume => "Sound Volume",
            TuneItem::FanCheck => "Fan Check",
            TuneItem::CrashDetection => "Crash Detection",
            TuneItem::CrashSensitivityX => "Crash Sensitivity X",
            TuneItem::CrashMaxPeriodX => "Crash Max Period X",
            TuneItem::CrashSensitivityY => "Crash Sensitivity Y",
            TuneItem::CrashMaxPeriodY => "Crash Max Period Y",
            TuneItem::CrashFiltering => "Crash Filtering",
            TuneItem::Network => "Network",
            TuneItem::Timezone => "Time Zone Offset",
            TuneItem::VersionInfo => "Version Info",
            TuneItem::Test => "Test",
            TuneItem::Messages => "Messages",
        }
    }
}

/// Entries in display order for the enabled feature set
const TUNE_ITEMS: &[TuneItem] = &[
    TuneItem::Return,
    TuneItem::LiveAdjustZ,
    TuneItem::FilamentChange,
    TuneItem::Speed,
    TuneItem::Nozzle,
    TuneItem::Heatbed,
    TuneItem::PrintFan,
    TuneItem::FlowFactor,
    TuneItem::FilamentSensor,
    TuneItem::SoundMode,
    TuneItem::SoundVolume,
    TuneItem::FanCheck,
    #[cfg(feature = "crash-recovery")]
    TuneItem::CrashDetection,
    #[cfg(feature = "crash-recovery")]
    TuneItem::CrashSensitivityX,
    #[cfg(feature = "crash-recovery")]
    TuneItem::CrashMaxPeriodX,
    #[cfg(feature = "crash-recovery")]
    TuneItem::CrashSensitivityY,
    #[cfg(feature = "crash-recovery")]
    TuneItem::CrashMaxPeriodY,
    #[cfg(feature = "tmc2130")]
    TuneItem::CrashFiltering,
    TuneItem::Network,
    TuneItem::Timezone,
    TuneItem::VersionInfo,
    #[cfg(feature = "debug-menu")]
    TuneItem::Test,
    TuneItem::Messages,
];

const _: () = assert!(TUNE_ITEMS.len() <= MAX_TUNE_ENTRIES);

/// One row of the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TuneEntry {
    pub item: TuneItem,
    pub enabled: bool,
}

/// What activating an entry did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activation {
    /// A bool setting was flipped to this value
    Toggled(bool),
    /// The sound mode moved to this value
    Cycled(u8),
    /// Entry is disabled, missing, or not bound to a setting
    Ignored,
}

/// Tune menu screen state
pub struct TuneMenu {
    entries: Vec<TuneEntry, MAX_TUNE_ENTRIES>,
    closes_on_timeout: bool,
}

impl TuneMenu {
    /// Build the menu with every entry enabled
    ///
    /// The tune menu stays open until the user leaves it.
    pub fn new() -> Self {
        let entries = TUNE_ITEMS
            .iter()
            .map(|&item| TuneEntry {
                item,
                enabled: true,
            })
            .collect();
        Self {
            entries,
            closes_on_timeout: false,
        }
    }

    /// Menu title
    pub fn label(&self) -> &'static str {
        TUNE_LABEL
    }

    /// Whether the menu closes itself after inactivity
    pub fn closes_on_timeout(&self) -> bool {
        self.closes_on_timeout
    }

    /// Rows in display order
    pub fn entries(&self) -> &[TuneEntry] {
        &self.entries
    }

    /// Whether `item` is present and enabled
    pub fn is_enabled(&self, item: TuneItem) -> bool {
        self.entry(item).is_some_and(|entry| entry.enabled)
    }

    /// Handle one UI loop tick
    ///
    /// Returns whether the enabled state of any entry changed.
    pub fn on_loop(&mut self, status: &PrinterStatus) -> bool {
        let allowed = status.can_change_filament();
        let changed = self.set_enabled(TuneItem::FilamentChange, allowed);
        if changed {
            debug!("Filament change {}", if allowed { "enabled" } else { "disabled" });
        }
        changed
    }

    /// Activate an entry bound to a configuration item
    pub fn activate<M: RawMutex, B: ConfigBackend>(
        &self,
        item: TuneItem,
        store: &ConfigStore<M, B>,
    ) -> Activation {
        if !self.is_enabled(item) {
            return Activation::Ignored;
        }

        let items = store.items();
        match item {
            TuneItem::FilamentSensor => toggle(store, &items.fs_enabled),
            TuneItem::FanCheck => toggle(store, &items.fan_check_enabled),
            TuneItem::CrashDetection => toggle(store, &items.crash_enabled),
            TuneItem::CrashFiltering => toggle(store, &items.crash_filter),
            TuneItem::SoundMode => {
                let mode = store.update(&items.sound_mode, |mode| {
                    (mode % SOUND_MODE_COUNT + 1) % SOUND_MODE_COUNT
                });
                Activation::Cycled(mode)
            }
            _ => Activation::Ignored,
        }
    }

    fn entry(&self, item: TuneItem) -> Option<&TuneEntry> {
        self.entries.iter().find(|entry| entry.item == item)
    }

    fn set_enabled(&mut self, item: TuneItem, enabled: bool) -> bool {
        match self.entries.iter_mut().find(|entry| entry.item == item) {
            Some(entry) if entry.enabled != enabled => {
                entry.enabled = enabled;
                true
            }
            _ => false,
        }
    }
}

impl Default for TuneMenu {
    fn default() -> Self {
        Self::new()
    }
}

fn toggle<M: RawMutex, B: ConfigBackend>(
    store: &ConfigStore<M, B>,
    item: &ConfigItem<bool>,
) -> Activation {
    Activation::Toggled(store.update(item, |on| !on))
}
