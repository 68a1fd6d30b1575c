//! Persistent configuration store
//!
//! [`ConfigStore`] owns the item table and the storage backend. Items are
//! read straight from their cached values; every write goes through the
//! store, which serializes it with backend I/O under the store lock.
//!
//! The store lock is any [`RawMutex`]. Item caches sit behind their own
//! short critical sections, so a slow backend write never holds up readers
//! as long as the store lock is not itself a critical section. Pick
//! `NoopRawMutex` when one task owns the store, `ThreadModeRawMutex` when
//! tasks share it on one core.
//!
//! ```text
//!  ConfigStore::set ──► ConfigItem cache ──► encode ──► ConfigBackend::set
//!                                                            │ error
//!                                                            ▼
//!                                               re-dump non-default items
//! ```

pub mod item;
pub mod structure;
pub mod updater;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use strata_hal::{ConfigBackend, EepromError, LoadSummary};

pub use item::{CharArray, ConfigItem, EncodeError, ItemValue, StoreItem, MAX_ITEM_SIZE};
pub use structure::ConfigItems;
pub use updater::ItemUpdater;

/// Result of writing items into a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DumpReport {
    /// Items persisted
    pub written: u16,
    /// Items left out because they hold their default
    pub skipped: u16,
    /// Items the backend refused, or that were not tried once it was full
    pub failed: u16,
}

/// Configuration items plus the backend that persists them
///
/// `M` guards the backend and orders writes; it is never held while only
/// reading an item.
pub struct ConfigStore<M: RawMutex, B: ConfigBackend> {
    items: ConfigItems,
    backend: Mutex<M, RefCell<B>>,
}

impl<M: RawMutex, B: ConfigBackend> ConfigStore<M, B> {
    /// Create a store with every item at its default
    ///
    /// Nothing is loaded until [`ConfigStore::init`] is called.
    pub const fn new(backend: B) -> Self {
        Self {
            items: ConfigItems::new(),
            backend: Mutex::new(RefCell::new(backend)),
        }
    }

    /// The item table
    pub fn items(&self) -> &ConfigItems {
        &self.items
    }

    /// Load persisted values into the items
    ///
    /// On error, or if the backend had to erase unreadable storage, every
    /// item is left at its default.
    pub fn init(&self) -> Result<LoadSummary, EepromError> {
        self.backend.lock(|backend| {
            let mut updater = ItemUpdater::new(&self.items);
            let result = backend.borrow_mut().init(&mut updater);
            match result {
                Ok(summary) if summary.formatted => {
                    warn!("Stored config was unreadable, using defaults");
                    self.reset_items();
                }
                Ok(summary) => info!(
                    "Config loaded: {} applied, {} unknown, {} invalid",
                    summary.applied, summary.unknown, summary.invalid
                ),
                Err(e) => {
                    error!("Config load failed: {}", e);
                    self.reset_items();
                }
            }
            result
        })
    }

    fn reset_items(&self) {
        for item in self.items.as_array() {
            item.set_to_default();
        }
    }

    /// Set an item and persist it if the value changed
    ///
    /// Returns whether the value changed.
    pub fn set<T: ItemValue>(&self, item: &ConfigItem<T>, value: T) -> bool {
        self.backend.lock(|backend| {
            if !item.replace(value) {
                return false;
            }
            self.persist(&mut *backend.borrow_mut(), item);
            true
        })
    }

    /// Read-modify-write an item under the store lock
    ///
    /// `f` must not call back into the store. Returns the new value.
    pub fn update<T: ItemValue>(&self, item: &ConfigItem<T>, f: impl FnOnce(T) -> T) -> T {
        self.backend.lock(|backend| {
            let value = f(item.get());
            if item.replace(value) {
                self.persist(&mut *backend.borrow_mut(), item);
            }
            value
        })
    }

    /// Set a char-array item from a string
    ///
    /// Copies at most `N` bytes. Only the content up to the first NUL is
    /// compared, so repeating the same string does not write again.
    pub fn set_str<const N: usize>(&self, item: &ConfigItem<CharArray<N>>, value: &str) -> bool {
        let value = CharArray::new(value);
        self.backend.lock(|backend| {
            if item.get().same_value(&value) {
                return false;
            }
            item.init(value);
            self.persist(&mut *backend.borrow_mut(), item);
            true
        })
    }

    /// Restore every item to its default and wipe persisted data
    pub fn factory_reset(&self) {
        self.backend.lock(|backend| {
            self.reset_items();
            match backend.borrow_mut().reset() {
                Ok(()) => info!("Config reset to factory defaults"),
                Err(e) => error!("Clearing stored config failed: {}", e),
            }
        })
    }

    /// Write items into another backend
    ///
    /// Items at their default are skipped unless `save_defaults` is set.
    /// The store's own backend is not touched.
    pub fn dump_data(&self, target: &mut dyn ConfigBackend, save_defaults: bool) -> DumpReport {
        self.backend.lock(|_| {
            let report = dump_items(&self.items, target, save_defaults);
            info!(
                "Config dump: {} written, {} skipped, {} failed",
                report.written, report.skipped, report.failed
            );
            report
        })
    }

    /// Run `f` with exclusive access to the backend
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        self.backend.lock(|backend| f(&mut *backend.borrow_mut()))
    }

    /// Consume the store and return its backend
    pub fn into_backend(self) -> B {
        self.backend.into_inner().into_inner()
    }

    /// Write one item, falling back to a full re-dump if the backend fails
    fn persist(&self, backend: &mut B, item: &dyn StoreItem) {
        let Err(e) = item.dump_data(backend, true) else {
            return;
        };

        warn!("Storing {} failed: {}, re-dumping config", item.key(), e);
        let report = dump_items(&self.items, backend, false);
        if report.failed > 0 {
            error!("{} items could not be re-dumped", report.failed);
        } else {
            debug!("Re-dumped {} items", report.written);
        }
    }
}

/// Write items in table order, stopping at the first `Full`
fn dump_items(
    items: &ConfigItems,
    backend: &mut dyn ConfigBackend,
    save_defaults: bool,
) -> DumpReport {
    let mut report = DumpReport::default();
    let mut full = false;

    for item in items.as_array() {
        if full {
            if !save_defaults && item.is_default() {
                report.skipped += 1;
            } else {
                report.failed += 1;
            }
            continue;
        }
        match item.dump_data(backend, save_defaults) {
            Ok(true) => report.written += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!("Dumping {} failed: {}", item.key(), e);
                report.failed += 1;
                full = e == EepromError::Full;
            }
        }
    }

    report
}
