//! Boot-time record loading
//!
//! The backend hands every persisted record to an [`ItemUpdater`], which
//! finds the item by key hash and initializes its cached value.

use strata_hal::{RecordStatus, RecordVisitor};

use super::item::StoreItem;
use super::structure::ConfigItems;

/// Populates items from persisted records
pub struct ItemUpdater<'a> {
    items: [&'a dyn StoreItem; ConfigItems::COUNT],
}

impl<'a> ItemUpdater<'a> {
    /// Create an updater for an item table
    pub fn new(items: &'a ConfigItems) -> Self {
        Self {
            items: items.as_array(),
        }
    }

    fn find(&self, key_hash: u32) -> Option<&'a dyn StoreItem> {
        self.items
            .iter()
            .copied()
            .find(|item| item.key_hash() == key_hash)
    }
}

impl RecordVisitor for ItemUpdater<'_> {
    /// Returns [`RecordStatus::Applied`] for a valid record and
    /// [`RecordStatus::Unknown`] for a key no item uses, which is safe to
    /// ignore. [`RecordStatus::Invalid`] resets the item to its default.
    fn visit(&mut self, key_hash: u32, data: &[u8]) -> RecordStatus {
        let Some(item) = self.find(key_hash) else {
            trace!("No item for record {:x}, ignoring", key_hash);
            return RecordStatus::Unknown;
        };

        if item.load(data) {
            RecordStatus::Applied
        } else {
            warn!("Stored value of {} is invalid, using default", item.key());
            item.set_to_default();
            RecordStatus::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_hal::key_hash;

    #[test]
    fn test_applies_known_record() {
        let items = ConfigItems::new();
        let mut updater = ItemUpdater::new(&items);

        let status = updater.visit(key_hash("sound_volume"), &[9]);
        assert_eq!(status, RecordStatus::Applied);
        assert_eq!(items.sound_volume.get(), 9);
    }

    #[test]
    fn test_unknown_record_ignored() {
        let items = ConfigItems::new();
        let mut updater = ItemUpdater::new(&items);

        let status = updater.visit(key_hash("removed_item"), &[1]);
        assert_eq!(status, RecordStatus::Unknown);
        assert!(items.as_array().iter().all(|item| item.is_default()));
    }

    #[test]
    fn test_invalid_record_restores_default() {
        let items = ConfigItems::new();
        let mut updater = ItemUpdater::new(&items);

        assert_eq!(
            updater.visit(key_hash("sound_volume"), &[7]),
            RecordStatus::Applied
        );
        // A later record for the same key whose type changed
        assert_eq!(
            updater.visit(key_hash("sound_volume"), &[7, 7]),
            RecordStatus::Invalid
        );
        assert_eq!(items.sound_volume.get(), 5);
    }

    #[test]
    fn test_later_record_wins() {
        let items = ConfigItems::new();
        let mut updater = ItemUpdater::new(&items);

        updater.visit(key_hash("timezone"), &[2]);
        updater.visit(key_hash("timezone"), &[4]);
        assert_eq!(items.timezone.get(), 4);
    }
}
