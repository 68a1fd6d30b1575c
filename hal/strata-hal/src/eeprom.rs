//! Persistent configuration storage abstractions
//!
//! Provides the traits a storage backend implements so the configuration
//! store can load and persist items by key.

use crate::crc::key_hash;

/// Errors from configuration storage operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EepromError {
    /// Underlying device read or write failed
    Storage,
    /// Record can never fit in the storage partition
    RecordTooLarge,
    /// No room for the record even after reclaiming stale copies
    ///
    /// The write did not happen; everything stored before is intact.
    Full,
    /// Stored structure is inconsistent and needs a [`ConfigBackend::reset`]
    Corrupted,
    /// Backend used before `init`
    NotInitialized,
    /// Partition does not fit on the device
    OutOfBounds,
}

/// Outcome of handing one persisted record to a [`RecordVisitor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordStatus {
    /// Record matched an item and its value was loaded
    Applied,
    /// No item uses this key; record is left alone
    Unknown,
    /// Record matched an item but could not be decoded
    ///
    /// The backend invalidates the record so it is not replayed.
    Invalid,
}

impl RecordStatus {
    /// Whether the record can stay in storage as is
    pub const fn is_acceptable(self) -> bool {
        matches!(self, RecordStatus::Applied | RecordStatus::Unknown)
    }
}

/// Statistics gathered while loading persisted records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoadSummary {
    /// Records handed to the visitor
    pub records: u16,
    /// Records the visitor applied
    pub applied: u16,
    /// Records with a key no item uses
    pub unknown: u16,
    /// Records the visitor rejected
    pub invalid: u16,
    /// Storage was unreadable and has been erased
    pub formatted: bool,
}

impl LoadSummary {
    /// Count one visited record
    pub fn record(&mut self, status: RecordStatus) {
        self.records = self.records.saturating_add(1);
        match status {
            RecordStatus::Applied => self.applied = self.applied.saturating_add(1),
            RecordStatus::Unknown => self.unknown = self.unknown.saturating_add(1),
            RecordStatus::Invalid => self.invalid = self.invalid.saturating_add(1),
        }
    }
}

/// Storage key of a persisted record
///
/// Items are addressed by the CRC32 of their key string rather than the
/// string itself, so every key costs the same four bytes on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordKey(pub u32);

impl RecordKey {
    /// Key for an item name
    pub fn of(key: &str) -> Self {
        Self(key_hash(key))
    }

    /// Hash value handed to [`RecordVisitor::visit`]
    pub const fn hash(self) -> u32 {
        self.0
    }

    /// Size of a serialized key
    pub const SIZE: usize = 4;
}

// Implement the sequential-storage Key trait when the feature is enabled
#[cfg(feature = "sequential-storage")]
impl sequential_storage::map::Key for RecordKey {
    fn serialize_into(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, sequential_storage::map::SerializationError> {
        if buffer.len() < Self::SIZE {
            return Err(sequential_storage::map::SerializationError::BufferTooSmall);
        }
        buffer[..Self::SIZE].copy_from_slice(&self.0.to_le_bytes());
        Ok(Self::SIZE)
    }

    fn deserialize_from(
        buffer: &[u8],
    ) -> Result<(Self, usize), sequential_storage::map::SerializationError> {
        match buffer.get(..Self::SIZE) {
            Some(&[a, b, c, d]) => Ok((RecordKey(u32::from_le_bytes([a, b, c, d])), Self::SIZE)),
            _ => Err(sequential_storage::map::SerializationError::BufferTooSmall),
        }
    }
}

/// Receives each persisted record found while a backend loads
///
/// `key_hash` is the CRC32 of the item key (see [`crate::key_hash`]) and
/// `data` is the raw value bytes with the record framing removed.
pub trait RecordVisitor {
    /// Inspect one record and report what happened to it
    fn visit(&mut self, key_hash: u32, data: &[u8]) -> RecordStatus;
}

impl<F> RecordVisitor for F
where
    F: FnMut(u32, &[u8]) -> RecordStatus,
{
    fn visit(&mut self, key_hash: u32, data: &[u8]) -> RecordStatus {
        self(key_hash, data)
    }
}

/// Keyed persistent storage for configuration items
///
/// Implementations should handle:
/// - Data integrity (CRC per record)
/// - Replacing older values for the same key
/// - Torn writes (a half-written record must never be loaded)
/// - Reclaiming space without a window where a key has no stored copy
pub trait ConfigBackend {
    /// Load all persisted records, feeding each to `visitor`
    ///
    /// Records may be visited more than once per key, oldest first. Erases
    /// the storage if its structure cannot be read.
    fn init(&mut self, visitor: &mut dyn RecordVisitor) -> Result<LoadSummary, EepromError>;

    /// Persist `data` under `key`
    ///
    /// On error the previously stored value for `key` stays in place.
    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), EepromError>;

    /// Invalidate everything stored
    fn reset(&mut self) -> Result<(), EepromError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acceptable_statuses() {
        assert!(RecordStatus::Applied.is_acceptable());
        assert!(RecordStatus::Unknown.is_acceptable());
        assert!(!RecordStatus::Invalid.is_acceptable());
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = LoadSummary::default();
        summary.record(RecordStatus::Applied);
        summary.record(RecordStatus::Applied);
        summary.record(RecordStatus::Unknown);
        summary.record(RecordStatus::Invalid);

        assert_eq!(summary.records, 4);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.invalid, 1);
        assert!(!summary.formatted);
    }

    #[test]
    fn test_record_key_matches_hash() {
        let key = RecordKey::of("sound_volume");
        assert_eq!(key.hash(), key_hash("sound_volume"));
        assert_ne!(key, RecordKey::of("sound_mode"));
    }

    #[test]
    fn test_closure_visitor() {
        let mut seen = 0u32;
        let mut visitor = |hash: u32, data: &[u8]| {
            seen = hash + data.len() as u32;
            RecordStatus::Unknown
        };
        let status = RecordVisitor::visit(&mut visitor, 10, &[1, 2, 3]);
        assert_eq!(status, RecordStatus::Unknown);
        assert_eq!(seen, 13);
    }
}
