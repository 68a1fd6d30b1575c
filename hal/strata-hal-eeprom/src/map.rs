//! Key/value map backend
//!
//! Emulates an EEPROM on a NOR flash partition using the
//! `sequential-storage` map. Each item is stored under its [`RecordKey`];
//! newer values shadow older ones, and full pages are reclaimed by moving
//! live items forward before the old page is erased, so every key keeps a
//! stored copy through garbage collection.
//!
//! Implements the `ConfigBackend` trait from `strata-hal`. The map is async;
//! this backend drives it to completion with `embassy_futures::block_on`,
//! which is fine for flash that completes operations without waking.

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::MultiwriteNorFlash;
use heapless::Vec;
use sequential_storage::cache::NoCache;
use sequential_storage::map;
use strata_hal::{
    ConfigBackend, EepromError, LoadSummary, RecordKey, RecordStatus, RecordVisitor,
};

/// Default partition start on the device
pub const DEFAULT_PARTITION_BASE: u32 = 0;

/// Default partition size (4KB)
pub const DEFAULT_PARTITION_SIZE: u32 = 4 * 1024;

/// Largest value a single record can carry
pub const MAX_PAYLOAD: usize = 128;

/// Scratch buffer for one serialized item (key, value and alignment)
const BUFFER_SIZE: usize = RecordKey::SIZE + MAX_PAYLOAD + 32;

/// Rejected keys removed after a single load
const MAX_REJECTED: usize = 32;

/// Location of the map on the flash device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Partition {
    /// First byte of the partition
    pub base: u32,
    /// Partition size in bytes
    pub size: u32,
}

impl Default for Partition {
    fn default() -> Self {
        Self {
            base: DEFAULT_PARTITION_BASE,
            size: DEFAULT_PARTITION_SIZE,
        }
    }
}

impl Partition {
    /// Describe a partition
    ///
    /// Returns `None` for an empty partition or one that would wrap the
    /// address space. Page alignment is checked against the device in
    /// [`EepromMap::new`].
    pub const fn new(base: u32, size: u32) -> Option<Self> {
        if size == 0 || base.checked_add(size).is_none() {
            return None;
        }
        Some(Self { base, size })
    }

    /// One past the last byte of the partition
    pub const fn end(&self) -> u32 {
        self.base + self.size
    }

    /// Byte range handed to the map
    pub const fn range(&self) -> Range<u32> {
        self.base..self.end()
    }
}

fn map_error<E>(error: sequential_storage::Error<E>) -> EepromError {
    match error {
        sequential_storage::Error::FullStorage { .. } => EepromError::Full,
        sequential_storage::Error::Corrupted { .. } => EepromError::Corrupted,
        sequential_storage::Error::ItemTooBig { .. }
        | sequential_storage::Error::BufferTooSmall { .. } => EepromError::RecordTooLarge,
        _ => EepromError::Storage,
    }
}

/// EEPROM emulation on a flash partition
///
/// Call [`ConfigBackend::init`] once before writing.
pub struct EepromMap<S> {
    flash: S,
    partition: Partition,
    initialized: bool,
}

impl<S: MultiwriteNorFlash> EepromMap<S> {
    /// Create a map on `flash`
    ///
    /// The partition must lie on the device, start and end on erase-page
    /// boundaries and span at least two pages.
    pub fn new(flash: S, partition: Partition) -> Result<Self, EepromError> {
        if partition.end() as usize > flash.capacity() {
            return Err(EepromError::OutOfBounds);
        }
        let page = S::ERASE_SIZE as u32;
        if partition.base % page != 0 || partition.size % page != 0 || partition.size / page < 2 {
            return Err(EepromError::OutOfBounds);
        }
        Ok(Self {
            flash,
            partition,
            initialized: false,
        })
    }

    /// Partition this map lives in
    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Borrow the underlying device
    pub fn flash(&self) -> &S {
        &self.flash
    }

    /// Mutably borrow the underlying device
    pub fn flash_mut(&mut self) -> &mut S {
        &mut self.flash
    }

    /// Consume the map and return the underlying device
    pub fn into_flash(self) -> S {
        self.flash
    }

    /// Erase the whole partition
    fn erase(&mut self) -> Result<(), EepromError> {
        info!(
            "Erasing config partition at {} ({} bytes)",
            self.partition.base, self.partition.size
        );
        let range = self.partition.range();
        block_on(self.flash.erase(range.start, range.end)).map_err(|_| {
            error!("Config partition erase failed");
            EepromError::Storage
        })
    }

    fn remove(&mut self, key: RecordKey) -> Result<(), EepromError> {
        let range = self.partition.range();
        let flash = &mut self.flash;
        block_on(async move {
            let mut buffer = [0u8; BUFFER_SIZE];
            map::remove_item(flash, range, &mut NoCache::new(), &mut buffer, &key).await
        })
        .map_err(map_error)
    }

    /// Feed every stored item to `visitor`, collecting keys it rejected
    fn scan(
        &mut self,
        visitor: &mut dyn RecordVisitor,
        summary: &mut LoadSummary,
        rejected: &mut Vec<RecordKey, MAX_REJECTED>,
    ) -> Result<(), EepromError> {
        let range = self.partition.range();
        let flash = &mut self.flash;
        block_on(async move {
            let mut cache = NoCache::new();
            let mut scratch = [0u8; BUFFER_SIZE];
            let mut buffer = [0u8; BUFFER_SIZE];
            let mut items = map::fetch_all_items::<RecordKey, _, _>(flash, range, &mut cache, &mut scratch)
                .await
                .map_err(map_error)?;

            loop {
                let next: Option<(RecordKey, &[u8])> =
                    items.next(&mut buffer).await.map_err(map_error)?;
                let Some((key, data)) = next else {
                    break;
                };

                let status = visitor.visit(key.hash(), data);
                summary.record(status);

                // Only the newest copy decides whether the key is dropped
                if status == RecordStatus::Invalid {
                    if !rejected.contains(&key) && rejected.push(key).is_err() {
                        warn!("Too many rejected records, {:x} kept", key.hash());
                    }
                } else {
                    rejected.retain(|k| *k != key);
                }
            }
            Ok(())
        })
    }
}

impl<S: MultiwriteNorFlash> ConfigBackend for EepromMap<S> {
    fn init(&mut self, visitor: &mut dyn RecordVisitor) -> Result<LoadSummary, EepromError> {
        let mut summary = LoadSummary::default();
        let mut rejected = Vec::new();

        match self.scan(visitor, &mut summary, &mut rejected) {
            Ok(()) => {}
            Err(EepromError::Corrupted) => {
                warn!("Config partition unreadable, starting from defaults");
                self.erase()?;
                summary = LoadSummary {
                    formatted: true,
                    ..LoadSummary::default()
                };
                rejected.clear();
            }
            Err(e) => return Err(e),
        }

        for key in rejected {
            debug!("Record {:x} rejected, removing", key.hash());
            self.remove(key)?;
        }

        self.initialized = true;
        debug!(
            "Config map: {} records, {} applied",
            summary.records, summary.applied
        );
        Ok(summary)
    }

    fn set(&mut self, key: &str, data: &[u8]) -> Result<(), EepromError> {
        if !self.initialized {
            return Err(EepromError::NotInitialized);
        }
        if data.len() > MAX_PAYLOAD {
            warn!("Value for {} too large ({} bytes)", key, data.len());
            return Err(EepromError::RecordTooLarge);
        }

        let record = RecordKey::of(key);
        let range = self.partition.range();
        let flash = &mut self.flash;
        block_on(async move {
            let mut buffer = [0u8; BUFFER_SIZE];
            map::store_item(flash, range, &mut NoCache::new(), &mut buffer, &record, &data).await
        })
        .map_err(|e| {
            let e = map_error(e);
            warn!("Storing {} failed: {}", key, e);
            e
        })?;

        trace!("Stored {} ({} bytes)", key, data.len());
        Ok(())
    }

    fn reset(&mut self) -> Result<(), EepromError> {
        self.erase()?;
        self.initialized = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{RamFlash, PAGE_SIZE};
    use strata_hal::key_hash;

    type Seen = Vec<(u32, Vec<u8, MAX_PAYLOAD>), 64>;

    fn fresh_map<const N: usize>() -> EepromMap<RamFlash<N>> {
        EepromMap::new(RamFlash::new(), Partition::new(0, N as u32).unwrap()).unwrap()
    }

    fn reopen<const N: usize>(map: EepromMap<RamFlash<N>>) -> EepromMap<RamFlash<N>> {
        EepromMap::new(map.into_flash(), Partition::new(0, N as u32).unwrap()).unwrap()
    }

    fn collect<S: MultiwriteNorFlash>(
        map: &mut EepromMap<S>,
        answer: RecordStatus,
    ) -> (LoadSummary, Seen) {
        let mut seen = Seen::new();
        let mut visitor = |hash: u32, data: &[u8]| {
            seen.push((hash, Vec::from_slice(data).unwrap())).unwrap();
            answer
        };
        let summary = map.init(&mut visitor).unwrap();
        (summary, seen)
    }

    /// Value visited last for `key`, which is the one a loader keeps
    fn newest<'a>(seen: &'a Seen, key: &str) -> Option<&'a [u8]> {
        seen.iter()
            .rev()
            .find(|(hash, _)| *hash == key_hash(key))
            .map(|(_, data)| data.as_slice())
    }

    fn ignore(_: u32, _: &[u8]) -> RecordStatus {
        RecordStatus::Unknown
    }

    #[test]
    fn test_blank_device_loads_nothing() {
        let mut map = fresh_map::<1024>();
        let (summary, seen) = collect(&mut map, RecordStatus::Applied);

        assert!(!summary.formatted);
        assert_eq!(summary.records, 0);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_set_before_init_fails() {
        let mut map = fresh_map::<1024>();
        assert_eq!(map.set("a", &[1]), Err(EepromError::NotInitialized));
    }

    #[test]
    fn test_partition_must_fit_device() {
        let partition = Partition::new(512, 1024).unwrap();
        assert!(matches!(
            EepromMap::new(RamFlash::<1024>::new(), partition),
            Err(EepromError::OutOfBounds)
        ));
    }

    #[test]
    fn test_partition_must_cover_whole_pages() {
        let flash = || RamFlash::<1024>::new();
        let unaligned = Partition::new(4, 2 * PAGE_SIZE as u32).unwrap();
        assert!(EepromMap::new(flash(), unaligned).is_err());
        let single = Partition::new(0, PAGE_SIZE as u32).unwrap();
        assert!(EepromMap::new(flash(), single).is_err());
        let ragged = Partition::new(0, 2 * PAGE_SIZE as u32 + 4).unwrap();
        assert!(EepromMap::new(flash(), ragged).is_err());

        assert!(Partition::new(0, 0).is_none());
        assert!(Partition::new(u32::MAX - 4, 64).is_none());
    }

    #[test]
    fn test_partition_offset_on_device() {
        let partition = Partition::new(2 * PAGE_SIZE as u32, 2 * PAGE_SIZE as u32).unwrap();
        let mut map = EepromMap::new(RamFlash::<1024>::new(), partition).unwrap();
        map.init(&mut ignore).unwrap();
        map.set("x", &[1, 2, 3]).unwrap();

        let below = &map.flash().as_bytes()[..2 * PAGE_SIZE];
        assert!(below.iter().all(|&b| b == crate::ram::ERASED));
    }

    #[test]
    fn test_records_survive_reload() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("sound_volume", &[5]).unwrap();
        map.set("lan_hostname", b"prusa").unwrap();

        let mut map = reopen(map);
        let (summary, seen) = collect(&mut map, RecordStatus::Applied);

        assert!(!summary.formatted);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.applied, 2);
        assert_eq!(newest(&seen, "sound_volume"), Some(&[5][..]));
        assert_eq!(newest(&seen, "lan_hostname"), Some(&b"prusa"[..]));
    }

    #[test]
    fn test_newer_record_wins() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("x", &[1]).unwrap();
        map.set("x", &[2]).unwrap();

        let (_, seen) = collect(&mut map, RecordStatus::Applied);
        assert_eq!(newest(&seen, "x"), Some(&[2][..]));
    }

    #[test]
    fn test_invalid_record_not_replayed() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("x", &[1, 2, 3]).unwrap();
        map.set("y", &[4]).unwrap();

        let (summary, _) = collect(&mut map, RecordStatus::Invalid);
        assert_eq!(summary.invalid, 2);

        let (summary, seen) = collect(&mut map, RecordStatus::Applied);
        assert_eq!(summary.records, 0);
        assert!(seen.is_empty());

        map.set("z", &[9]).unwrap();
        let (_, seen) = collect(&mut map, RecordStatus::Applied);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, key_hash("z"));
    }

    #[test]
    fn test_only_rejected_keys_removed() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("bad", &[0xEE]).unwrap();
        map.set("good", &[1]).unwrap();

        let mut visitor = |hash: u32, _: &[u8]| {
            if hash == key_hash("bad") {
                RecordStatus::Invalid
            } else {
                RecordStatus::Applied
            }
        };
        map.init(&mut visitor).unwrap();

        let (_, seen) = collect(&mut map, RecordStatus::Applied);
        assert_eq!(newest(&seen, "bad"), None);
        assert_eq!(newest(&seen, "good"), Some(&[1][..]));
    }

    #[test]
    fn test_rewrites_reclaim_space() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("keep", &[7]).unwrap();

        // Far more data than the partition holds, all under one key
        for i in 0..200u8 {
            map.set("counter", &[i; 32]).unwrap();
        }
        assert!(map.flash().erase_count() > 0);

        let mut map = reopen(map);
        let (_, seen) = collect(&mut map, RecordStatus::Applied);
        assert_eq!(newest(&seen, "counter"), Some(&[199; 32][..]));
        assert_eq!(newest(&seen, "keep"), Some(&[7][..]));
    }

    #[test]
    fn test_full_storage_keeps_existing_records() {
        let mut map = fresh_map::<{ 2 * PAGE_SIZE }>();
        map.init(&mut ignore).unwrap();
        map.set("timezone", &[3]).unwrap();
        map.set("lan_flag", &[7]).unwrap();

        let names = [
            "f00", "f01", "f02", "f03", "f04", "f05", "f06", "f07", "f08", "f09", "f10", "f11",
        ];
        let mut result = Ok(());
        for name in names {
            result = map.set(name, &[0x5A; 48]);
            if result.is_err() {
                break;
            }
        }
        assert_eq!(result, Err(EepromError::Full));

        let mut map = reopen(map);
        let (summary, seen) = collect(&mut map, RecordStatus::Applied);
        assert!(!summary.formatted);
        assert_eq!(newest(&seen, "timezone"), Some(&[3][..]));
        assert_eq!(newest(&seen, "lan_flag"), Some(&[7][..]));
    }

    #[test]
    fn test_oversized_record_rejected() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        assert_eq!(
            map.set("a", &[0; MAX_PAYLOAD + 1]),
            Err(EepromError::RecordTooLarge)
        );
        assert!(map.set("a", &[0; MAX_PAYLOAD]).is_ok());
    }

    #[test]
    fn test_reset_clears_records() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("a", &[1]).unwrap();
        map.reset().unwrap();

        let (summary, seen) = collect(&mut map, RecordStatus::Applied);
        assert!(!summary.formatted);
        assert!(seen.is_empty());
        assert!(map.flash().as_bytes().iter().all(|&b| b == crate::ram::ERASED));
    }

    #[test]
    fn test_unknown_records_kept() {
        let mut map = fresh_map::<1024>();
        map.init(&mut ignore).unwrap();
        map.set("legacy_item", &[1]).unwrap();

        let (summary, _) = collect(&mut map, RecordStatus::Unknown);
        assert_eq!(summary.unknown, 1);
        let (summary, _) = collect(&mut map, RecordStatus::Unknown);
        assert_eq!(summary.unknown, 1);
    }
}
