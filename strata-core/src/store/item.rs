//! Typed configuration items
//!
//! Each item caches its current value in RAM next to an immutable default.
//! Reads never touch the backend; writes go through [`super::ConfigStore`]
//! so the new value is persisted.

use core::cell::Cell;
use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_hal::{key_hash, ConfigBackend, EepromError};

/// Largest serialized item value
pub const MAX_ITEM_SIZE: usize = 128;

/// Errors from encoding an item value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Serialized value does not fit the buffer
    BufferTooSmall,
}

impl From<EncodeError> for EepromError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::BufferTooSmall => EepromError::RecordTooLarge,
        }
    }
}

/// A value type that can be held by a [`ConfigItem`]
///
/// Implemented for scalars, fixed arrays of item values and
/// [`CharArray`].
pub trait ItemValue:
    Copy + PartialEq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    /// Compare two values the way default detection sees them
    fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

macro_rules! scalar_item_values {
    ($($ty:ty),* $(,)?) => {
        $(impl ItemValue for $ty {})*
    };
}

scalar_item_values!(bool, u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl<T: ItemValue, const N: usize> ItemValue for [T; N] where [T; N]: Serialize + DeserializeOwned {}

/// Fixed-width, NUL-padded character buffer
///
/// Mirrors a C `char[N]` field: the string ends at the first NUL, or fills
/// the whole width with no terminator.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct CharArray<const N: usize>([u8; N]);

impl<const N: usize> Default for CharArray<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> CharArray<N> {
    /// Copy at most `N` bytes of `s`, stopping at a NUL, and pad with NULs
    pub const fn new(s: &str) -> Self {
        let src = s.as_bytes();
        let mut bytes = [0u8; N];
        let mut i = 0;
        while i < N && i < src.len() && src[i] != 0 {
            bytes[i] = src[i];
            i += 1;
        }
        Self(bytes)
    }

    /// Wrap raw bytes as they are
    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Raw bytes including padding
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Length up to the first NUL
    pub fn c_len(&self) -> usize {
        self.0.iter().position(|&b| b == 0).unwrap_or(N)
    }

    /// String content up to the first NUL
    ///
    /// Stops early at the first invalid UTF-8 sequence.
    pub fn as_str(&self) -> &str {
        let bytes = &self.0[..self.c_len()];
        match core::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    /// Copy the string content into an owned buffer
    pub fn to_heapless(&self) -> heapless::String<N> {
        let mut out = heapless::String::new();
        for c in self.as_str().chars() {
            if out.push(c).is_err() {
                break;
            }
        }
        out
    }
}

impl<const N: usize> fmt::Debug for CharArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for CharArray<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(feature = "defmt")]
impl<const N: usize> defmt::Format for CharArray<N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{=str}", self.as_str())
    }
}

impl<const N: usize> Serialize for CharArray<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0[..self.c_len()])
    }
}

impl<'de, const N: usize> Deserialize<'de> for CharArray<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BytesVisitor<const N: usize>;

        impl<'de, const N: usize> Visitor<'de> for BytesVisitor<N> {
            type Value = CharArray<N>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "at most {} bytes", N)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                if v.len() > N {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut bytes = [0u8; N];
                bytes[..v.len()].copy_from_slice(v);
                Ok(CharArray(bytes))
            }
        }

        deserializer.deserialize_bytes(BytesVisitor::<N>)
    }
}

impl<const N: usize> ItemValue for CharArray<N> {
    fn same_value(&self, other: &Self) -> bool {
        self.0[..self.c_len()] == other.0[..other.c_len()]
    }
}

/// Serialize a value into `buf`
pub fn encode<'b, T: ItemValue>(value: &T, buf: &'b mut [u8]) -> Result<&'b [u8], EncodeError> {
    postcard::to_slice(value, buf)
        .map(|bytes| &*bytes)
        .map_err(|_| EncodeError::BufferTooSmall)
}

/// Deserialize exactly one value from `data`
///
/// Trailing bytes mean the stored type differs and are rejected.
pub fn decode<T: ItemValue>(data: &[u8]) -> Option<T> {
    match postcard::take_from_bytes::<T>(data) {
        Ok((value, rest)) if rest.is_empty() => Some(value),
        _ => None,
    }
}

/// Type-erased view of a configuration item
///
/// Lets the store walk every item regardless of its value type.
pub trait StoreItem: Sync {
    /// Item key as persisted
    fn key(&self) -> &'static str;

    /// CRC32 of the key
    fn key_hash(&self) -> u32;

    /// Whether the cached value equals the default
    fn is_default(&self) -> bool;

    /// Reset the cached value to the default without persisting
    fn set_to_default(&self);

    /// Initialize the cached value from persisted bytes
    ///
    /// Returns false and leaves the value untouched if the bytes do not
    /// decode as this item's type.
    fn load(&self, data: &[u8]) -> bool;

    /// Serialize the cached value
    fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b [u8], EncodeError>;

    /// Persist the cached value into `backend`
    ///
    /// Items at their default are skipped unless `save_default` is set.
    /// Returns whether a record was written.
    fn dump_data(
        &self,
        backend: &mut dyn ConfigBackend,
        save_default: bool,
    ) -> Result<bool, EepromError> {
        if !save_default && self.is_default() {
            return Ok(false);
        }
        let mut buf = [0u8; MAX_ITEM_SIZE];
        let data = self.encode(&mut buf)?;
        backend.set(self.key(), data)?;
        Ok(true)
    }
}

/// One named configuration value
pub struct ConfigItem<T: ItemValue> {
    key: &'static str,
    key_hash: u32,
    default: T,
    value: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: ItemValue> ConfigItem<T> {
    /// Create an item holding its default value
    pub const fn new(key: &'static str, default: T) -> Self {
        Self {
            key,
            key_hash: key_hash(key),
            default,
            value: Mutex::new(Cell::new(default)),
        }
    }

    /// Current cached value
    pub fn get(&self) -> T {
        self.value.lock(|value| value.get())
    }

    /// Item key
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Default value
    pub fn default_value(&self) -> T {
        self.default
    }

    /// Whether the cached value equals the default
    pub fn is_default(&self) -> bool {
        self.get().same_value(&self.default)
    }

    /// Set the cached value without persisting (boot load)
    pub(crate) fn init(&self, new_value: T) {
        self.value.lock(|value| value.set(new_value));
    }

    /// Swap in a new value, returning whether it changed
    ///
    /// Compares the raw value, so char arrays differing only after the NUL
    /// count as changed.
    pub(crate) fn replace(&self, new_value: T) -> bool {
        self.value.lock(|value| {
            if value.get() == new_value {
                false
            } else {
                value.set(new_value);
                true
            }
        })
    }
}

impl<T: ItemValue> StoreItem for ConfigItem<T> {
    fn key(&self) -> &'static str {
        self.key
    }

    fn key_hash(&self) -> u32 {
        self.key_hash
    }

    fn is_default(&self) -> bool {
        ConfigItem::is_default(self)
    }

    fn set_to_default(&self) {
        self.init(self.default);
    }

    fn load(&self, data: &[u8]) -> bool {
        match decode::<T>(data) {
            Some(value) => {
                self.init(value);
                true
            }
            None => false,
        }
    }

    fn encode<'b>(&self, buf: &'b mut [u8]) -> Result<&'b [u8], EncodeError> {
        encode(&self.get(), buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_starts_at_default() {
        let item = ConfigItem::new("sound_volume", 5u8);
        assert_eq!(item.get(), 5);
        assert!(item.is_default());
        assert_eq!(item.key(), "sound_volume");
        assert_eq!(StoreItem::key_hash(&item), key_hash("sound_volume"));
    }

    #[test]
    fn test_replace_reports_change() {
        let item = ConfigItem::new("timezone", 0i8);
        assert!(item.replace(3));
        assert!(!item.replace(3));
        assert_eq!(item.get(), 3);
        assert!(!item.is_default());

        item.set_to_default();
        assert_eq!(item.get(), 0);
    }

    #[test]
    fn test_load_rejects_wrong_type() {
        let item = ConfigItem::new("crash_sens_x", 2i16);
        let mut buf = [0u8; MAX_ITEM_SIZE];

        // A u32 that does not fit an i16 varint payload
        let data = encode(&u32::MAX, &mut buf).unwrap();
        assert!(!item.load(data));
        assert_eq!(item.get(), 2);

        // Trailing bytes are a type change too
        assert!(!item.load(&[4, 0]));
        assert!(item.load(&[4]));
        assert_eq!(item.get(), 2i16);
    }

    #[test]
    fn test_array_roundtrip_through_bytes() {
        let item = ConfigItem::new("footer_setting", [1u8, 2, 3, 0, 0]);
        item.replace([5, 4, 3, 2, 1]);

        let mut buf = [0u8; MAX_ITEM_SIZE];
        let bytes = StoreItem::encode(&item, &mut buf).unwrap();
        assert_eq!(bytes, &[5, 4, 3, 2, 1]);

        let other = ConfigItem::new("footer_setting", [0u8; 5]);
        assert!(other.load(bytes));
        assert_eq!(other.get(), [5, 4, 3, 2, 1]);
    }

    #[test]
    fn test_encode_buffer_too_small() {
        let mut buf = [0u8; 2];
        assert_eq!(
            encode(&[1.0f32, 2.0, 3.0], &mut buf),
            Err(EncodeError::BufferTooSmall)
        );
    }

    #[test]
    fn test_char_array_truncates() {
        let name = CharArray::<4>::new("printer");
        assert_eq!(name.as_bytes(), b"prin");
        assert_eq!(name.c_len(), 4);
        assert_eq!(name.as_str(), "prin");
        assert_eq!(name.to_heapless().as_str(), "prin");
    }

    #[test]
    fn test_char_array_stops_at_nul() {
        let name = CharArray::<8>::new("ab\0cd");
        assert_eq!(name.as_bytes(), b"ab\0\0\0\0\0\0");
        assert_eq!(name.as_str(), "ab");
        assert_eq!(name.to_heapless().as_str(), "ab");
    }

    #[test]
    fn test_char_array_comparison_modes() {
        let clean = CharArray::<6>::from_bytes(*b"abc\0\0\0");
        let dirty = CharArray::<6>::from_bytes(*b"abc\0xy");

        // Raw comparison sees the bytes after the terminator
        assert_ne!(clean, dirty);
        // String comparison stops at the terminator
        assert!(clean.same_value(&dirty));
    }

    #[test]
    fn test_char_array_serializes_content_only() {
        let mut buf = [0u8; MAX_ITEM_SIZE];
        let bytes = encode(&CharArray::<20>::new("mini"), &mut buf).unwrap();
        assert_eq!(bytes, &[4, b'm', b'i', b'n', b'i']);

        let decoded: CharArray<20> = decode(bytes).unwrap();
        assert_eq!(decoded, CharArray::new("mini"));
    }

    #[test]
    fn test_char_array_rejects_wider_value() {
        let mut buf = [0u8; MAX_ITEM_SIZE];
        let bytes = encode(&CharArray::<8>::new("too long"), &mut buf).unwrap();
        assert!(decode::<CharArray<4>>(bytes).is_none());
    }

    #[test]
    fn test_invalid_utf8_yields_prefix() {
        let name = CharArray::<4>::from_bytes([b'o', b'k', 0xFF, 0]);
        assert_eq!(name.as_str(), "ok");
    }
}
