//! CRC32 helpers
//!
//! Record integrity and key hashing both use CRC32 (IEEE 802.3, reflected).
//! Everything here is `const fn` so item tables can hash their keys at
//! compile time.

const POLY: u32 = 0xEDB88320;

/// Feed `data` into a running CRC32 register
///
/// Start with `0xFFFFFFFF` and invert the result when done, or use
/// [`crc32`] for a one-shot checksum.
pub const fn crc32_update(crc: u32, data: &[u8]) -> u32 {
    let mut crc = crc;
    let mut i = 0;

    while i < data.len() {
        crc ^= data[i] as u32;
        let mut bit = 0;
        while bit < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        i += 1;
    }

    crc
}

/// One-shot CRC32 of a byte slice
pub const fn crc32(data: &[u8]) -> u32 {
    !crc32_update(0xFFFFFFFF, data)
}

/// Hash of a configuration key as stored in persisted records
pub const fn key_hash(key: &str) -> u32 {
    crc32(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_check_value() {
        // Standard check value for "123456789"
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"sound_volume";
        let split = !crc32_update(crc32_update(0xFFFFFFFF, &data[..5]), &data[5..]);
        assert_eq!(split, crc32(data));
    }

    #[test]
    fn test_key_hash_is_const() {
        const HASH: u32 = key_hash("fs_enabled");
        assert_eq!(HASH, crc32(b"fs_enabled"));
        assert_ne!(HASH, key_hash("fs_enable"));
    }
}
