//! In-memory NOR flash device
//!
//! Page-erasable storage backed by an array, with NOR semantics: erase
//! sets bytes to `0xFF` and writes can only clear bits. Used on the host
//! and in tests wherever the flash partition would sit.

use embedded_storage::nor_flash::{ErrorType, NorFlashError, NorFlashErrorKind};
use embedded_storage_async::nor_flash::{MultiwriteNorFlash, NorFlash, ReadNorFlash};

/// Erase granularity of [`RamFlash`]
pub const PAGE_SIZE: usize = 256;

/// Write and read granularity of [`RamFlash`]
pub const WORD_SIZE: usize = 4;

/// Erased byte value
pub const ERASED: u8 = 0xFF;

/// Access outside the device or not on a word/page boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RamFlashError {
    OutOfBounds,
    NotAligned,
}

impl NorFlashError for RamFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            RamFlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            RamFlashError::NotAligned => NorFlashErrorKind::NotAligned,
        }
    }
}

/// RAM-backed NOR flash of `N` bytes
///
/// `N` must be a multiple of [`PAGE_SIZE`].
#[derive(Clone)]
pub struct RamFlash<const N: usize> {
    bytes: [u8; N],
    writes: u32,
    erases: u32,
}

impl<const N: usize> Default for RamFlash<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RamFlash<N> {
    const WHOLE_PAGES: () = assert!(N % PAGE_SIZE == 0 && N > 0);

    /// Create an erased device
    pub const fn new() -> Self {
        let () = Self::WHOLE_PAGES;
        Self {
            bytes: [ERASED; N],
            writes: 0,
            erases: 0,
        }
    }

    /// Raw device contents
    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Raw device contents, for simulating corruption
    pub fn as_bytes_mut(&mut self) -> &mut [u8; N] {
        &mut self.bytes
    }

    /// Number of write operations performed so far
    pub fn write_count(&self) -> u32 {
        self.writes
    }

    /// Number of page erases performed so far
    pub fn erase_count(&self) -> u32 {
        self.erases
    }

    fn span(
        offset: u32,
        len: usize,
        align: usize,
    ) -> Result<core::ops::Range<usize>, RamFlashError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(RamFlashError::OutOfBounds)?;
        if end > N {
            return Err(RamFlashError::OutOfBounds);
        }
        if start % align != 0 || len % align != 0 {
            return Err(RamFlashError::NotAligned);
        }
        Ok(start..end)
    }
}

impl<const N: usize> ErrorType for RamFlash<N> {
    type Error = RamFlashError;
}

impl<const N: usize> ReadNorFlash for RamFlash<N> {
    const READ_SIZE: usize = WORD_SIZE;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let span = Self::span(offset, bytes.len(), Self::READ_SIZE)?;
        bytes.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> NorFlash for RamFlash<N> {
    const WRITE_SIZE: usize = WORD_SIZE;
    const ERASE_SIZE: usize = PAGE_SIZE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if to < from {
            return Err(RamFlashError::OutOfBounds);
        }
        let span = Self::span(from, (to - from) as usize, Self::ERASE_SIZE)?;
        self.erases = self
            .erases
            .wrapping_add((span.len() / Self::ERASE_SIZE) as u32);
        self.bytes[span].fill(ERASED);
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let span = Self::span(offset, bytes.len(), Self::WRITE_SIZE)?;
        for (cell, &byte) in self.bytes[span].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        self.writes = self.writes.wrapping_add(1);
        Ok(())
    }
}

impl<const N: usize> MultiwriteNorFlash for RamFlash<N> {}
