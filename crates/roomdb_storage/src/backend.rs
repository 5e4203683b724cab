//! Storage backend trait.

use crate::error::StorageResult;

/// An append-only byte store.
///
/// The commit log is the only client. It appends framed records, reads them
/// back on open, and truncates a torn tail left by a crash.
///
/// # Invariants
///
/// - `append` returns the offset the bytes were written at, which equals
///   `size()` before the call
/// - bytes are never modified in place; only `truncate` removes them, and
///   only from the end
/// - after `sync` returns, every appended byte survives process termination
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range is not fully
    /// stored, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Reads every stored byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read_all(&self) -> StorageResult<Vec<u8>> {
        let size = self.size()?;
        let len = usize::try_from(size).unwrap_or(usize::MAX);
        self.read_at(0, len)
    }

    /// Appends bytes at the end and returns their offset.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes buffered writes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the number of stored bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Cuts the stored bytes back to `new_size`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
