//! Handle traits handed back to the protocol server
//!
//! A download handle implements [`ReadAt`], an upload handle [`WriteAt`] and
//! a listing or stat handle [`ListAt`]. The server drives them with
//! positional calls; the implementations here only promise good behavior for
//! near-sequential access.

use async_trait::async_trait;
use bucketio_common::{FileEntry, Result};
use bytes::Bytes;

/// Positional reads from an open file
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`
    ///
    /// Returns the number of bytes copied. `Ok(0)` with a non-empty buffer
    /// means end of file.
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Release the handle. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Positional writes to a file being uploaded
#[async_trait]
pub trait WriteAt: Send + Sync {
    async fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Finish the upload. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// Positional reads of directory entries
#[async_trait]
pub trait ListAt: Send + Sync {
    /// Return up to `limit` entries starting at entry index `offset`
    async fn list_at(&self, offset: u64, limit: usize) -> Result<ListPage>;
}

/// Entries returned by one [`ListAt::list_at`] call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<FileEntry>,
    /// No entries remain past the returned ones
    pub eof: bool,
}

impl ListPage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reader over an in-memory snapshot
///
/// Serves downloads of objects whose upload is still in flight.
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    data: Bytes,
}

impl SnapshotReader {
    #[must_use]
    pub const fn new(data: Bytes) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ReadAt for SnapshotReader {
    async fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
