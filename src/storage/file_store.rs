//! File-backed block store.
//!
//! The [`FileBlockStore`] handles all direct file operations:
//! - Reading and writing blocks
//! - Sizing the file to a fixed block count
//! - Tracking allocation notifications in [`StoreStats`]

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{info, trace};
use parking_lot::Mutex;

use crate::common::{BlockId, Error, Result};
use crate::storage::{BlockStore, StoreStats};

/// Stores blocks in a single file.
///
/// # File Layout
/// Blocks are laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      B        2B      ...      N×B
/// ```
///
/// Block N is located at file offset `N × block_size`. The file is sized once
/// at creation; the index manages free space inside it through its freelist.
///
/// # Thread Safety
/// The file handle sits behind a `Mutex` so that a seek and the following
/// read or write happen as one step.
///
/// # Durability
/// All writes are followed by `fsync()`.
pub struct FileBlockStore {
    file: Mutex<File>,
    block_size: usize,
    block_count: u64,
    stats: StoreStats,
}

impl FileBlockStore {
    /// Create a new store file holding `block_count` zeroed blocks.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize, block_count: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidConfig("block size must be non-zero".into()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;

        file.set_len(block_count * block_size as u64)?;
        file.sync_all()?;

        info!(
            "created block store {} ({} blocks of {} bytes)",
            path.as_ref().display(),
            block_count,
            block_size
        );

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            block_count,
            stats: StoreStats::new(),
        })
    }

    /// Open an existing store file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist, cannot be opened, or its
    /// length is not a multiple of `block_size`.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::InvalidConfig("block size must be non-zero".into()));
        }

        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        if file_size % block_size as u64 != 0 {
            return Err(Error::InvalidConfig(format!(
                "file size {} is not a multiple of block size {}",
                file_size, block_size
            )));
        }
        let block_count = file_size / block_size as u64;

        info!(
            "opened block store {} ({} blocks of {} bytes)",
            path.as_ref().display(),
            block_count,
            block_size
        );

        Ok(Self {
            file: Mutex::new(file),
            block_size,
            block_count,
            stats: StoreStats::new(),
        })
    }

    /// Open an existing store file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        block_count: u64,
    ) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, block_size)
        } else {
            Self::create(path, block_size, block_count)
        }
    }

    /// Get the total size of the store file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        self.block_count * self.block_size as u64
    }

    /// Store statistics.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    fn check_bounds(&self, block: BlockId, len: usize) -> Result<()> {
        if block.0 >= self.block_count {
            return Err(Error::InvalidBlock(block));
        }
        if len != self.block_size {
            return Err(Error::InvalidConfig(format!(
                "buffer of {} bytes for block size {}",
                len, self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockStore for FileBlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn read_block(&self, block: BlockId, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(block, buf.len())?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block.offset(self.block_size)))?;
        file.read_exact(buf)?;
        drop(file);

        trace!("read block {}", block);
        self.stats.record_read();
        Ok(())
    }

    fn write_block(&self, block: BlockId, buf: &[u8]) -> Result<()> {
        self.check_bounds(block, buf.len())?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(block.offset(self.block_size)))?;
        file.write_all(buf)?;
        file.sync_all()?; // fsync for durability
        drop(file);

        trace!("wrote block {}", block);
        self.stats.record_write();
        Ok(())
    }

    fn notify_allocate(&self, _block: BlockId) {
        self.stats.record_allocate();
    }

    fn notify_deallocate(&self, _block: BlockId) {
        self.stats.record_deallocate();
    }
}
