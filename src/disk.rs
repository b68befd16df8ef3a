//! Block device adapter.
//!
//! The filesystem core never touches bytes on its own: every transfer goes
//! through a [`BlockDevice`], which exposes fixed-size blocks over
//! contiguous ranges. Two adapters are provided: [`FileDisk`], backed by a
//! disk image file, and [`MemDisk`], a RAM-backed device used by tests and
//! embedders that do not want to touch the host filesystem.
//!
//! Transfers of sizes that are not a whole number of blocks are rejected at
//! this layer; callers always read or write whole blocks.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::errors::{CanFail, SfsError};

/// A fixed-block-size random access device.
pub trait BlockDevice {
    /// Size of one block, in bytes.
    fn block_size(&self) -> usize;

    /// Total number of blocks on the device.
    fn block_count(&self) -> usize;

    /// Reads `buf.len() / block_size` blocks starting at block `start`.
    ///
    /// # Errors
    ///
    /// [`SfsError::BadBlockRange`] if the buffer is not block-aligned or
    /// the range runs past the device; [`SfsError::Disk`] on I/O failure.
    fn read_blocks(&mut self, start: usize, buf: &mut [u8]) -> CanFail<SfsError>;

    /// Writes `buf.len() / block_size` blocks starting at block `start`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`BlockDevice::read_blocks`].
    fn write_blocks(&mut self, start: usize, buf: &[u8]) -> CanFail<SfsError>;

    /// Flushes and releases the device.
    fn close(&mut self) -> CanFail<SfsError>;
}

/// Validates a block-granular transfer against the device bounds.
fn check_range(dev: &impl BlockDevice, start: usize, len: usize) -> CanFail<SfsError> {
    let bs = dev.block_size();
    if len == 0 || len % bs != 0 {
        return Err(SfsError::BadBlockRange);
    }
    let count = len / bs;
    if start + count > dev.block_count() {
        return Err(SfsError::BadBlockRange);
    }
    Ok(())
}

/// A block device backed by a disk image file on the host filesystem.
pub struct FileDisk {
    file: File,
    block_size: usize,
    block_count: usize,
}

impl FileDisk {
    /// Creates (or re-creates) a zero-filled disk image of
    /// `block_count * block_size` bytes.
    ///
    /// # Errors
    ///
    /// [`SfsError::Disk`] if the image cannot be created or sized.
    pub fn create<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, SfsError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((block_size * block_count) as u64)?;

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }

    /// Opens an existing disk image.
    ///
    /// # Errors
    ///
    /// [`SfsError::Disk`] if the image cannot be opened,
    /// [`SfsError::GeometryMismatch`] if its length does not match the
    /// requested geometry.
    pub fn open<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        block_count: usize,
    ) -> Result<Self, SfsError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() != (block_size * block_count) as u64 {
            return Err(SfsError::GeometryMismatch);
        }

        Ok(Self {
            file,
            block_size,
            block_count,
        })
    }
}

impl BlockDevice for FileDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_blocks(&mut self, start: usize, buf: &mut [u8]) -> CanFail<SfsError> {
        check_range(self, start, buf.len())?;
        self.file
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_blocks(&mut self, start: usize, buf: &[u8]) -> CanFail<SfsError> {
        check_range(self, start, buf.len())?;
        self.file
            .seek(SeekFrom::Start((start * self.block_size) as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn close(&mut self) -> CanFail<SfsError> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// A RAM-backed block device.
pub struct MemDisk {
    blocks: Vec<u8>,
    block_size: usize,
    block_count: usize,
}

impl MemDisk {
    /// Creates a zero-filled in-memory device.
    pub fn new(block_size: usize, block_count: usize) -> Self {
        Self {
            blocks: vec![0; block_size * block_count],
            block_size,
            block_count,
        }
    }
}

impl BlockDevice for MemDisk {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.block_count
    }

    fn read_blocks(&mut self, start: usize, buf: &mut [u8]) -> CanFail<SfsError> {
        check_range(self, start, buf.len())?;
        let off = start * self.block_size;
        buf.copy_from_slice(&self.blocks[off..off + buf.len()]);
        Ok(())
    }

    fn write_blocks(&mut self, start: usize, buf: &[u8]) -> CanFail<SfsError> {
        check_range(self, start, buf.len())?;
        let off = start * self.block_size;
        self.blocks[off..off + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn close(&mut self) -> CanFail<SfsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memdisk_round_trip() {
        let mut disk = MemDisk::new(64, 16);
        let frame = [0xA5u8; 128];
        disk.write_blocks(3, &frame).unwrap();

        let mut back = [0u8; 128];
        disk.read_blocks(3, &mut back).unwrap();
        assert_eq!(frame, back);

        let mut tail = [0u8; 64];
        disk.read_blocks(5, &mut tail).unwrap();
        assert_eq!(tail, [0u8; 64]);
    }

    #[test]
    fn rejects_unaligned_and_out_of_range() {
        let mut disk = MemDisk::new(64, 4);
        let mut buf = [0u8; 63];
        assert!(matches!(
            disk.read_blocks(0, &mut buf),
            Err(SfsError::BadBlockRange)
        ));
        assert!(matches!(
            disk.write_blocks(3, &[0u8; 128]),
            Err(SfsError::BadBlockRange)
        ));
        assert!(matches!(
            disk.read_blocks(0, &mut []),
            Err(SfsError::BadBlockRange)
        ));
    }
}
