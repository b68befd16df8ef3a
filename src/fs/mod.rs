//! Simple filesystem core.
//!
//! A volume is one superblock, a fixed inode table, a single flat root
//! directory, a free-space bitmap near the end of the disk, and data
//! blocks allocated on demand in between. [`SimpleFileSystem`] owns every
//! in-memory table plus the block device, and re-persists each metadata
//! region at the end of every mutating call, so the on-disk copies match
//! memory at API boundaries.
//!
//! The layering, leaves first: block device adapter, free-space bitmap,
//! inode table, root directory, open file table, then the read/write
//! engine in [`file`].

use core::mem::size_of;

use crate::disk::BlockDevice;
use crate::errors::{CanFail, SfsError};
use crate::fs::bitmap::BlockBitmap;
use crate::fs::dir::RootDirectory;
use crate::fs::fd::FdTable;
use crate::fs::inode::{data_block, BlockId, Inode, InodeIdx, InodeTable};
use crate::fs::sb::{Layout, Superblock};

mod bitmap;
mod dir;
mod fd;
mod file;
mod inode;
mod sb;

pub use dir::MAX_FILENAME;
pub use inode::DIRECT_BLOCKS;
pub use sb::Geometry;

/// The filesystem's signature, stored in the superblock.
pub const SFS_MAGIC: u32 = 0xACBD_0005;

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, SfsError>;

/// A mounted simple filesystem volume.
///
/// All shared mutable state lives here; callers wanting concurrent access
/// must serialize at this boundary. Every mutating operation flushes the
/// metadata regions it touched before returning.
pub struct SimpleFileSystem<D: BlockDevice> {
    pub(crate) disk: D,
    pub(crate) geo: Geometry,
    pub(crate) layout: Layout,
    sb: Superblock,
    pub(crate) bitmap: BlockBitmap,
    pub(crate) inodes: InodeTable,
    dir: RootDirectory,
    pub(crate) fds: FdTable,
    /// Directory enumeration cursor, in `[0, max_files]`.
    dir_cursor: usize,
}

impl<D: BlockDevice> SimpleFileSystem<D> {
    /// Formats the device and mounts the resulting empty volume.
    ///
    /// Marks the superblock, inode table, directory and bitmap regions as
    /// allocated, then persists all four.
    ///
    /// # Errors
    ///
    /// [`SfsError::GeometryMismatch`] if the device does not match the
    /// requested geometry, [`SfsError::Disk`] on I/O failure.
    pub fn format(disk: D, geo: Geometry) -> FsResult<Self> {
        geo.validate()?;
        check_device(&disk, &geo)?;

        let layout = Layout::for_geometry(&geo);
        let mut bitmap = BlockBitmap::new(geo.block_count);
        bitmap.reserve(0);
        for blk in layout.inode_table.clone() {
            bitmap.reserve(blk);
        }
        for blk in layout.directory.clone() {
            bitmap.reserve(blk);
        }
        for blk in layout.bitmap.clone() {
            bitmap.reserve(blk);
        }

        let mut fs = Self {
            disk,
            sb: Superblock::for_geometry(&geo, &layout),
            bitmap,
            inodes: InodeTable::new(geo.max_files),
            dir: RootDirectory::new(geo.max_files),
            fds: FdTable::new(geo.max_files),
            dir_cursor: 0,
            geo,
            layout,
        };
        fs.flush_superblock()?;
        fs.flush_inodes()?;
        fs.flush_directory()?;
        fs.flush_bitmap()?;

        log::info!(
            target: "sfs",
            "formatted volume: {} blocks of {} bytes, {} file slots",
            geo.block_count,
            geo.block_size,
            geo.max_files
        );
        Ok(fs)
    }

    /// Mounts an already-formatted volume.
    ///
    /// Reads the superblock, inode table, directory and bitmap back from
    /// their fixed regions; the open file table always starts empty.
    ///
    /// # Errors
    ///
    /// [`SfsError::BadSuperblock`] if the signature or geometry stored on
    /// the volume does not match, [`SfsError::Disk`] on I/O failure.
    pub fn mount(mut disk: D, geo: Geometry) -> FsResult<Self> {
        geo.validate()?;
        check_device(&disk, &geo)?;
        let layout = Layout::for_geometry(&geo);

        let mut block = vec![0u8; geo.block_size];
        disk.read_blocks(0, &mut block)?;
        let sb: Superblock = bytemuck::pod_read_unaligned(&block[..size_of::<Superblock>()]);
        if !sb.matches(&geo, &layout) {
            log::error!(
                target: "sfs",
                "refusing volume: superblock magic {:#010x}, expected {:#010x}",
                sb.magic,
                SFS_MAGIC
            );
            return Err(SfsError::BadSuperblock);
        }

        let mut region = vec![0u8; layout.inode_table.len() * geo.block_size];
        disk.read_blocks(layout.inode_table.start, &mut region)?;
        let inodes = InodeTable::from_bytes(&region, geo.max_files);

        let mut region = vec![0u8; layout.directory.len() * geo.block_size];
        disk.read_blocks(layout.directory.start, &mut region)?;
        let dir = RootDirectory::from_bytes(&region, geo.max_files);

        let mut region = vec![0u8; layout.bitmap.len() * geo.block_size];
        disk.read_blocks(layout.bitmap.start, &mut region)?;
        let bitmap = BlockBitmap::from_bytes(&region, geo.block_count);

        log::info!(
            target: "sfs",
            "mounted volume: {} blocks, {} free",
            geo.block_count,
            bitmap.free_count()
        );
        Ok(Self {
            disk,
            sb,
            bitmap,
            inodes,
            dir,
            fds: FdTable::new(geo.max_files),
            dir_cursor: 0,
            geo,
            layout,
        })
    }

    /// Flushes every metadata region and hands the device back.
    pub fn unmount(mut self) -> FsResult<D> {
        self.flush_superblock()?;
        self.flush_inodes()?;
        self.flush_directory()?;
        self.flush_bitmap()?;
        self.disk.close()?;
        Ok(self.disk)
    }

    /// Opens the named file, creating it if absent.
    ///
    /// On plain open the write cursor starts at the end of the file and
    /// the read cursor at 0. Opening a file that is already open returns
    /// the existing descriptor.
    ///
    /// # Errors
    ///
    /// [`SfsError::NameTooLong`] for names over [`MAX_FILENAME`] bytes;
    /// [`SfsError::NoInode`], [`SfsError::DirFull`] or
    /// [`SfsError::FdTableFull`] when a table is exhausted (a partially
    /// created file is rolled back).
    pub fn open(&mut self, name: &str) -> FsResult<usize> {
        let bytes = name.as_bytes();
        if bytes.len() > MAX_FILENAME {
            return Err(SfsError::NameTooLong);
        }

        if let Some((_, entry)) = self.dir.lookup(bytes) {
            let inode = entry.inode;
            if let Some(fd) = self.fds.find(inode) {
                return Ok(fd);
            }
            let size = self.inodes.get(inode).size;
            return self.fds.open(inode, size).ok_or(SfsError::FdTableFull);
        }

        // Create: inode, then directory entry, then descriptor. Undo on
        // failure so no half-created file survives.
        let inode = self.inodes.allocate().ok_or(SfsError::NoInode)?;
        let Some(slot) = self.dir.insert(bytes, inode) else {
            self.inodes.release(inode);
            return Err(SfsError::DirFull);
        };
        let Some(fd) = self.fds.open(inode, 0) else {
            self.dir.clear(slot);
            self.inodes.release(inode);
            return Err(SfsError::FdTableFull);
        };

        self.flush_inodes()?;
        self.flush_directory()?;
        self.flush_bitmap()?;
        Ok(fd)
    }

    /// Closes a descriptor. The slot becomes reusable; nothing is written
    /// to disk since descriptors are not persistent.
    pub fn close(&mut self, fd: usize) -> CanFail<SfsError> {
        if self.fds.close(fd) {
            Ok(())
        } else {
            Err(SfsError::BadDescriptor)
        }
    }

    /// Moves the read cursor of `fd` to `pos`.
    ///
    /// # Errors
    ///
    /// [`SfsError::BadDescriptor`] on a closed descriptor,
    /// [`SfsError::SeekOutOfRange`] past the end of the file.
    pub fn rseek(&mut self, fd: usize, pos: usize) -> CanFail<SfsError> {
        let of = self.fds.get(fd).ok_or(SfsError::BadDescriptor)?;
        if pos > self.inodes.get(of.inode).size {
            return Err(SfsError::SeekOutOfRange);
        }
        if let Some(of) = self.fds.get_mut(fd) {
            of.read_pos = pos;
        }
        Ok(())
    }

    /// Moves the write cursor of `fd` to `pos`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`SimpleFileSystem::rseek`].
    pub fn wseek(&mut self, fd: usize, pos: usize) -> CanFail<SfsError> {
        let of = self.fds.get(fd).ok_or(SfsError::BadDescriptor)?;
        if pos > self.inodes.get(of.inode).size {
            return Err(SfsError::SeekOutOfRange);
        }
        if let Some(of) = self.fds.get_mut(fd) {
            of.write_pos = pos;
        }
        Ok(())
    }

    /// Removes the named file: clears its directory entry, zeroes and
    /// frees its data blocks and indirect block, resets the inode, and
    /// closes any descriptor still open on it.
    ///
    /// # Errors
    ///
    /// [`SfsError::NotFound`] when no entry carries the name.
    pub fn remove(&mut self, name: &str) -> CanFail<SfsError> {
        let (slot, inode) = {
            let (slot, entry) = self
                .dir
                .lookup(name.as_bytes())
                .ok_or(SfsError::NotFound)?;
            (slot, entry.inode)
        };
        self.dir.clear(slot);

        let ino = *self.inodes.get(inode);
        let indirect = match ino.indirect {
            Some(blk) => self.read_indirect(blk)?,
            None => Vec::new(),
        };
        let zeroes = vec![0u8; self.geo.block_size];
        for i in 0..ino.held_blocks(self.geo.block_size) {
            let blk = data_block(&ino, i, &indirect).ok_or(SfsError::Corrupted)?;
            self.write_block(blk, &zeroes)?;
            self.bitmap.release(blk);
        }
        if let Some(blk) = ino.indirect {
            self.bitmap.release(blk);
        }

        self.inodes.release(inode);
        self.fds.close_inode(inode);

        self.flush_inodes()?;
        self.flush_directory()?;
        self.flush_bitmap()?;
        Ok(())
    }

    /// Returns the next in-use directory entry and advances the
    /// enumeration cursor, skipping free slots.
    ///
    /// Yields each file exactly once per cycle; `None` marks the end of a
    /// cycle, after which enumeration restarts from slot 0.
    pub fn next_filename(&mut self) -> Option<(usize, String)> {
        while self.dir_cursor < self.dir.len() {
            let slot = self.dir_cursor;
            self.dir_cursor += 1;
            if let Some(entry) = self.dir.get(slot) {
                return Some((slot, String::from_utf8_lossy(entry.name_bytes()).into_owned()));
            }
        }
        self.dir_cursor = 0;
        None
    }

    /// Returns the size in bytes of the named file.
    ///
    /// # Errors
    ///
    /// [`SfsError::NotFound`] when no entry carries the name.
    pub fn file_size(&self, name: &str) -> FsResult<usize> {
        let (_, entry) = self
            .dir
            .lookup(name.as_bytes())
            .ok_or(SfsError::NotFound)?;
        Ok(self.inodes.get(entry.inode).size)
    }

    /// Number of free blocks left for file data.
    pub fn free_blocks(&self) -> usize {
        self.bitmap.free_count()
    }

    /// Geometry of the mounted volume.
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    /// Verifies the volume's structural invariants: the bitmap matches the
    /// set of reachable blocks, directory names are unique and agree with
    /// inode link counts, sizes stay within bounds, and open descriptors
    /// refer to live files with cursors inside the file.
    ///
    /// # Errors
    ///
    /// [`SfsError::Corrupted`] on the first violated invariant,
    /// [`SfsError::Disk`] if an indirect block cannot be read.
    pub fn check(&mut self) -> CanFail<SfsError> {
        let mut refs = vec![0u32; self.geo.block_count];
        refs[0] += 1;
        let fixed = self
            .layout
            .inode_table
            .clone()
            .chain(self.layout.directory.clone())
            .chain(self.layout.bitmap.clone());
        for blk in fixed {
            refs[blk] += 1;
        }

        let used: Vec<(InodeIdx, Inode)> = self
            .inodes
            .iter()
            .filter(|(_, ino)| !ino.is_free())
            .map(|(idx, ino)| (idx, *ino))
            .collect();
        for (_, ino) in &used {
            if ino.size > self.geo.max_file_size() {
                return Err(SfsError::Corrupted);
            }
            let held = ino.held_blocks(self.geo.block_size);
            if held > DIRECT_BLOCKS && ino.indirect.is_none() {
                return Err(SfsError::Corrupted);
            }
            if held <= DIRECT_BLOCKS && ino.indirect.is_some() {
                return Err(SfsError::Corrupted);
            }
            let indirect = match ino.indirect {
                Some(blk) => self.read_indirect(blk)?,
                None => Vec::new(),
            };
            for i in 0..held {
                let blk = data_block(ino, i, &indirect).ok_or(SfsError::Corrupted)?;
                *refs.get_mut(blk.index()).ok_or(SfsError::Corrupted)? += 1;
            }
            // Pointers past the end of the file must be absent.
            for slot in ino.direct.iter().skip(held.min(DIRECT_BLOCKS)) {
                if slot.is_some() {
                    return Err(SfsError::Corrupted);
                }
            }
            if let Some(blk) = ino.indirect {
                *refs.get_mut(blk.index()).ok_or(SfsError::Corrupted)? += 1;
                for slot in indirect.iter().skip(held - DIRECT_BLOCKS) {
                    if slot.is_some() {
                        return Err(SfsError::Corrupted);
                    }
                }
            }
        }

        // Directory agreement: names unique, one entry per in-use inode.
        let entries: Vec<_> = self.dir.iter_used().collect();
        for (i, (_, a)) in entries.iter().enumerate() {
            for (_, b) in entries.iter().skip(i + 1) {
                if a.name_bytes() == b.name_bytes() {
                    return Err(SfsError::Corrupted);
                }
            }
        }
        let mut inode_refs = vec![0u32; self.geo.max_files];
        for (_, entry) in &entries {
            if entry.inode.0 >= self.geo.max_files || self.inodes.get(entry.inode).is_free() {
                return Err(SfsError::Corrupted);
            }
            inode_refs[entry.inode.0] += 1;
        }
        for (idx, _) in &used {
            if inode_refs[idx.0] != 1 {
                return Err(SfsError::Corrupted);
            }
        }

        // Open descriptors point at live files, cursors inside the file.
        for (_, of) in self.fds.iter_open() {
            let ino = self.inodes.get(of.inode);
            if ino.is_free() || of.read_pos > ino.size || of.write_pos > ino.size {
                return Err(SfsError::Corrupted);
            }
        }

        // The bitmap must agree with the reachable set, each allocated
        // block claimed exactly once.
        for (blk, &count) in refs.iter().enumerate() {
            let allocated = self.bitmap.is_allocated(blk);
            if (count == 0 && allocated) || (count == 1 && !allocated) || count > 1 {
                return Err(SfsError::Corrupted);
            }
        }
        Ok(())
    }

    /// Reads one data block into `buf`.
    pub(crate) fn read_block(&mut self, blk: BlockId, buf: &mut [u8]) -> CanFail<SfsError> {
        self.disk.read_blocks(blk.index(), buf)
    }

    /// Writes one data block from `buf`.
    pub(crate) fn write_block(&mut self, blk: BlockId, buf: &[u8]) -> CanFail<SfsError> {
        self.disk.write_blocks(blk.index(), buf)
    }

    /// Reads and decodes an indirect block into its pointer slots.
    pub(crate) fn read_indirect(&mut self, blk: BlockId) -> FsResult<Vec<Option<BlockId>>> {
        let mut raw = vec![0u8; self.geo.block_size];
        self.read_block(blk, &mut raw)?;
        Ok(raw
            .chunks_exact(size_of::<i32>())
            .map(|chunk| {
                BlockId::from_disk(i32::from_ne_bytes(
                    chunk
                        .try_into()
                        .expect("indirect block chunk is exactly 4 bytes"),
                ))
            })
            .collect())
    }

    /// Encodes and persists an indirect block's pointer slots.
    pub(crate) fn write_indirect(
        &mut self,
        blk: BlockId,
        slots: &[Option<BlockId>],
    ) -> CanFail<SfsError> {
        let mut raw = vec![0u8; self.geo.block_size];
        for (chunk, slot) in raw.chunks_exact_mut(size_of::<i32>()).zip(slots.iter()) {
            chunk.copy_from_slice(&BlockId::disk_repr(*slot).to_ne_bytes());
        }
        self.write_block(blk, &raw)
    }

    pub(crate) fn flush_superblock(&mut self) -> CanFail<SfsError> {
        let mut block = vec![0u8; self.geo.block_size];
        block[..size_of::<Superblock>()].copy_from_slice(bytemuck::bytes_of(&self.sb));
        self.disk.write_blocks(0, &block)
    }

    pub(crate) fn flush_inodes(&mut self) -> CanFail<SfsError> {
        let mut region = vec![0u8; self.layout.inode_table.len() * self.geo.block_size];
        self.inodes.to_bytes(&mut region);
        self.disk
            .write_blocks(self.layout.inode_table.start, &region)
    }

    pub(crate) fn flush_directory(&mut self) -> CanFail<SfsError> {
        let mut region = vec![0u8; self.layout.directory.len() * self.geo.block_size];
        self.dir.to_bytes(&mut region);
        self.disk.write_blocks(self.layout.directory.start, &region)
    }

    pub(crate) fn flush_bitmap(&mut self) -> CanFail<SfsError> {
        let mut region = vec![0u8; self.layout.bitmap.len() * self.geo.block_size];
        self.bitmap.to_bytes(&mut region);
        self.disk.write_blocks(self.layout.bitmap.start, &region)
    }
}

/// Checks that the device geometry matches the volume geometry.
fn check_device<D: BlockDevice>(disk: &D, geo: &Geometry) -> CanFail<SfsError> {
    if disk.block_size() != geo.block_size || disk.block_count() != geo.block_count {
        return Err(SfsError::GeometryMismatch);
    }
    Ok(())
}
