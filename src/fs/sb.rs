//! Superblock and on-disk region layout.
//!
//! The superblock occupies block 0 and pins down the volume's identity:
//! signature, block size, volume size and the number of blocks claimed by
//! the inode table. Everything else about the layout is derived from the
//! [`Geometry`]: the inode table starts at block 1, the root directory
//! follows it, and the free-space bitmap sits in a fixed region near the
//! end of the volume. File data and indirect blocks are allocated on
//! demand from whatever remains.

use core::mem::size_of;
use core::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::errors::{CanFail, SfsError};
use crate::fs::dir::DirSlotRaw;
use crate::fs::inode::{DiskInode, DIRECT_BLOCKS};
use crate::fs::SFS_MAGIC;

/// Shape of a volume: block size, volume size and file capacity.
///
/// The canonical geometry (1 KiB blocks, 4000 blocks, 100 files) is the
/// [`Default`]; tests and embedders may build smaller volumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    /// Size of one block in bytes.
    pub block_size: usize,
    /// Total number of blocks on the volume.
    pub block_count: usize,
    /// Capacity of the inode table, directory and open file table.
    pub max_files: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: 1024,
            block_count: 4000,
            max_files: 100,
        }
    }
}

impl Geometry {
    /// Number of block pointers held by one indirect block.
    pub fn indirect_slots(&self) -> usize {
        self.block_size / size_of::<i32>()
    }

    /// Largest file the volume can hold: the direct pointers plus one
    /// fully populated indirect block.
    pub fn max_file_size(&self) -> usize {
        self.block_size * (DIRECT_BLOCKS + self.indirect_slots())
    }

    /// Checks that the metadata regions fit on the volume and leave room
    /// for file data.
    pub(crate) fn validate(&self) -> CanFail<SfsError> {
        if self.block_size < size_of::<DiskInode>()
            || self.block_size % size_of::<i32>() != 0
            || self.max_files == 0
        {
            return Err(SfsError::GeometryMismatch);
        }
        let bitmap_blocks = self.block_count.div_ceil(self.block_size);
        if self.block_count <= bitmap_blocks + 1 {
            return Err(SfsError::GeometryMismatch);
        }
        let layout = Layout::for_geometry(self);
        if layout.directory.end >= layout.bitmap.start || layout.bitmap.end > self.block_count {
            return Err(SfsError::GeometryMismatch);
        }
        Ok(())
    }
}

/// Block ranges of the fixed metadata regions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Layout {
    /// Blocks holding the inode table.
    pub(crate) inode_table: Range<usize>,
    /// Blocks holding the root directory table.
    pub(crate) directory: Range<usize>,
    /// Blocks holding the free-space bitmap.
    pub(crate) bitmap: Range<usize>,
}

impl Layout {
    /// Derives the region layout from a [`Geometry`].
    pub(crate) fn for_geometry(geo: &Geometry) -> Self {
        let inode_blocks = (geo.max_files * size_of::<DiskInode>()).div_ceil(geo.block_size);
        let dir_blocks = (geo.max_files * size_of::<DirSlotRaw>()).div_ceil(geo.block_size);

        // One byte per block on disk; the region is anchored one block
        // short of the end of the volume.
        let bitmap_blocks = geo.block_count.div_ceil(geo.block_size);
        let bitmap_start = geo.block_count - bitmap_blocks - 1;

        Self {
            inode_table: 1..1 + inode_blocks,
            directory: 1 + inode_blocks..1 + inode_blocks + dir_blocks,
            bitmap: bitmap_start..bitmap_start + bitmap_blocks,
        }
    }
}

/// On-disk superblock, stored in host byte order at block 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub(crate) struct Superblock {
    /// Filesystem signature.
    pub(crate) magic: u32,
    /// Size of one block in bytes.
    pub(crate) block_size: u32,
    /// Total number of blocks on the volume.
    pub(crate) fs_size: u32,
    /// Number of blocks occupied by the inode table.
    pub(crate) inode_table_blocks: u32,
    /// Inode slot of the root directory. Always 0: the directory is not
    /// stored as a file in this design.
    pub(crate) root_dir_inode: u32,
}

impl Superblock {
    /// Builds the superblock describing a freshly formatted volume.
    pub(crate) fn for_geometry(geo: &Geometry, layout: &Layout) -> Self {
        Self {
            magic: SFS_MAGIC,
            block_size: geo.block_size as u32,
            fs_size: geo.block_count as u32,
            inode_table_blocks: layout.inode_table.len() as u32,
            root_dir_inode: 0,
        }
    }

    /// Tells whether this superblock describes a volume with the expected
    /// signature and geometry.
    pub(crate) fn matches(&self, geo: &Geometry, layout: &Layout) -> bool {
        self.magic == SFS_MAGIC
            && self.block_size == geo.block_size as u32
            && self.fs_size == geo.block_count as u32
            && self.inode_table_blocks == layout.inode_table.len() as u32
            && self.root_dir_inode == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_layout() {
        let geo = Geometry::default();
        let layout = Layout::for_geometry(&geo);

        // 100 inodes of 72 bytes span 8 blocks, 100 directory slots of 24
        // bytes span 3, and the 4000-byte bitmap spans 4 blocks anchored
        // at 3995.
        assert_eq!(layout.inode_table, 1..9);
        assert_eq!(layout.directory, 9..12);
        assert_eq!(layout.bitmap, 3995..3999);
        geo.validate().unwrap();
    }

    #[test]
    fn superblock_round_trip() {
        let geo = Geometry::default();
        let layout = Layout::for_geometry(&geo);
        let sb = Superblock::for_geometry(&geo, &layout);

        assert!(sb.matches(&geo, &layout));
        assert_eq!(sb.magic, SFS_MAGIC);
        assert_eq!(sb.inode_table_blocks, 8);

        let bytes = bytemuck::bytes_of(&sb);
        let back: Superblock = bytemuck::pod_read_unaligned(bytes);
        assert_eq!(back, sb);
    }

    #[test]
    fn rejects_undersized_volumes() {
        let geo = Geometry {
            block_size: 1024,
            block_count: 8,
            max_files: 100,
        };
        assert!(matches!(geo.validate(), Err(SfsError::GeometryMismatch)));
    }
}
