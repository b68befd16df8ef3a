//! Inode records, the inode table and block addressing.
//!
//! Each file owns one inode holding its metadata and the block pointers to
//! its data: [`DIRECT_BLOCKS`] direct pointers, then one single-indirect
//! block whose entries extend the file up to the volume's maximum file
//! size. An inode with a link count of zero is free; there is no separate
//! allocation bitmap for inodes.
//!
//! On disk every pointer is an `i32` with `-1` standing for "absent"; the
//! in-memory form uses `Option` and only the [`DiskInode`] record knows
//! about the sentinel.

use core::mem::size_of;

use bytemuck::{Pod, Zeroable};

/// Number of direct block pointers held by one inode.
pub const DIRECT_BLOCKS: usize = 12;

/// Raw sentinel marking an absent block pointer or slot on disk.
pub(crate) const NO_BLOCK: i32 = -1;

/// Identifies one block on the volume.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
pub struct BlockId(u32);

impl BlockId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the block on the volume.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Decodes an on-disk pointer, mapping the sentinel to `None`.
    pub(crate) fn from_disk(raw: i32) -> Option<Self> {
        (raw >= 0).then(|| Self(raw as u32))
    }

    /// Encodes an optional pointer into its on-disk form.
    pub(crate) fn disk_repr(slot: Option<Self>) -> i32 {
        slot.map_or(NO_BLOCK, |blk| blk.0 as i32)
    }
}

/// Index of an inode slot in the inode table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InodeIdx(pub(crate) usize);

/// On-disk inode record, 72 bytes in host byte order.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DiskInode {
    /// Opaque mode bits; the core never interprets them.
    pub(crate) mode: i32,
    /// Doubles as the in-use flag: 0 means free, 1 means in use.
    pub(crate) link_count: i32,
    /// Opaque owning user id.
    pub(crate) uid: i32,
    /// Opaque owning group id.
    pub(crate) gid: i32,
    /// File length in bytes.
    pub(crate) size: i32,
    /// The first [`DIRECT_BLOCKS`] data blocks, `-1` if unused.
    pub(crate) direct: [i32; DIRECT_BLOCKS],
    /// Single-indirect block, `-1` if none.
    pub(crate) indirect: i32,
}

const _: () = assert!(size_of::<DiskInode>() == 72);

/// In-memory view of one inode slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Inode {
    pub(crate) mode: i32,
    pub(crate) link_count: u32,
    pub(crate) uid: i32,
    pub(crate) gid: i32,
    /// File length in bytes.
    pub(crate) size: usize,
    /// Direct data blocks, in file order.
    pub(crate) direct: [Option<BlockId>; DIRECT_BLOCKS],
    /// Single-indirect block extending the file past the direct range.
    pub(crate) indirect: Option<BlockId>,
}

impl Inode {
    /// A free inode slot.
    pub(crate) const FREE: Self = Self {
        mode: 0,
        link_count: 0,
        uid: 0,
        gid: 0,
        size: 0,
        direct: [None; DIRECT_BLOCKS],
        indirect: None,
    };

    /// Tells whether the slot is free.
    pub(crate) fn is_free(&self) -> bool {
        self.link_count == 0
    }

    /// Number of data blocks the file currently holds.
    pub(crate) fn held_blocks(&self, block_size: usize) -> usize {
        self.size.div_ceil(block_size)
    }
}

impl From<&Inode> for DiskInode {
    fn from(ino: &Inode) -> Self {
        let mut direct = [NO_BLOCK; DIRECT_BLOCKS];
        for (raw, blk) in direct.iter_mut().zip(ino.direct.iter()) {
            *raw = BlockId::disk_repr(*blk);
        }
        Self {
            mode: ino.mode,
            link_count: ino.link_count as i32,
            uid: ino.uid,
            gid: ino.gid,
            size: ino.size as i32,
            direct,
            indirect: BlockId::disk_repr(ino.indirect),
        }
    }
}

impl From<&DiskInode> for Inode {
    fn from(raw: &DiskInode) -> Self {
        let mut direct = [None; DIRECT_BLOCKS];
        for (blk, raw) in direct.iter_mut().zip(raw.direct.iter()) {
            *blk = BlockId::from_disk(*raw);
        }
        Self {
            mode: raw.mode,
            link_count: raw.link_count.max(0) as u32,
            uid: raw.uid,
            gid: raw.gid,
            size: raw.size.max(0) as usize,
            direct,
            indirect: BlockId::from_disk(raw.indirect),
        }
    }
}

/// Resolves the data block backing file block `index`, hiding the
/// direct/indirect split.
///
/// `indirect` is the decoded content of the inode's indirect block; it may
/// be empty when the file never grew past the direct range.
pub(crate) fn data_block(
    ino: &Inode,
    index: usize,
    indirect: &[Option<BlockId>],
) -> Option<BlockId> {
    if index < DIRECT_BLOCKS {
        ino.direct[index]
    } else {
        indirect.get(index - DIRECT_BLOCKS).copied().flatten()
    }
}

/// Fixed-capacity table of every inode on the volume.
pub(crate) struct InodeTable {
    slots: Vec<Inode>,
}

impl InodeTable {
    /// Creates a table of `max_files` free inodes.
    pub(crate) fn new(max_files: usize) -> Self {
        Self {
            slots: vec![Inode::FREE; max_files],
        }
    }

    /// Rebuilds the table from the on-disk inode region.
    pub(crate) fn from_bytes(bytes: &[u8], max_files: usize) -> Self {
        let slots = bytes
            .chunks_exact(size_of::<DiskInode>())
            .take(max_files)
            .map(|chunk| Inode::from(&bytemuck::pod_read_unaligned::<DiskInode>(chunk)))
            .collect();
        Self { slots }
    }

    /// Serializes the table into `out`, zero-filling the padding after the
    /// last record.
    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        out.fill(0);
        for (slot, ino) in self.slots.iter().enumerate() {
            let raw = DiskInode::from(ino);
            let off = slot * size_of::<DiskInode>();
            out[off..off + size_of::<DiskInode>()].copy_from_slice(bytemuck::bytes_of(&raw));
        }
    }

    /// Claims the lowest free slot and initializes it for a fresh empty
    /// file.
    pub(crate) fn allocate(&mut self) -> Option<InodeIdx> {
        let slot = self.slots.iter().position(Inode::is_free)?;
        self.slots[slot] = Inode {
            link_count: 1,
            ..Inode::FREE
        };
        Some(InodeIdx(slot))
    }

    /// Returns the slot to its free state.
    pub(crate) fn release(&mut self, idx: InodeIdx) {
        self.slots[idx.0] = Inode::FREE;
    }

    pub(crate) fn get(&self, idx: InodeIdx) -> &Inode {
        &self.slots[idx.0]
    }

    pub(crate) fn get_mut(&mut self, idx: InodeIdx) -> &mut Inode {
        &mut self.slots[idx.0]
    }

    /// Iterates over `(slot, inode)` pairs.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (InodeIdx, &Inode)> {
        self.slots
            .iter()
            .enumerate()
            .map(|(slot, ino)| (InodeIdx(slot), ino))
    }
}
