//! Flat root directory.
//!
//! The volume has a single directory: a fixed table mapping file names to
//! inode slots, persisted right after the inode table. Names are byte
//! strings of at most [`MAX_FILENAME`] bytes, compared byte for byte, and
//! stored NUL-padded. Lookup is a linear scan; insertion takes the lowest
//! free directory slot regardless of which inode slot the file got.

use core::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::fs::inode::{InodeIdx, NO_BLOCK};

/// Longest permitted file name, in bytes, terminator excluded.
pub const MAX_FILENAME: usize = 16;

/// Stored name field: the name plus its terminator.
const NAME_BYTES: usize = MAX_FILENAME + 1;

/// On-disk directory slot, 24 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DirSlotRaw {
    /// Inode slot this name refers to, `-1` when the slot is free.
    pub(crate) inode_index: i32,
    /// NUL-padded file name.
    pub(crate) name: [u8; NAME_BYTES],
    _pad: [u8; 3],
}

const _: () = assert!(size_of::<DirSlotRaw>() == 24);

/// One in-use directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct DirEntry {
    pub(crate) inode: InodeIdx,
    name: [u8; NAME_BYTES],
}

impl DirEntry {
    fn new(name: &[u8], inode: InodeIdx) -> Self {
        let mut stored = [0u8; NAME_BYTES];
        stored[..name.len()].copy_from_slice(name);
        Self { inode, name: stored }
    }

    /// The entry's name, terminator and padding stripped.
    pub(crate) fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_FILENAME);
        &self.name[..end]
    }
}

/// Fixed-capacity table of directory slots.
pub(crate) struct RootDirectory {
    slots: Vec<Option<DirEntry>>,
}

impl RootDirectory {
    /// Creates an empty directory of `max_files` slots.
    pub(crate) fn new(max_files: usize) -> Self {
        Self {
            slots: vec![None; max_files],
        }
    }

    /// Rebuilds the directory from its on-disk region.
    pub(crate) fn from_bytes(bytes: &[u8], max_files: usize) -> Self {
        let slots = bytes
            .chunks_exact(size_of::<DirSlotRaw>())
            .take(max_files)
            .map(|chunk| {
                let raw: DirSlotRaw = bytemuck::pod_read_unaligned(chunk);
                (raw.inode_index >= 0).then(|| DirEntry {
                    inode: InodeIdx(raw.inode_index as usize),
                    name: raw.name,
                })
            })
            .collect();
        Self { slots }
    }

    /// Serializes the directory into `out`, zero-filling the padding.
    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        out.fill(0);
        for (slot, entry) in self.slots.iter().enumerate() {
            let raw = match entry {
                Some(ent) => DirSlotRaw {
                    inode_index: ent.inode.0 as i32,
                    name: ent.name,
                    _pad: [0; 3],
                },
                None => DirSlotRaw {
                    inode_index: NO_BLOCK,
                    name: [0; NAME_BYTES],
                    _pad: [0; 3],
                },
            };
            let off = slot * size_of::<DirSlotRaw>();
            out[off..off + size_of::<DirSlotRaw>()].copy_from_slice(bytemuck::bytes_of(&raw));
        }
    }

    /// Finds the entry carrying `name`, byte-exact.
    pub(crate) fn lookup(&self, name: &[u8]) -> Option<(usize, &DirEntry)> {
        self.iter_used()
            .find(|(_, entry)| entry.name_bytes() == name)
    }

    /// Inserts a name into the lowest free slot.
    ///
    /// The caller guarantees the name fits and is not already present.
    /// Returns the slot used, or `None` when the table is full.
    pub(crate) fn insert(&mut self, name: &[u8], inode: InodeIdx) -> Option<usize> {
        let slot = self.slots.iter().position(Option::is_none)?;
        self.slots[slot] = Some(DirEntry::new(name, inode));
        Some(slot)
    }

    /// Clears a slot in place.
    pub(crate) fn clear(&mut self, slot: usize) {
        self.slots[slot] = None;
    }

    pub(crate) fn get(&self, slot: usize) -> Option<&DirEntry> {
        self.slots.get(slot)?.as_ref()
    }

    /// Iterates over `(slot, entry)` pairs of in-use slots.
    pub(crate) fn iter_used(&self) -> impl Iterator<Item = (usize, &DirEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|ent| (slot, ent)))
    }

    /// Number of slots in the table.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
