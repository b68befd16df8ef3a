//! Free-space bitmap.
//!
//! One bit per block on the volume: set means allocated, clear means free.
//! Allocation is first-fit by ascending block index, which is observable
//! through the API since blocks freed by a removal are handed out again in
//! index order.
//!
//! The on-disk form is one byte per block (zero or one), padded with
//! zeroes to fill the bitmap region.

use vob::Vob;

use crate::fs::inode::BlockId;

/// In-memory free-space bitmap of the whole volume.
pub(crate) struct BlockBitmap(Vob);

impl BlockBitmap {
    /// Creates an all-free bitmap covering `block_count` blocks.
    pub(crate) fn new(block_count: usize) -> Self {
        let mut bits = Vob::new();
        bits.resize(block_count, false);
        Self(bits)
    }

    /// Rebuilds a bitmap from its on-disk byte form.
    ///
    /// `bytes` must hold at least `block_count` entries; trailing padding
    /// is ignored.
    pub(crate) fn from_bytes(bytes: &[u8], block_count: usize) -> Self {
        let mut map = Self::new(block_count);
        for (blk, &b) in bytes.iter().take(block_count).enumerate() {
            if b != 0 {
                map.0.set(blk, true);
            }
        }
        map
    }

    /// Writes the on-disk byte form into `out`, zero-filling the padding.
    pub(crate) fn to_bytes(&self, out: &mut [u8]) {
        out.fill(0);
        for blk in self.0.iter_set_bits(..) {
            out[blk] = 1;
        }
    }

    /// Claims the lowest-index free block, if any.
    pub(crate) fn allocate(&mut self) -> Option<BlockId> {
        let blk = self.0.iter_unset_bits(..).next()?;
        self.0.set(blk, true);
        Some(BlockId::new(blk))
    }

    /// Marks a block free again. Releasing an already-free block is a
    /// no-op.
    pub(crate) fn release(&mut self, blk: BlockId) {
        self.0.set(blk.index(), false);
    }

    /// Marks a specific block as allocated; used for the fixed metadata
    /// regions at format time.
    pub(crate) fn reserve(&mut self, blk: usize) {
        self.0.set(blk, true);
    }

    /// Checks whether a block is currently allocated.
    pub(crate) fn is_allocated(&self, blk: usize) -> bool {
        self.0.get(blk).unwrap_or(false)
    }

    /// Number of free blocks left on the volume.
    pub(crate) fn free_count(&self) -> usize {
        self.0.iter_unset_bits(..).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_ascending() {
        let mut map = BlockBitmap::new(8);
        map.reserve(0);
        map.reserve(2);

        assert_eq!(map.allocate(), Some(BlockId::new(1)));
        assert_eq!(map.allocate(), Some(BlockId::new(3)));
        assert_eq!(map.allocate(), Some(BlockId::new(4)));
    }

    #[test]
    fn released_blocks_are_reused_in_index_order() {
        let mut map = BlockBitmap::new(4);
        for _ in 0..4 {
            map.allocate().unwrap();
        }
        assert_eq!(map.allocate(), None);

        map.release(BlockId::new(2));
        map.release(BlockId::new(1));
        assert_eq!(map.allocate(), Some(BlockId::new(1)));
        assert_eq!(map.allocate(), Some(BlockId::new(2)));
        assert_eq!(map.allocate(), None);
    }

    #[test]
    fn release_is_idempotent() {
        let mut map = BlockBitmap::new(4);
        map.allocate().unwrap();
        map.release(BlockId::new(0));
        map.release(BlockId::new(0));
        assert_eq!(map.free_count(), 4);
    }

    #[test]
    fn byte_form_round_trip() {
        let mut map = BlockBitmap::new(10);
        map.reserve(0);
        map.reserve(7);
        map.reserve(9);

        let mut bytes = [0xFFu8; 16];
        map.to_bytes(&mut bytes);
        assert_eq!(&bytes[..10], &[1, 0, 0, 0, 0, 0, 0, 1, 0, 1]);
        assert_eq!(&bytes[10..], &[0; 6]);

        let back = BlockBitmap::from_bytes(&bytes, 10);
        for blk in 0..10 {
            assert_eq!(back.is_allocated(blk), map.is_allocated(blk));
        }
    }
}
