//! Read/write engine.
//!
//! A `(descriptor, cursor, length)` request is turned into a span of
//! whole-block transfers. Writes are read-modify-write: the blocks of the
//! existing file that overlap the span are read into a block-granular
//! buffer, the caller's bytes are copied in at the cursor offset, and the
//! whole span is written back through the inode's direct or indirect
//! pointers. Growth allocates every needed block up front and releases
//! the whole reservation if the volume runs out, so a failed write never
//! leaves half-assigned pointers behind.

use crate::disk::BlockDevice;
use crate::errors::SfsError;
use crate::fs::inode::{data_block, DIRECT_BLOCKS};
use crate::fs::{FsResult, SimpleFileSystem};

impl<D: BlockDevice> SimpleFileSystem<D> {
    /// Writes `buf` at the descriptor's write cursor, growing the file as
    /// needed.
    ///
    /// The write is clamped so the file never exceeds the volume's
    /// maximum file size; the clamped byte count is returned. On success
    /// the write cursor moves to the end of the written span and the
    /// inode table and bitmap are flushed.
    ///
    /// # Errors
    ///
    /// [`SfsError::BadDescriptor`] on a closed descriptor,
    /// [`SfsError::NoSpace`] when the volume cannot hold the grown file
    /// (no block is allocated in that case), [`SfsError::Disk`] on I/O
    /// failure.
    pub fn write(&mut self, fd: usize, buf: &[u8]) -> FsResult<usize> {
        let of = *self.fds.get(fd).ok_or(SfsError::BadDescriptor)?;
        let bs = self.geo.block_size;
        let ino = *self.inodes.get(of.inode);

        // Clamp against the maximum file size.
        let len = buf.len().min(self.geo.max_file_size() - of.write_pos);
        if len == 0 {
            return Ok(0);
        }
        let end = of.write_pos + len;

        let current_blocks = ino.held_blocks(bs);
        let end_blocks = end.div_ceil(bs);

        // Load or reserve the indirect block before any data block, so
        // block numbers are handed out in the same order files grow.
        let mut indirect = match ino.indirect {
            Some(blk) => self.read_indirect(blk)?,
            None => vec![None; self.geo.indirect_slots()],
        };
        let mut new_indirect = None;
        if end_blocks > DIRECT_BLOCKS && current_blocks <= DIRECT_BLOCKS {
            let Some(blk) = self.bitmap.allocate() else {
                log::warn!(target: "sfs", "write failed: no block left for the indirect block");
                return Err(SfsError::NoSpace);
            };
            new_indirect = Some(blk);
        }

        // Reserve every new data block; on shortfall release the whole
        // reservation and fail without touching the inode.
        let mut reserved = Vec::with_capacity(end_blocks.saturating_sub(current_blocks));
        for _ in current_blocks..end_blocks {
            match self.bitmap.allocate() {
                Some(blk) => reserved.push(blk),
                None => {
                    for blk in reserved {
                        self.bitmap.release(blk);
                    }
                    if let Some(blk) = new_indirect {
                        self.bitmap.release(blk);
                    }
                    log::warn!(
                        target: "sfs",
                        "write failed: volume full while growing to {end_blocks} blocks"
                    );
                    return Err(SfsError::NoSpace);
                }
            }
        }

        // The reservation is complete; assign the pointers.
        let mut ino = ino;
        if let Some(blk) = new_indirect {
            ino.indirect = Some(blk);
        }
        for (blk, index) in reserved.into_iter().zip(current_blocks..end_blocks) {
            if index < DIRECT_BLOCKS {
                ino.direct[index] = Some(blk);
            } else {
                indirect[index - DIRECT_BLOCKS] = Some(blk);
            }
        }

        // Read-modify-write over the span of touched blocks.
        let start_block = of.write_pos / bs;
        let offset = of.write_pos % bs;
        let mut span = vec![0u8; (end_blocks - start_block) * bs];
        for index in start_block..current_blocks.min(end_blocks) {
            let blk = data_block(&ino, index, &indirect).ok_or(SfsError::Corrupted)?;
            let at = (index - start_block) * bs;
            self.read_block(blk, &mut span[at..at + bs])?;
        }
        span[offset..offset + len].copy_from_slice(&buf[..len]);
        for index in start_block..end_blocks {
            let blk = data_block(&ino, index, &indirect).ok_or(SfsError::Corrupted)?;
            let at = (index - start_block) * bs;
            self.write_block(blk, &span[at..at + bs])?;
        }

        // Commit metadata: size, cursor, indirect block, then the
        // persistent tables.
        ino.size = ino.size.max(end);
        *self.inodes.get_mut(of.inode) = ino;
        if let Some(of) = self.fds.get_mut(fd) {
            of.write_pos = end;
        }
        if let Some(blk) = ino.indirect {
            self.write_indirect(blk, &indirect)?;
        }
        self.flush_inodes()?;
        self.flush_bitmap()?;
        Ok(len)
    }

    /// Reads up to `buf.len()` bytes at the descriptor's read cursor.
    ///
    /// The read is clamped at end of file; the number of bytes copied is
    /// returned and the read cursor advances by the same amount. An empty
    /// file always reads 0 bytes.
    ///
    /// # Errors
    ///
    /// [`SfsError::BadDescriptor`] on a closed descriptor,
    /// [`SfsError::Disk`] on I/O failure.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> FsResult<usize> {
        let of = *self.fds.get(fd).ok_or(SfsError::BadDescriptor)?;
        let ino = *self.inodes.get(of.inode);
        if ino.size == 0 {
            return Ok(0);
        }

        let bs = self.geo.block_size;
        let len = buf.len().min(ino.size - of.read_pos);
        if len == 0 {
            return Ok(0);
        }

        let start_block = of.read_pos / bs;
        let offset = of.read_pos % bs;
        let last_block = (of.read_pos + len).div_ceil(bs);

        let indirect = if ino.held_blocks(bs) > DIRECT_BLOCKS {
            let blk = ino.indirect.ok_or(SfsError::Corrupted)?;
            self.read_indirect(blk)?
        } else {
            Vec::new()
        };

        let mut span = vec![0u8; (last_block - start_block) * bs];
        for index in start_block..last_block {
            let blk = data_block(&ino, index, &indirect).ok_or(SfsError::Corrupted)?;
            let at = (index - start_block) * bs;
            self.read_block(blk, &mut span[at..at + bs])?;
        }
        buf[..len].copy_from_slice(&span[offset..offset + len]);

        if let Some(of) = self.fds.get_mut(fd) {
            of.read_pos += len;
        }
        Ok(len)
    }
}
