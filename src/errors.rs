//! Error types raised by the filesystem and its block device adapter.
//!
//! Every fallible operation returns one of the variants below; the C-shaped
//! facade in [`crate::api`] is the only place where these are folded back
//! into sentinel return values.

use thiserror::Error;

/// `CanFail` is a return type for functions that are allowed to fail, and don't need to return
/// anything.
///
/// Metadata flush routines are the main users: they either complete or
/// surface the underlying device failure.
pub type CanFail<E> = Result<(), E>;

/// Errors raised by filesystem operations.
#[derive(Debug, Error)]
pub enum SfsError {
    /// I/O failure reported by the backing block device.
    #[error("block device i/o failure: {0}")]
    Disk(#[from] std::io::Error),

    /// A block range was out of bounds, or a buffer was not a whole number
    /// of blocks. Callers of the adapter always operate on whole blocks.
    #[error("invalid block range or unaligned buffer")]
    BadBlockRange,

    /// The volume's superblock does not carry the expected signature or
    /// geometry. The volume is refused.
    #[error("superblock signature or geometry mismatch")]
    BadSuperblock,

    /// The device's geometry does not match the one the volume was asked to
    /// use.
    #[error("device geometry does not match the volume geometry")]
    GeometryMismatch,

    /// No free data block is left on the volume.
    #[error("no free block on the volume")]
    NoSpace,

    /// Every inode slot is in use.
    #[error("inode table is full")]
    NoInode,

    /// Every directory slot is in use.
    #[error("root directory is full")]
    DirFull,

    /// Every open-file slot is in use.
    #[error("open file table is full")]
    FdTableFull,

    /// The file name exceeds the fixed maximum length.
    #[error("file name too long")]
    NameTooLong,

    /// The descriptor does not refer to an open file.
    #[error("descriptor is not open")]
    BadDescriptor,

    /// A seek offset lies past the end of the file.
    #[error("offset past end of file")]
    SeekOutOfRange,

    /// No directory entry carries the requested name.
    #[error("no such file")]
    NotFound,

    /// On-disk metadata contradicts itself (e.g. a file large enough to
    /// need an indirect block without one recorded).
    #[error("volume metadata is inconsistent")]
    Corrupted,
}
