//! Single-volume simple filesystem over a block-addressable virtual disk.
//!
//! The volume is divided into fixed regions: a superblock at block 0, the
//! inode table right after it, the flat root directory, a free-space
//! bitmap near the end of the disk, and file data in between. Each inode
//! addresses its data through 12 direct block pointers and one
//! single-indirect block, capping files at `B * (12 + B / 4)` bytes for a
//! block size of `B`.
//!
//! [`fs::SimpleFileSystem`] is the core: it owns the in-memory metadata
//! tables and a [`disk::BlockDevice`], and keeps the persisted copies in
//! sync at every API boundary. [`api`] wraps one process-wide instance
//! behind the classic sentinel-returning entry points.
//!
//! ```no_run
//! use sfs::disk::MemDisk;
//! use sfs::fs::{Geometry, SimpleFileSystem};
//!
//! # fn main() -> Result<(), sfs::SfsError> {
//! let geo = Geometry::default();
//! let disk = MemDisk::new(geo.block_size, geo.block_count);
//! let mut fs = SimpleFileSystem::format(disk, geo)?;
//!
//! let fd = fs.open("hello")?;
//! fs.write(fd, b"hello, volume")?;
//! assert_eq!(fs.file_size("hello")?, 13);
//! # Ok(())
//! # }
//! ```
//!
//! The core is single-threaded by design: every entry point runs to
//! completion, and concurrent callers must serialize on the filesystem
//! instance.

pub mod api;
pub mod disk;
pub mod errors;
pub mod fs;

pub use crate::errors::SfsError;
pub use crate::fs::{Geometry, SimpleFileSystem, DIRECT_BLOCKS, MAX_FILENAME, SFS_MAGIC};
