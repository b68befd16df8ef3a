//! Single-volume facade with the classic C-shaped entry points.
//!
//! The core keeps all state in a [`SimpleFileSystem`] instance; this
//! module preserves the historical API for clients that expect one
//! process-wide volume and sentinel return values. `mksfs` formats or
//! mounts the default disk image in the working directory, and every
//! other call forwards to the mounted instance, folding errors into the
//! sentinels: `-1` (or `0` for the data path) on failure.

use lazy_static::lazy_static;
use spin::Mutex;

use crate::disk::FileDisk;
use crate::fs::{Geometry, SimpleFileSystem};

/// Name of the disk image backing the facade volume.
pub const DISK_IMAGE: &str = "CCdisk.disk";

lazy_static! {
    static ref VOLUME: Mutex<Option<SimpleFileSystem<FileDisk>>> = Mutex::new(None);
}

/// Runs `op` against the mounted volume, or returns `unmounted` when
/// `mksfs` has not succeeded yet.
fn with_volume<T>(op: impl FnOnce(&mut SimpleFileSystem<FileDisk>) -> T, unmounted: T) -> T {
    match VOLUME.lock().as_mut() {
        Some(fs) => op(fs),
        None => unmounted,
    }
}

/// Formats (`fresh`) or re-mounts the default disk image.
///
/// Returns 0 on success, -1 if the image cannot be prepared or the volume
/// is refused.
pub fn mksfs(fresh: bool) -> i32 {
    let geo = Geometry::default();
    let result = if fresh {
        FileDisk::create(DISK_IMAGE, geo.block_size, geo.block_count)
            .and_then(|disk| SimpleFileSystem::format(disk, geo))
    } else {
        FileDisk::open(DISK_IMAGE, geo.block_size, geo.block_count)
            .and_then(|disk| SimpleFileSystem::mount(disk, geo))
    };

    match result {
        Ok(fs) => {
            *VOLUME.lock() = Some(fs);
            0
        }
        Err(err) => {
            log::error!(target: "sfs", "mksfs failed: {err}");
            -1
        }
    }
}

/// Opens (or creates) `name`. Returns a descriptor, or -1 on an oversize
/// name or a full table.
pub fn sfs_fopen(name: &str) -> i32 {
    with_volume(
        |fs| match fs.open(name) {
            Ok(fd) => fd as i32,
            Err(_) => -1,
        },
        -1,
    )
}

/// Closes a descriptor. Returns 0, or -1 if it was not open.
pub fn sfs_fclose(fd: i32) -> i32 {
    with_volume(
        |fs| {
            if fd < 0 {
                return -1;
            }
            match fs.close(fd as usize) {
                Ok(()) => 0,
                Err(_) => -1,
            }
        },
        -1,
    )
}

/// Moves the read cursor. Returns 0, or -1 on a closed descriptor or an
/// offset outside the file.
pub fn sfs_frseek(fd: i32, loc: i32) -> i32 {
    with_volume(
        |fs| {
            if fd < 0 || loc < 0 {
                return -1;
            }
            match fs.rseek(fd as usize, loc as usize) {
                Ok(()) => 0,
                Err(_) => -1,
            }
        },
        -1,
    )
}

/// Moves the write cursor. Same contract as [`sfs_frseek`].
pub fn sfs_fwseek(fd: i32, loc: i32) -> i32 {
    with_volume(
        |fs| {
            if fd < 0 || loc < 0 {
                return -1;
            }
            match fs.wseek(fd as usize, loc as usize) {
                Ok(()) => 0,
                Err(_) => -1,
            }
        },
        -1,
    )
}

/// Writes `buf` at the write cursor. Returns the number of bytes written
/// (possibly clamped at the maximum file size), or 0 on a closed
/// descriptor or a full volume.
pub fn sfs_fwrite(fd: i32, buf: &[u8]) -> i32 {
    with_volume(
        |fs| {
            if fd < 0 {
                return 0;
            }
            match fs.write(fd as usize, buf) {
                Ok(written) => written as i32,
                Err(_) => 0,
            }
        },
        0,
    )
}

/// Reads into `buf` from the read cursor. Returns the number of bytes
/// read (clamped at end of file), or 0 on a closed descriptor or an empty
/// file.
pub fn sfs_fread(fd: i32, buf: &mut [u8]) -> i32 {
    with_volume(
        |fs| {
            if fd < 0 {
                return 0;
            }
            match fs.read(fd as usize, buf) {
                Ok(read) => read as i32,
                Err(_) => 0,
            }
        },
        0,
    )
}

/// Removes the named file. Returns 0, or -1 if it does not exist.
pub fn sfs_remove(name: &str) -> i32 {
    with_volume(
        |fs| match fs.remove(name) {
            Ok(()) => 0,
            Err(_) => -1,
        },
        -1,
    )
}

/// Copies the next file name of the enumeration cycle into `fname` and
/// returns its directory slot; returns 0 once the cycle is complete.
pub fn sfs_getnextfilename(fname: &mut String) -> i32 {
    with_volume(
        |fs| match fs.next_filename() {
            Some((slot, name)) => {
                fname.clear();
                fname.push_str(&name);
                slot as i32
            }
            None => 0,
        },
        0,
    )
}

/// Returns the size in bytes of the named file, or -1 if it does not
/// exist.
pub fn sfs_getfilesize(path: &str) -> i32 {
    with_volume(
        |fs| match fs.file_size(path) {
            Ok(size) => size as i32,
            Err(_) => -1,
        },
        -1,
    )
}
