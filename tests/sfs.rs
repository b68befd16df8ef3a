//! End-to-end scenarios for the simple filesystem: formatting, the data
//! path through direct and indirect blocks, volume exhaustion and
//! recovery, persistence across remounts, and randomized traffic checked
//! against a shadow model.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use sfs::disk::{BlockDevice, FileDisk, MemDisk};
use sfs::fs::{Geometry, SimpleFileSystem};
use sfs::{SfsError, DIRECT_BLOCKS, MAX_FILENAME};

fn fresh_fs() -> SimpleFileSystem<MemDisk> {
    let geo = Geometry::default();
    let disk = MemDisk::new(geo.block_size, geo.block_count);
    SimpleFileSystem::format(disk, geo).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[test]
fn write_then_query_size() {
    let mut fs = fresh_fs();
    let fd = fs.open("a").unwrap();
    assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
    fs.close(fd).unwrap();

    assert_eq!(fs.file_size("a").unwrap(), 5);
    fs.check().unwrap();
}

#[test]
fn two_block_pattern_survives_reopen() {
    let mut fs = fresh_fs();
    let data = pattern(2000);

    let fd = fs.open("a").unwrap();
    assert_eq!(fs.write(fd, &data).unwrap(), 2000);
    fs.close(fd).unwrap();

    let fd = fs.open("a").unwrap();
    let mut back = vec![0u8; 2000];
    assert_eq!(fs.read(fd, &mut back).unwrap(), 2000);
    assert_eq!(back, data);
    fs.check().unwrap();
}

#[test]
fn thirteen_blocks_reach_the_indirect_range() {
    let mut fs = fresh_fs();
    let bs = fs.geometry().block_size;
    let data = pattern(bs * (DIRECT_BLOCKS + 1));

    let fd = fs.open("big").unwrap();
    assert_eq!(fs.write(fd, &data).unwrap(), data.len());
    assert_eq!(fs.file_size("big").unwrap(), data.len());

    fs.rseek(fd, 0).unwrap();
    let mut back = vec![0u8; data.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), data.len());
    assert_eq!(back, data);
    fs.check().unwrap();
}

#[test]
fn write_is_clamped_at_the_maximum_file_size() {
    let mut fs = fresh_fs();
    let max = fs.geometry().max_file_size();
    let data = vec![0x5Au8; max + 100];

    let fd = fs.open("cap").unwrap();
    assert_eq!(fs.write(fd, &data).unwrap(), max);
    assert_eq!(fs.file_size("cap").unwrap(), max);
    // The cursor sits at the cap; further writes clamp to nothing.
    assert_eq!(fs.write(fd, b"more").unwrap(), 0);
    fs.check().unwrap();
}

#[test]
fn filling_the_volume_is_recoverable() {
    let mut fs = fresh_fs();
    let after_format = fs.free_blocks();
    let chunk = vec![0xABu8; 16 * 1024];

    let mut names = Vec::new();
    'fill: for i in 0.. {
        let name = format!("f{i}");
        let fd = fs.open(&name).unwrap();
        names.push(name);
        loop {
            match fs.write(fd, &chunk) {
                Ok(0) => break,
                Ok(_) => {}
                Err(SfsError::NoSpace) => break 'fill,
                Err(err) => panic!("unexpected write failure: {err}"),
            }
        }
        fs.close(fd).unwrap();
    }
    assert!(fs.free_blocks() < after_format);
    fs.check().unwrap();

    // A failed write must not leak its reservation: keep writing single
    // blocks until even those fail.
    let fd = fs.open("last").unwrap();
    let bs = fs.geometry().block_size;
    while fs.write(fd, &chunk[..bs]).is_ok_and(|n| n > 0) {}
    fs.check().unwrap();

    for name in &names {
        fs.remove(name).unwrap();
    }
    fs.remove("last").unwrap();
    assert_eq!(fs.free_blocks(), after_format);

    let fd = fs.open("again").unwrap();
    assert_eq!(fs.write(fd, &chunk).unwrap(), chunk.len());
    fs.check().unwrap();
}

#[test]
fn oversize_names_are_rejected_without_side_effects() {
    let mut fs = fresh_fs();
    let free = fs.free_blocks();
    let name = "x".repeat(MAX_FILENAME + 1);

    assert!(matches!(fs.open(&name), Err(SfsError::NameTooLong)));
    assert_eq!(fs.free_blocks(), free);
    assert!(matches!(fs.file_size(&name), Err(SfsError::NotFound)));
    assert!(fs.next_filename().is_none());
    fs.check().unwrap();

    // A name of exactly the maximum length is fine.
    let fd = fs.open(&"y".repeat(MAX_FILENAME)).unwrap();
    fs.close(fd).unwrap();
}

#[test]
fn enumeration_yields_each_file_once_per_cycle() {
    let mut fs = fresh_fs();
    for name in ["a", "b", "c"] {
        let fd = fs.open(name).unwrap();
        fs.close(fd).unwrap();
    }

    for _ in 0..2 {
        let mut seen = Vec::new();
        while let Some((_, name)) = fs.next_filename() {
            seen.push(name);
        }
        assert_eq!(seen, ["a", "b", "c"]);
    }
}

#[test]
fn enumeration_skips_freed_slots() {
    let mut fs = fresh_fs();
    for name in ["a", "b", "c"] {
        let fd = fs.open(name).unwrap();
        fs.close(fd).unwrap();
    }
    fs.remove("b").unwrap();

    let mut seen = Vec::new();
    while let Some((_, name)) = fs.next_filename() {
        seen.push(name);
    }
    assert_eq!(seen, ["a", "c"]);
}

#[test]
fn open_is_idempotent_and_reopen_appends() {
    let mut fs = fresh_fs();
    let fd = fs.open("notes").unwrap();
    assert_eq!(fs.open("notes").unwrap(), fd);

    fs.write(fd, b"abc").unwrap();
    fs.close(fd).unwrap();

    // A re-open after close starts writing at the end of the file.
    let fd = fs.open("notes").unwrap();
    fs.write(fd, b"def").unwrap();
    assert_eq!(fs.file_size("notes").unwrap(), 6);

    let mut back = [0u8; 6];
    fs.rseek(fd, 0).unwrap();
    assert_eq!(fs.read(fd, &mut back).unwrap(), 6);
    assert_eq!(&back, b"abcdef");
    fs.check().unwrap();
}

#[test]
fn seek_respects_the_file_bounds() {
    let mut fs = fresh_fs();
    let fd = fs.open("s").unwrap();
    fs.write(fd, b"0123456789").unwrap();

    assert!(matches!(
        fs.rseek(fd, 11),
        Err(SfsError::SeekOutOfRange)
    ));
    assert!(matches!(
        fs.wseek(fd, 11),
        Err(SfsError::SeekOutOfRange)
    ));
    fs.rseek(fd, 10).unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 0);

    fs.rseek(fd, 6).unwrap();
    assert_eq!(fs.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"6789");

    fs.close(fd).unwrap();
    assert!(matches!(fs.rseek(fd, 0), Err(SfsError::BadDescriptor)));
}

#[test]
fn overwrite_in_place_preserves_the_tail() {
    let mut fs = fresh_fs();
    let fd = fs.open("o").unwrap();
    fs.write(fd, b"abcdefgh").unwrap();

    fs.wseek(fd, 2).unwrap();
    assert_eq!(fs.write(fd, b"XY").unwrap(), 2);
    assert_eq!(fs.file_size("o").unwrap(), 8);

    fs.rseek(fd, 0).unwrap();
    let mut back = [0u8; 8];
    fs.read(fd, &mut back).unwrap();
    assert_eq!(&back, b"abXYefgh");
    fs.check().unwrap();
}

#[test]
fn overwrite_across_the_block_boundary() {
    let mut fs = fresh_fs();
    let bs = fs.geometry().block_size;
    let data = pattern(3 * bs);

    let fd = fs.open("o").unwrap();
    fs.write(fd, &data).unwrap();

    // Straddle the first block boundary.
    let splice = vec![0xEEu8; bs];
    fs.wseek(fd, bs / 2).unwrap();
    fs.write(fd, &splice).unwrap();

    let mut expected = data.clone();
    expected[bs / 2..bs / 2 + bs].copy_from_slice(&splice);

    fs.rseek(fd, 0).unwrap();
    let mut back = vec![0u8; 3 * bs];
    assert_eq!(fs.read(fd, &mut back).unwrap(), 3 * bs);
    assert_eq!(back, expected);
    fs.check().unwrap();
}

#[test]
fn remove_returns_the_volume_to_its_prior_state() {
    let mut fs = fresh_fs();
    let free = fs.free_blocks();
    let bs = fs.geometry().block_size;

    let fd = fs.open("doomed").unwrap();
    fs.write(fd, &pattern(2 * bs)).unwrap();
    // No close: remove must also retire the open descriptor.
    fs.remove("doomed").unwrap();

    assert_eq!(fs.free_blocks(), free);
    assert!(matches!(fs.file_size("doomed"), Err(SfsError::NotFound)));
    assert!(matches!(fs.read(fd, &mut [0u8; 4]), Err(SfsError::BadDescriptor)));
    assert!(matches!(fs.remove("doomed"), Err(SfsError::NotFound)));
    fs.check().unwrap();
}

#[test]
fn removed_data_blocks_are_zeroed_on_disk() {
    let geo = Geometry::default();
    let disk = MemDisk::new(geo.block_size, geo.block_count);
    let mut fs = SimpleFileSystem::format(disk, geo).unwrap();

    let fd = fs.open("wipe").unwrap();
    fs.write(fd, &vec![0xFFu8; geo.block_size]).unwrap();
    fs.close(fd).unwrap();
    fs.remove("wipe").unwrap();

    let mut disk = fs.unmount().unwrap();
    // The first data block sits right after the directory region.
    let mut block = vec![0u8; geo.block_size];
    disk.read_blocks(12, &mut block).unwrap();
    assert_eq!(block, vec![0u8; geo.block_size]);
}

#[test]
fn capacity_is_one_hundred_files() {
    let mut fs = fresh_fs();
    let max_files = fs.geometry().max_files;
    for i in 0..max_files {
        let fd = fs.open(&format!("f{i}")).unwrap();
        fs.close(fd).unwrap();
    }
    assert!(matches!(fs.open("straw"), Err(SfsError::NoInode)));
    fs.check().unwrap();
}

#[test]
fn persistence_round_trip() {
    let geo = Geometry::default();
    let image = format!("{}/round_trip.disk", env!("CARGO_TARGET_TMPDIR"));
    let bs = geo.block_size;
    let big = pattern(bs * (DIRECT_BLOCKS + 2));

    let disk = FileDisk::create(&image, geo.block_size, geo.block_count).unwrap();
    let mut fs = SimpleFileSystem::format(disk, geo).unwrap();
    let fd = fs.open("small").unwrap();
    fs.write(fd, b"hello").unwrap();
    let fd = fs.open("big").unwrap();
    fs.write(fd, &big).unwrap();
    fs.open("empty").unwrap();
    let free_before = fs.free_blocks();
    fs.unmount().unwrap();

    let disk = FileDisk::open(&image, geo.block_size, geo.block_count).unwrap();
    let mut fs = SimpleFileSystem::mount(disk, geo).unwrap();
    assert_eq!(fs.free_blocks(), free_before);
    assert_eq!(fs.file_size("small").unwrap(), 5);
    assert_eq!(fs.file_size("big").unwrap(), big.len());
    assert_eq!(fs.file_size("empty").unwrap(), 0);

    let fd = fs.open("big").unwrap();
    let mut back = vec![0u8; big.len()];
    assert_eq!(fs.read(fd, &mut back).unwrap(), big.len());
    assert_eq!(back, big);

    let mut names = Vec::new();
    while let Some((_, name)) = fs.next_filename() {
        names.push(name);
    }
    assert_eq!(names, ["small", "big", "empty"]);
    fs.check().unwrap();
}

#[test]
fn foreign_volumes_are_refused() {
    let geo = Geometry::default();
    let image = format!("{}/foreign.disk", env!("CARGO_TARGET_TMPDIR"));

    // A zeroed image carries no signature.
    let disk = FileDisk::create(&image, geo.block_size, geo.block_count).unwrap();
    assert!(matches!(
        SimpleFileSystem::mount(disk, geo),
        Err(SfsError::BadSuperblock)
    ));

    // A formatted image with a clobbered superblock is refused too.
    let disk = FileDisk::create(&image, geo.block_size, geo.block_count).unwrap();
    let fs = SimpleFileSystem::format(disk, geo).unwrap();
    let mut disk = fs.unmount().unwrap();
    disk.write_blocks(0, &vec![0x42u8; geo.block_size]).unwrap();
    assert!(matches!(
        SimpleFileSystem::mount(disk, geo),
        Err(SfsError::BadSuperblock)
    ));
}

#[test]
fn randomized_traffic_matches_a_shadow_model() {
    let mut fs = fresh_fs();
    let mut rng = StdRng::seed_from_u64(0x5F5_0001);
    let names = ["alpha", "beta", "gamma"];
    let mut shadow: Vec<Vec<u8>> = vec![Vec::new(); names.len()];

    for round in 0..300 {
        let which = rng.gen_range(0..names.len());
        let fd = fs.open(names[which]).unwrap();
        let model = &mut shadow[which];

        match rng.gen_range(0..3) {
            // Write a random chunk at a random in-bounds position.
            0 => {
                let pos = rng.gen_range(0..=model.len());
                let mut chunk = vec![0u8; rng.gen_range(1..4096)];
                rng.fill_bytes(&mut chunk);
                // The engine clamps at the maximum file size.
                let expected = chunk.len().min(fs.geometry().max_file_size() - pos);

                fs.wseek(fd, pos).unwrap();
                assert_eq!(fs.write(fd, &chunk).unwrap(), expected);
                if pos + expected > model.len() {
                    model.resize(pos + expected, 0);
                }
                model[pos..pos + expected].copy_from_slice(&chunk[..expected]);
            }
            // Read a random span and compare.
            1 => {
                let pos = rng.gen_range(0..=model.len());
                let mut back = vec![0u8; rng.gen_range(1..4096)];
                let expected = back.len().min(model.len() - pos);

                fs.rseek(fd, pos).unwrap();
                let got = fs.read(fd, &mut back).unwrap();
                assert_eq!(got, expected);
                assert_eq!(&back[..got], &model[pos..pos + got]);
            }
            // Size query.
            _ => {
                assert_eq!(fs.file_size(names[which]).unwrap(), model.len());
            }
        }

        if round % 50 == 0 {
            fs.check().unwrap();
        }
    }
    fs.check().unwrap();
}
