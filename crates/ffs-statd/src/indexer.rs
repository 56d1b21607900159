//! Installs the bucket chains and directory index, then publishes.
//!
//! Write order matters: sentinel, chains, index header, `dir_offset`, and
//! only then the `Finished` status with a release store. A reader that
//! observes `Finished` therefore sees every index byte.

use tracing::debug;

use ffs_section::layout::{Status, BUCKET_COUNT, DIR_INDEX_BUCKETS_OFFSET, INDEX_ALIGN};

use crate::arena::{align_up, Arena};
use crate::region::{Region, RegionError};

/// Append the directory index past the arena and flip the section to
/// `Finished`. Returns the index header's offset.
pub fn install(
    region: &mut Region,
    arena: &mut Arena,
    buckets: &[Vec<u32>],
) -> Result<u32, RegionError> {
    debug_assert_eq!(buckets.len(), BUCKET_COUNT);

    let mut cursor = arena.finish(region)?;

    // One chain per bucket, in bucket order, each zero-terminated; empty
    // buckets still get their terminator so every head is a valid chain.
    let mut heads = vec![0u32; BUCKET_COUNT];
    for (bucket, chain) in buckets.iter().enumerate() {
        heads[bucket] = cursor;
        let end = cursor + 4 * (chain.len() as u32 + 1);
        region.ensure_committed(end as usize)?;
        for &leader_offset in chain {
            region.write_u32(cursor, leader_offset);
            cursor += 4;
        }
        region.write_u32(cursor, 0);
        cursor += 4;
    }

    let index_offset = align_up(cursor, INDEX_ALIGN);
    let index_end = index_offset + DIR_INDEX_BUCKETS_OFFSET + 4 * BUCKET_COUNT as u32;
    region.ensure_committed(index_end as usize)?;

    let num_dirs = region.header().num_dirs;
    region.write_u32(index_offset, num_dirs);
    for (bucket, &head) in heads.iter().enumerate() {
        region.write_u32(
            index_offset + DIR_INDEX_BUCKETS_OFFSET + 4 * bucket as u32,
            head,
        );
    }

    dispersion_check(buckets, num_dirs);

    region.header_mut().dir_offset = index_offset;
    region.store_status(Status::Finished);
    debug!(index_offset, num_dirs, "directory index installed");

    Ok(index_offset)
}

/// Developer-time sanity check on hash dispersion. Only meaningful for
/// trees large enough that the expected chain length clears the lower band;
/// small trees would trip it vacuously.
fn dispersion_check(buckets: &[Vec<u32>], num_dirs: u32) {
    if cfg!(debug_assertions) && num_dirs as usize >= BUCKET_COUNT * 5 {
        let heavy = buckets.iter().filter(|chain| chain.len() > 67).count();
        let light = buckets.iter().filter(|chain| chain.len() < 5).count();
        debug_assert!(heavy < 10, "hash dispersion: {heavy} buckets over 67 entries");
        debug_assert!(light < 10, "hash dispersion: {light} buckets under 5 entries");
    }
}
