//! Breadth-first tree walk that materializes the record arena.
//!
//! The walk drains one generation of directories completely before starting
//! the next, so records of depth *d* always precede depth *d+1*. Within a
//! directory, records land in enumeration order with the `"."` group-leader
//! first; all records of one directory share the queued parent offset as
//! their group id.

use tracing::{debug, warn};

use ffs_section::hash;
use ffs_section::layout::{
    Status, ATTR_DIRECTORY, ATTR_REPARSE_POINT, ATTR_SYNTHETIC_ROOT, BUCKET_COUNT,
};
use ffs_section::wpath;

use crate::arena::Arena;
use crate::region::{Region, RegionError};
use crate::source::{EntryMeta, TreeSource};

/// Build statistics, logged once the walk completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkStats {
    pub num_nodes: u32,
    pub num_dirs: u32,
    pub reparse_count: u32,
    pub pending_fixes: u32,
}

/// Arena contents plus the per-bucket group-leader offsets the indexer
/// turns into chains.
pub struct WalkOutput {
    pub stats: WalkStats,
    pub buckets: Vec<Vec<u32>>,
}

/// Walk the tree rooted at `root_path` (section namespace), materializing
/// one record per entry. On return the arena is complete, the header counts
/// are published, and the status is `Updating`; the index is not yet
/// installed.
pub fn walk<S: TreeSource>(
    region: &mut Region,
    arena: &mut Arena,
    source: &S,
    root_path: &[u16],
) -> Result<WalkOutput, RegionError> {
    region.store_status(Status::InProgress);

    let mut buckets: Vec<Vec<u32>> = vec![Vec::new(); BUCKET_COUNT];
    let mut stats = WalkStats::default();

    // Synthetic root: terminates every parent chain, carries the full root
    // path as its name so lookup needs no special end-of-chain case.
    let root_offset = arena.alloc(region)?;
    {
        let rec = region.record_mut(root_offset);
        *rec = Default::default();
        rec.attributes = ATTR_SYNTHETIC_ROOT;
        rec.parent_offset = 0;
    }
    arena.seal(region, root_offset, root_path)?;
    region.header_mut().root_offset = root_offset;
    stats.num_nodes += 1;

    let mut pending: Vec<(Vec<u16>, u32)> = vec![(root_path.to_vec(), root_offset)];
    let mut found: Vec<(Vec<u16>, u32)> = Vec::new();

    while !pending.is_empty() {
        for (dir_path, dir_offset) in &pending {
            let entries = match source.enumerate(dir_path) {
                Ok(entries) => entries,
                Err(e) => {
                    stats.pending_fixes += 1;
                    debug!(path = %wpath::decode(dir_path), error = %e, "enumeration failed");
                    continue;
                }
            };

            let mut entries = entries.into_iter();
            let Some(self_entry) = entries.next() else {
                stats.pending_fixes += 1;
                warn!(path = %wpath::decode(dir_path), "enumeration yielded no self entry");
                continue;
            };
            debug_assert!(
                wpath::is_dot(&self_entry.name),
                "enumeration must yield the \".\" self entry first"
            );

            // Group-leader: the bucket chain will point here, keyed by the
            // hash of this directory's own full path.
            let leader_offset = append_record(region, arena, &self_entry, *dir_offset)?;
            stats.num_nodes += 1;
            stats.num_dirs += 1;
            let bucket = hash::bucket_of(hash::hash_path(dir_path));
            buckets[bucket].push(leader_offset);

            for entry in entries {
                if wpath::is_dot(&entry.name) || wpath::is_dot_dot(&entry.name) {
                    continue;
                }
                let offset = append_record(region, arena, &entry, *dir_offset)?;
                stats.num_nodes += 1;

                if entry.attributes & ATTR_REPARSE_POINT != 0 {
                    stats.reparse_count += 1;
                } else if entry.attributes & ATTR_DIRECTORY != 0
                    && wpath::accept_dir_name(&entry.name)
                {
                    found.push((wpath::join(dir_path, &entry.name), offset));
                }
            }
        }

        // Generation swap: depth d is fully drained before depth d+1 starts.
        pending.clear();
        std::mem::swap(&mut pending, &mut found);
    }

    let bytes = arena.cursor();
    let header = region.header_mut();
    header.bytes = bytes;
    header.num_nodes = stats.num_nodes;
    header.num_dirs = stats.num_dirs;
    region.store_status(Status::Updating);

    Ok(WalkOutput { stats, buckets })
}

fn append_record(
    region: &mut Region,
    arena: &mut Arena,
    meta: &EntryMeta,
    parent_offset: u32,
) -> Result<u32, RegionError> {
    let offset = arena.alloc(region)?;
    let rec = region.record_mut(offset);
    rec.attributes = meta.attributes;
    rec.creation_time_lo = meta.creation_time as u32;
    rec.creation_time_hi = (meta.creation_time >> 32) as u32;
    rec.last_access_time_lo = meta.last_access_time as u32;
    rec.last_access_time_hi = (meta.last_access_time >> 32) as u32;
    rec.last_write_time_lo = meta.last_write_time as u32;
    rec.last_write_time_hi = (meta.last_write_time >> 32) as u32;
    rec.set_file_size(meta.size);
    rec.parent_offset = parent_offset;
    rec.record_stride = 0; // seal fills this in
    arena.seal(region, offset, &meta.name)?;
    Ok(offset)
}
