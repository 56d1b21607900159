//! Path resolution over a finished section.
//!
//! Lookup is pure pointer arithmetic over the mapped bytes: hash the query
//! path into a bucket, walk the bucket's chain of directory group-leaders,
//! and verify a candidate by climbing its parent chain while peeling
//! components off the query's tail. File lookups then scan the directory's
//! contiguous record group for the leaf name.

use crate::hash;
use crate::view::{Record, SectionView, MAX_CHAIN_DEPTH};
use crate::wpath;

/// Resolve an absolute directory path (no trailing separator) to the offset
/// of its group-leader record.
pub fn resolve_directory(view: &SectionView, path: &[u16]) -> Option<u32> {
    if !view.ready() {
        return None;
    }
    let bucket = hash::bucket_of(hash::hash_path(path));
    for leader_off in view.bucket_chain(bucket) {
        let Some(leader) = view.record(leader_off) else {
            continue;
        };
        if matches_dir_chain(view, leader.parent_offset, path) {
            return Some(leader_off);
        }
    }
    None
}

/// Resolve an absolute path naming a directory (with or without trailing
/// separator) or a file.
pub fn resolve_any(view: &SectionView, path: &[u16]) -> Option<u32> {
    if !wpath::is_drive_qualified(path) {
        return None;
    }
    if let [head @ .., last] = path {
        if *last == wpath::SEP {
            return resolve_directory(view, head);
        }
    }
    let (dir, leaf) = wpath::split_leaf(path)?;
    let leader_off = resolve_directory(view, dir)?;
    let leader = view.record(leader_off)?;
    find_in_group(view, &leader, leaf)
}

/// Climb the parent chain starting at `parent_off`, matching components from
/// the tail of `path`. The chain ends at the synthetic root, whose name is
/// the full enumeration-root path and must match what is left exactly.
fn matches_dir_chain(view: &SectionView, parent_off: u32, path: &[u16]) -> bool {
    let mut cur = path;
    let mut off = parent_off;
    for _ in 0..MAX_CHAIN_DEPTH {
        let Some(rec) = view.record(off) else {
            return false;
        };
        debug_assert!(
            rec.is_directory() || rec.is_synthetic_root(),
            "parent chain reached a non-directory record at offset {off}"
        );
        let name = view.name_bytes(&rec);
        if rec.parent_offset == 0 {
            return wpath::eq_raw(cur, name);
        }
        if !wpath::ends_with_raw(cur, name) {
            return false;
        }
        let keep = cur.len() - name.len() / 2;
        if keep == 0 || cur[keep - 1] != wpath::SEP {
            return false;
        }
        cur = &cur[..keep - 1];
        off = rec.parent_offset;
    }
    false
}

/// Scan a directory's record group for `leaf`. The group starts just past
/// the leader and ends at the first record with a different group id (or the
/// arena end). Tombstoned entries never match.
fn find_in_group(view: &SectionView, leader: &Record, leaf: &[u16]) -> Option<u32> {
    let group_id = leader.parent_offset;
    let arena_end = view.header().bytes;
    let mut off = leader.next_offset();
    while off < arena_end {
        let rec = view.record(off)?;
        if rec.parent_offset != group_id {
            break;
        }
        if !rec.is_tombstone() && wpath::eq_raw(leaf, view.name_bytes(&rec)) {
            return Some(off);
        }
        off = rec.next_offset();
    }
    None
}
