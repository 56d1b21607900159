//! In-place mutation of the section in response to change events.
//!
//! The applier is the only writer after the build. Each batch is bracketed
//! by `Updating` / `Finished` release stores; individual field edits are
//! aligned atomic stores, so a reader sees each field either old or new,
//! never torn. Record offsets never change here; structural churn the
//! in-place paths cannot express is counted in `needs_rebuild` instead.

use std::sync::atomic::Ordering;

use tracing::debug;

use ffs_section::layout::{record_field, stride_for_name, Status, RECORD_NAME_OFFSET};
use ffs_section::{resolver, wpath};

use crate::region::Region;
use crate::source::{EntryMeta, TreeSource};
use crate::watch::{ChangeAction, ChangeEvent};

pub struct ChangeApplier<'r, S> {
    region: &'r mut Region,
    source: &'r S,
    /// Offset stashed by a `RenamedOld` awaiting its `RenamedNew`.
    pending_rename: Option<u32>,
    needs_rebuild: u64,
}

impl<'r, S: TreeSource> ChangeApplier<'r, S> {
    pub fn new(region: &'r mut Region, source: &'r S) -> Self {
        Self {
            region,
            source,
            pending_rename: None,
            needs_rebuild: 0,
        }
    }

    /// Changes the in-place paths could not express; once this moves, the
    /// snapshot needs a rebuild to be structurally faithful again.
    pub fn needs_rebuild(&self) -> u64 {
        self.needs_rebuild
    }

    /// Apply one batch of events under an `Updating` bracket.
    pub fn apply_batch(&mut self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }
        self.begin_update();
        for event in events {
            self.apply_one(event);
        }
        self.end_update();
        debug!(
            count = events.len(),
            needs_rebuild = self.needs_rebuild,
            "change batch applied"
        );
    }

    pub(crate) fn begin_update(&self) {
        debug_assert_eq!(
            self.region.load_status(),
            Status::Finished,
            "update bracket opened on an unpublished section"
        );
        self.region.store_status(Status::Updating);
    }

    pub(crate) fn end_update(&self) {
        self.region.store_status(Status::Finished);
    }

    fn apply_one(&mut self, event: &ChangeEvent) {
        match event.action {
            ChangeAction::Modified => self.apply_modified(&event.path),
            ChangeAction::Removed => self.apply_removed(&event.path),
            ChangeAction::RenamedOld => {
                self.pending_rename = self.resolve(&event.path);
            }
            ChangeAction::RenamedNew => self.apply_renamed_new(&event.path),
            ChangeAction::Added => {
                // TODO: append a record to the arena and splice it into the
                // parent group (plus its bucket chain for directories).
                // Until that write path exists, an add means the snapshot
                // has drifted.
                self.needs_rebuild += 1;
                debug!(path = %wpath::decode(&event.path), "structural add deferred to rebuild");
            }
        }
    }

    fn resolve(&self, path: &[u16]) -> Option<u32> {
        let view = self.region.view().ok()?;
        resolver::resolve_any(&view, path)
    }

    /// Re-stat the path and refresh time and size fields that differ.
    fn apply_modified(&mut self, path: &[u16]) {
        let Some(offset) = self.resolve(path) else {
            debug!(path = %wpath::decode(path), "modified path not in snapshot");
            return;
        };
        let meta = match self.source.probe(path) {
            Ok(meta) => meta,
            Err(e) => {
                debug!(path = %wpath::decode(path), error = %e, "probe failed");
                return;
            }
        };
        self.refresh_fields(offset, &meta);
    }

    fn refresh_fields(&self, offset: u32, meta: &EntryMeta) {
        let Ok(view) = self.region.view() else { return };
        let Some(rec) = view.record(offset) else { return };
        let size = rec.size;
        let write_time = rec.last_write_time;
        let access_time = rec.last_access_time;
        let creation_time = rec.creation_time;
        drop(view);

        let store = |field: u32, value: u32| {
            self.region
                .atomic_u32(offset + field)
                .store(value, Ordering::Release);
        };
        if size != meta.size {
            store(record_field::SIZE_LO, meta.size as u32);
            store(record_field::SIZE_HI, (meta.size >> 32) as u32);
        }
        if write_time != meta.last_write_time {
            store(record_field::LAST_WRITE_TIME_LO, meta.last_write_time as u32);
            store(
                record_field::LAST_WRITE_TIME_HI,
                (meta.last_write_time >> 32) as u32,
            );
        }
        if access_time != meta.last_access_time {
            store(
                record_field::LAST_ACCESS_TIME_LO,
                meta.last_access_time as u32,
            );
            store(
                record_field::LAST_ACCESS_TIME_HI,
                (meta.last_access_time >> 32) as u32,
            );
        }
        if creation_time != meta.creation_time {
            store(record_field::CREATION_TIME_LO, meta.creation_time as u32);
            store(record_field::CREATION_TIME_HI, (meta.creation_time >> 32) as u32);
        }
    }

    /// Tombstone: clear the attribute bits, keep the slot. Neighbors reach
    /// past it by stride, so the offset must stay.
    fn apply_removed(&mut self, path: &[u16]) {
        let Some(offset) = self.resolve(path) else {
            debug!(path = %wpath::decode(path), "removed path not in snapshot");
            return;
        };
        self.region
            .atomic_u32(offset + record_field::ATTRIBUTES)
            .store(0, Ordering::Release);
        debug!(path = %wpath::decode(path), offset, "record tombstoned");
    }

    /// Rewrite the name in place when the new one fits the existing slot;
    /// a longer name cannot move the record, so it defers to a rebuild.
    fn apply_renamed_new(&mut self, path: &[u16]) {
        let Some(offset) = self.pending_rename.take() else {
            self.needs_rebuild += 1;
            debug!(path = %wpath::decode(path), "rename target without resolved source");
            return;
        };
        let Some((_, leaf)) = wpath::split_leaf(path) else {
            return;
        };
        let stride = match self.region.view().ok().and_then(|v| v.record(offset)) {
            Some(rec) => rec.record_stride,
            None => return,
        };
        if stride_for_name(leaf.len()) <= stride {
            self.region.write_name(offset + RECORD_NAME_OFFSET, leaf);
            debug!(path = %wpath::decode(path), offset, "record renamed in place");
        } else {
            self.needs_rebuild += 1;
            debug!(path = %wpath::decode(path), offset, "rename does not fit slot");
        }
    }
}
