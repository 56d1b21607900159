//! Shared-section region management.
//!
//! The region is a file-backed shared mapping created at the full
//! configured cap up front. The file is sparse, so reserving 300 MiB costs
//! nothing; backing pages materialize when the arena first writes them. The
//! explicit commit watermark advances in [`COMMIT_CHUNK`] steps ahead of the
//! arena cursor and is where the cap is enforced: crossing it past
//! `max_bytes` is the build-abort path.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use memmap2::MmapMut;
use thiserror::Error;
use tracing::{debug, trace};

use ffs_section::layout::{
    RecordHeader, SectionHeader, Status, RECORD_PREFIX_SIZE, SECTION_HEADER_SIZE, SECTION_MAGIC,
    SECTION_VERSION, STATUS_OFFSET,
};
use ffs_section::view::SectionView;
use ffs_section::SectionError;

/// Commit granularity: at least one megabyte per watermark advance.
pub const COMMIT_CHUNK: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("failed to create section mapping at {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("region cap exceeded: need {needed} bytes, cap is {cap}")]
    CapExceeded { needed: usize, cap: usize },
}

/// The owned, writable side of a section mapping. There is exactly one of
/// these per section; readers in other processes map the same file
/// read-only.
pub struct Region {
    mmap: MmapMut,
    committed: usize,
    max_bytes: usize,
}

impl Region {
    /// Create the section file at `path`, reserve `max_bytes` of address
    /// space over it, and write a fresh `Booting` header.
    pub fn create(path: &Path, max_bytes: usize) -> Result<Self, RegionError> {
        let map_err = |source| RegionError::Map {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(map_err)?;
        file.set_len(max_bytes as u64).map_err(map_err)?;

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(map_err)?;
        let mut region = Self {
            mmap,
            committed: 0,
            max_bytes,
        };
        region.ensure_committed(SECTION_HEADER_SIZE)?;
        *region.header_mut() = SectionHeader {
            magic: SECTION_MAGIC,
            version: SECTION_VERSION,
            status: Status::Booting as u32,
            ..SectionHeader::default()
        };
        debug!(path = %path.display(), cap = max_bytes, "section region created");
        Ok(region)
    }

    pub fn base(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    pub fn size(&self) -> usize {
        self.max_bytes
    }

    /// Advance the commit watermark to cover `end` bytes. Idempotent and
    /// monotone; fails when the cap would be crossed.
    pub fn ensure_committed(&mut self, end: usize) -> Result<(), RegionError> {
        if end <= self.committed {
            return Ok(());
        }
        if end > self.max_bytes {
            return Err(RegionError::CapExceeded {
                needed: end,
                cap: self.max_bytes,
            });
        }
        let target = end.div_ceil(COMMIT_CHUNK) * COMMIT_CHUNK;
        self.committed = target.min(self.max_bytes);
        trace!(committed = self.committed, "commit watermark advanced");
        Ok(())
    }

    pub fn header(&self) -> &SectionHeader {
        unsafe { &*(self.mmap.as_ptr() as *const SectionHeader) }
    }

    pub fn header_mut(&mut self) -> &mut SectionHeader {
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut SectionHeader) }
    }

    /// Mutable access to a record's fixed prefix. The caller must have
    /// committed the range (an `alloc` on the arena does).
    pub fn record_mut(&mut self, offset: u32) -> &mut RecordHeader {
        let end = offset as usize + RECORD_PREFIX_SIZE;
        assert!(end <= self.committed, "record prefix outside committed range");
        unsafe { &mut *(self.mmap.as_mut_ptr().add(offset as usize) as *mut RecordHeader) }
    }

    /// Atomic view of a 4-byte-aligned word, for in-place field edits that
    /// concurrent readers may observe.
    pub fn atomic_u32(&self, offset: u32) -> &AtomicU32 {
        let off = offset as usize;
        assert!(off + 4 <= self.committed && off % 4 == 0);
        unsafe { &*(self.mmap.as_ptr().add(off) as *const AtomicU32) }
    }

    /// Release-store the status word; this is the publication point readers
    /// pair their acquire load with.
    pub fn store_status(&self, status: Status) {
        self.atomic_u32(STATUS_OFFSET as u32)
            .store(status as u32, Ordering::Release);
    }

    pub fn load_status(&self) -> Status {
        let raw = self.atomic_u32(STATUS_OFFSET as u32).load(Ordering::Acquire);
        Status::from_raw(raw).unwrap_or(Status::Error)
    }

    pub fn write_u32(&mut self, offset: u32, value: u32) {
        let off = offset as usize;
        self.mmap[off..off + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write UTF-16 code units plus a NUL terminator.
    pub fn write_name(&mut self, offset: u32, units: &[u16]) {
        let start = offset as usize;
        for (i, &u) in units.iter().enumerate() {
            self.mmap[start + 2 * i..start + 2 * i + 2].copy_from_slice(&u.to_le_bytes());
        }
        let nul = start + 2 * units.len();
        self.mmap[nul..nul + 2].copy_from_slice(&[0, 0]);
    }

    /// Read-only view over the mapping, for lookups from the writer process.
    pub fn view(&self) -> Result<SectionView<'_>, SectionError> {
        SectionView::new(&self.mmap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_writes_booting_header() {
        let tmp = tempdir().unwrap();
        let region = Region::create(&tmp.path().join("s.ffs"), COMMIT_CHUNK).unwrap();
        let header = region.header();
        assert_eq!(header.magic, SECTION_MAGIC);
        assert_eq!(header.version, SECTION_VERSION);
        assert_eq!(region.load_status(), Status::Booting);
        assert_eq!(header.num_nodes, 0);
        assert_eq!(header.dir_offset, 0);
    }

    #[test]
    fn commit_watermark_is_monotone_and_capped() {
        let tmp = tempdir().unwrap();
        let mut region = Region::create(&tmp.path().join("s.ffs"), 4 * COMMIT_CHUNK).unwrap();

        region.ensure_committed(10).unwrap();
        region.ensure_committed(COMMIT_CHUNK + 1).unwrap();
        // already covered, no-op
        region.ensure_committed(100).unwrap();

        let err = region.ensure_committed(4 * COMMIT_CHUNK + 1).unwrap_err();
        assert!(matches!(
            err,
            RegionError::CapExceeded { cap, .. } if cap == 4 * COMMIT_CHUNK
        ));
    }

    #[test]
    fn status_store_load_round_trip() {
        let tmp = tempdir().unwrap();
        let region = Region::create(&tmp.path().join("s.ffs"), COMMIT_CHUNK).unwrap();
        for status in [Status::InProgress, Status::Updating, Status::Finished] {
            region.store_status(status);
            assert_eq!(region.load_status(), status);
        }
    }
}
