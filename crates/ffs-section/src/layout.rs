//! Byte layout of the shared section.
//!
//! These types define the on-wire layout consumed by external readers. Any
//! field change here MUST maintain `#[repr(C)]` ABI stability and bump
//! [`SECTION_VERSION`].

/// Section magic number.
pub const SECTION_MAGIC: u32 = 0x8855BED;

/// Section format version. Bump on incompatible changes.
pub const SECTION_VERSION: u32 = 1;

/// Number of hash buckets in the directory index. Prime, for dispersion.
pub const BUCKET_COUNT: usize = 1543;

/// Word delimiting the record arena from the bucket chains.
pub const INDEX_SENTINEL: u32 = 0xAA55_AA55;

/// Every record starts on an 8-byte boundary.
pub const RECORD_ALIGN: u32 = 8;

/// The sentinel and the directory index header start on 16-byte boundaries.
pub const INDEX_ALIGN: u32 = 16;

// ---------------------------------------------------------------------------
// Attribute bits
// ---------------------------------------------------------------------------

/// Entry is a directory.
pub const ATTR_DIRECTORY: u32 = 0x0000_0010;
/// Plain file with no other attributes.
pub const ATTR_NORMAL: u32 = 0x0000_0080;
/// Entry is a reparse point (symlink); never enumerated into.
pub const ATTR_REPARSE_POINT: u32 = 0x0000_0400;
/// All bits set marks the synthetic root record.
pub const ATTR_SYNTHETIC_ROOT: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Status word
// ---------------------------------------------------------------------------

/// Publication state of the section.
///
/// Readers may trust the navigational structures only after observing
/// `Finished` or `Updating` (acquire load); `Updating` means the index is
/// consistent but individual record fields may be mid-edit.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Booting = 0,
    InProgress = 1,
    Error = 2,
    Updating = 3,
    Finished = 4,
    Frozen = 5,
}

impl Status {
    pub fn from_raw(raw: u32) -> Option<Status> {
        match raw {
            0 => Some(Status::Booting),
            1 => Some(Status::InProgress),
            2 => Some(Status::Error),
            3 => Some(Status::Updating),
            4 => Some(Status::Finished),
            5 => Some(Status::Frozen),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SectionHeader — first 32 bytes of the mapping
// ---------------------------------------------------------------------------

/// Section header in shared memory.
///
/// Layout (32 bytes, all fields little-endian u32):
/// ```text
/// offset  field
/// ------  -----------
///  0      magic        (0x8855BED)
///  4      version      (1)
///  8      status       (see Status; written with release ordering)
/// 12      num_nodes    (records in the arena, synthetic root included)
/// 16      num_dirs     (directory groups, root group included)
/// 20      bytes        (first byte past the last record)
/// 24      root_offset  (synthetic root record)
/// 28      dir_offset   (directory index header; valid once Finished)
/// ```
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionHeader {
    pub magic: u32,
    pub version: u32,
    pub status: u32,
    pub num_nodes: u32,
    pub num_dirs: u32,
    pub bytes: u32,
    pub root_offset: u32,
    pub dir_offset: u32,
}

/// Compile-time header size (records start right after it).
pub const SECTION_HEADER_SIZE: usize = std::mem::size_of::<SectionHeader>();

const _: () = assert!(SECTION_HEADER_SIZE == 32);

/// Byte offset of the status word within the header.
pub const STATUS_OFFSET: usize = 8;

// ---------------------------------------------------------------------------
// RecordHeader — fixed 44-byte prefix of every record
// ---------------------------------------------------------------------------

/// Fixed prefix of a record; the NUL-terminated UTF-16 name follows inline.
///
/// Timestamps are 64-bit 100ns intervals since 1601-01-01 split into lo/hi
/// halves so that every field is a 4-byte aligned store. `record_stride` is
/// the total record size (prefix + name + NUL) rounded up to 8; adding it to
/// a record's offset yields the next record.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordHeader {
    pub attributes: u32,
    pub creation_time_lo: u32,
    pub creation_time_hi: u32,
    pub last_access_time_lo: u32,
    pub last_access_time_hi: u32,
    pub last_write_time_lo: u32,
    pub last_write_time_hi: u32,
    pub size_hi: u32,
    pub size_lo: u32,
    pub parent_offset: u32,
    pub record_stride: u32,
}

/// Compile-time record prefix size; the name starts at this offset.
pub const RECORD_PREFIX_SIZE: usize = std::mem::size_of::<RecordHeader>();

const _: () = assert!(RECORD_PREFIX_SIZE == 44);

/// Offset of the name field within a record.
pub const RECORD_NAME_OFFSET: u32 = RECORD_PREFIX_SIZE as u32;

/// Total record size for a name of `name_units` UTF-16 code units,
/// NUL terminator included, rounded up to [`RECORD_ALIGN`].
pub fn stride_for_name(name_units: usize) -> u32 {
    let raw = RECORD_PREFIX_SIZE + 2 * (name_units + 1);
    ((raw as u32) + (RECORD_ALIGN - 1)) & !(RECORD_ALIGN - 1)
}

/// Byte offsets of individually updated record fields, for the in-place
/// aligned stores the change applier performs.
pub mod record_field {
    use super::RecordHeader;
    use std::mem::offset_of;

    pub const ATTRIBUTES: u32 = offset_of!(RecordHeader, attributes) as u32;
    pub const CREATION_TIME_LO: u32 = offset_of!(RecordHeader, creation_time_lo) as u32;
    pub const CREATION_TIME_HI: u32 = offset_of!(RecordHeader, creation_time_hi) as u32;
    pub const LAST_ACCESS_TIME_LO: u32 = offset_of!(RecordHeader, last_access_time_lo) as u32;
    pub const LAST_ACCESS_TIME_HI: u32 = offset_of!(RecordHeader, last_access_time_hi) as u32;
    pub const LAST_WRITE_TIME_LO: u32 = offset_of!(RecordHeader, last_write_time_lo) as u32;
    pub const LAST_WRITE_TIME_HI: u32 = offset_of!(RecordHeader, last_write_time_hi) as u32;
    pub const SIZE_HI: u32 = offset_of!(RecordHeader, size_hi) as u32;
    pub const SIZE_LO: u32 = offset_of!(RecordHeader, size_lo) as u32;
}

impl RecordHeader {
    #[inline]
    pub fn is_directory(&self) -> bool {
        (self.attributes & ATTR_DIRECTORY) != 0
    }

    #[inline]
    pub fn is_reparse_point(&self) -> bool {
        (self.attributes & ATTR_REPARSE_POINT) != 0
    }

    #[inline]
    pub fn is_synthetic_root(&self) -> bool {
        self.attributes == ATTR_SYNTHETIC_ROOT
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        ((self.size_hi as u64) << 32) | self.size_lo as u64
    }

    pub fn set_file_size(&mut self, size: u64) {
        self.size_hi = (size >> 32) as u32;
        self.size_lo = size as u32;
    }

    #[inline]
    pub fn last_write_time(&self) -> u64 {
        ((self.last_write_time_hi as u64) << 32) | self.last_write_time_lo as u64
    }
}

// ---------------------------------------------------------------------------
// Directory index
// ---------------------------------------------------------------------------

/// Size of the directory index header: a count word plus one bucket-head
/// offset per bucket.
pub const DIR_INDEX_SIZE: usize = 4 + 4 * BUCKET_COUNT;

/// Offset of the bucket-head table within the directory index header.
pub const DIR_INDEX_BUCKETS_OFFSET: u32 = 4;
