//! Reversed FNV-1a/32 over UTF-16 path bytes.
//!
//! The hash scans the path's bytes from the end toward the start so that
//! trees sharing long prefixes separate on their diverging suffixes instead
//! of saturating the first mixing rounds with identical drive-and-root bytes.

use crate::layout::BUCKET_COUNT;

/// FNV-1a 32-bit offset basis.
pub const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a 32-bit prime.
pub const FNV_PRIME: u32 = 0x0100_0193;

/// Hash a section-namespace path. The hashed buffer is the path's UTF-16
/// code units as little-endian bytes, folded in back to front.
pub fn hash_path(units: &[u16]) -> u32 {
    let mut h = FNV_OFFSET_BASIS;
    for &unit in units.iter().rev() {
        let [lo, hi] = unit.to_le_bytes();
        h = (h ^ hi as u32).wrapping_mul(FNV_PRIME);
        h = (h ^ lo as u32).wrapping_mul(FNV_PRIME);
    }
    h
}

/// Bucket index for a path hash.
#[inline]
pub fn bucket_of(hash: u32) -> usize {
    hash as usize % BUCKET_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wpath;

    /// Independent reference: materialize the little-endian byte buffer,
    /// reverse it, and run the textbook forward FNV-1a.
    fn reference(units: &[u16]) -> u32 {
        let mut bytes: Vec<u8> = units.iter().flat_map(|u| u.to_le_bytes()).collect();
        bytes.reverse();
        let mut h = FNV_OFFSET_BASIS;
        for b in bytes {
            h ^= b as u32;
            h = h.wrapping_mul(FNV_PRIME);
        }
        h
    }

    #[test]
    fn empty_path_is_offset_basis() {
        assert_eq!(hash_path(&[]), FNV_OFFSET_BASIS);
    }

    #[test]
    fn matches_reference_implementation() {
        for s in [
            "f:\\src",
            "f:\\src\\compiler\\parser",
            "z:\\root\\a.txt",
            "c:\\",
            "x",
            "f:\\src\\\u{00e9}t\u{00e9}\\data",
        ] {
            let units = wpath::encode(s);
            assert_eq!(hash_path(&units), reference(&units), "mismatch for {s:?}");
        }
    }

    #[test]
    fn diverging_suffixes_separate() {
        let a = wpath::encode("f:\\src\\alpha");
        let b = wpath::encode("f:\\src\\omega");
        assert_ne!(hash_path(&a), hash_path(&b));
    }

    #[test]
    fn bucket_is_in_range() {
        for s in ["f:\\src", "z:\\root\\deep\\tree\\leaf"] {
            assert!(bucket_of(hash_path(&wpath::encode(s))) < BUCKET_COUNT);
        }
    }
}
