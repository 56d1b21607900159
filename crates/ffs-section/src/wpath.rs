//! UTF-16 path handling for the section namespace.
//!
//! Section paths are drive-qualified and backslash-separated (`f:\src\lib`),
//! stored as bare `u16` slices. Helpers here never touch the host
//! filesystem; translation to and from host paths lives in the daemon.

/// Path separator code unit.
pub const SEP: u16 = b'\\' as u16;

const COLON: u16 = b':' as u16;
const DOT: u16 = b'.' as u16;

/// Encode a UTF-8 string into section-namespace code units.
pub fn encode(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

/// Decode code units for display; unpaired surrogates become U+FFFD.
pub fn decode(units: &[u16]) -> String {
    String::from_utf16_lossy(units)
}

/// Join a directory path and a leaf name with one separator.
pub fn join(base: &[u16], name: &[u16]) -> Vec<u16> {
    let mut out = Vec::with_capacity(base.len() + 1 + name.len());
    out.extend_from_slice(base);
    out.push(SEP);
    out.extend_from_slice(name);
    out
}

/// True for paths of the shape `X:...` with at least three code units.
pub fn is_drive_qualified(path: &[u16]) -> bool {
    path.len() >= 3 && path[1] == COLON
}

/// Split at the final separator into `(directory, leaf)`.
pub fn split_leaf(path: &[u16]) -> Option<(&[u16], &[u16])> {
    let sep = path.iter().rposition(|&u| u == SEP)?;
    Some((&path[..sep], &path[sep + 1..]))
}

/// True if `name` is the `"."` self-entry.
pub fn is_dot(name: &[u16]) -> bool {
    name == [DOT]
}

/// True if `name` is `".."`.
pub fn is_dot_dot(name: &[u16]) -> bool {
    name == [DOT, DOT]
}

/// Directory filter for enumeration: everything except `"."` and `".."`.
pub fn accept_dir_name(name: &[u16]) -> bool {
    !is_dot(name) && !is_dot_dot(name)
}

/// Compare code units against a raw little-endian UTF-16 byte run.
pub fn eq_raw(units: &[u16], raw: &[u8]) -> bool {
    raw.len() == units.len() * 2
        && units
            .iter()
            .zip(raw.chunks_exact(2))
            .all(|(&u, b)| u == u16::from_le_bytes([b[0], b[1]]))
}

/// True if `path` ends with the component held in `raw` bytes.
pub fn ends_with_raw(path: &[u16], raw: &[u8]) -> bool {
    let n = raw.len() / 2;
    path.len() >= n && eq_raw(&path[path.len() - n..], raw)
}
