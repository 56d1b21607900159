//! Directory enumeration capability and host/section path translation.
//!
//! The walker and change applier speak section-namespace paths
//! (drive-qualified, backslash-separated UTF-16). `PathMap` carries the
//! single root mapping between that namespace and the host directory being
//! snapshotted; `FsTreeSource` enumerates the host filesystem through it,
//! always yielding the `"."` self-entry first the way the walker expects.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use ffs_section::layout::{ATTR_DIRECTORY, ATTR_NORMAL, ATTR_REPARSE_POINT};
use ffs_section::wpath;

/// Seconds between 1601-01-01 and the Unix epoch.
const EPOCH_DELTA_SECS: u64 = 11_644_473_600;

/// Stat data for one enumerated entry, in wire units.
#[derive(Debug, Clone)]
pub struct EntryMeta {
    pub name: Vec<u16>,
    pub attributes: u32,
    pub creation_time: u64,
    pub last_access_time: u64,
    pub last_write_time: u64,
    pub size: u64,
}

/// Capability the walker and change applier need from the filesystem.
pub trait TreeSource {
    /// Enumerate a directory given by its section-namespace path. The first
    /// entry is the directory's own `"."` self-entry; the rest follow in
    /// whatever order the OS yields them.
    fn enumerate(&self, dir: &[u16]) -> io::Result<Vec<EntryMeta>>;

    /// Re-stat a single section-namespace path.
    fn probe(&self, path: &[u16]) -> io::Result<EntryMeta>;
}

/// Bidirectional mapping between the host tree and the section namespace.
#[derive(Debug, Clone)]
pub struct PathMap {
    host_root: PathBuf,
    section_root: Vec<u16>,
}

impl PathMap {
    pub fn new(host_root: PathBuf, section_root: &str) -> Self {
        Self {
            host_root,
            section_root: wpath::encode(section_root),
        }
    }

    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    pub fn section_root(&self) -> &[u16] {
        &self.section_root
    }

    /// Translate a section path under the root into a host path. Rejects
    /// paths outside the root and components that would escape it.
    pub fn to_host(&self, section_path: &[u16]) -> Option<PathBuf> {
        let rest = section_path.strip_prefix(self.section_root.as_slice())?;
        let mut host = self.host_root.clone();
        if rest.is_empty() {
            return Some(host);
        }
        if rest[0] != wpath::SEP {
            return None;
        }
        for component in rest[1..].split(|&u| u == wpath::SEP) {
            if component.is_empty() || !wpath::accept_dir_name(component) {
                return None;
            }
            host.push(wpath::decode(component));
        }
        Some(host)
    }

    /// Translate a host path under the root into a section path.
    pub fn to_section(&self, host_path: &Path) -> Option<Vec<u16>> {
        let rel = host_path.strip_prefix(&self.host_root).ok()?;
        let mut out = self.section_root.clone();
        for component in rel.components() {
            let name = component.as_os_str().to_string_lossy();
            out.push(wpath::SEP);
            out.extend(wpath::encode(&name));
        }
        Some(out)
    }
}

/// Production `TreeSource` over the host filesystem.
pub struct FsTreeSource {
    map: PathMap,
}

impl FsTreeSource {
    pub fn new(map: PathMap) -> Self {
        Self { map }
    }
}

impl TreeSource for FsTreeSource {
    fn enumerate(&self, dir: &[u16]) -> io::Result<Vec<EntryMeta>> {
        let host = self
            .map
            .to_host(dir)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;

        let self_meta = fs::symlink_metadata(&host)?;
        let mut entries = vec![entry_meta(wpath::encode("."), &self_meta)];

        for entry in fs::read_dir(&host)? {
            let entry = entry?;
            // DirEntry::metadata does not traverse symlinks, so a link shows
            // up as a reparse point rather than as its target.
            let meta = entry.metadata()?;
            let name = wpath::encode(&entry.file_name().to_string_lossy());
            entries.push(entry_meta(name, &meta));
        }
        Ok(entries)
    }

    fn probe(&self, path: &[u16]) -> io::Result<EntryMeta> {
        let host = self
            .map
            .to_host(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::InvalidInput))?;
        let meta = fs::symlink_metadata(&host)?;
        let name = match wpath::split_leaf(path) {
            Some((_, leaf)) => leaf.to_vec(),
            None => path.to_vec(),
        };
        Ok(entry_meta(name, &meta))
    }
}

fn entry_meta(name: Vec<u16>, meta: &Metadata) -> EntryMeta {
    EntryMeta {
        name,
        attributes: attributes_of(meta),
        creation_time: meta.created().map(to_file_time).unwrap_or(0),
        last_access_time: meta.accessed().map(to_file_time).unwrap_or(0),
        last_write_time: meta.modified().map(to_file_time).unwrap_or(0),
        size: if meta.is_dir() { 0 } else { meta.len() },
    }
}

fn attributes_of(meta: &Metadata) -> u32 {
    if meta.file_type().is_symlink() {
        ATTR_REPARSE_POINT
    } else if meta.is_dir() {
        ATTR_DIRECTORY
    } else {
        ATTR_NORMAL
    }
}

/// Convert to 100ns intervals since 1601-01-01.
fn to_file_time(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() + EPOCH_DELTA_SECS) * 10_000_000 + d.subsec_nanos() as u64 / 100,
        Err(_) => 0,
    }
}
