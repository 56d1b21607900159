//! # ffs-statd
//!
//! Long-running server that publishes a read-optimized snapshot of a
//! directory subtree into a shared memory section.
//!
//! ## Architecture
//!
//! One daemon process per watched root:
//! - Maps the section file at its full cap up front ([`region::Region`]);
//!   the sparse backing means address space is reserved, pages commit as
//!   the arena grows.
//! - Walks the tree breadth-first ([`walker`]), materializing one record
//!   per entry into the bump-allocated arena ([`arena::Arena`]).
//! - Installs the bucket chains and directory index ([`indexer`]) and
//!   publishes with a release store of the `Finished` status.
//! - Subscribes to filesystem change events ([`watch`]) and mutates records
//!   in place ([`applier`]) under `Updating` brackets.
//!
//! Client processes map the same section read-only and resolve paths with
//! `ffs-section`'s resolver; there is no socket protocol and no lock. The
//! status word is the entire reader/writer contract.

pub mod applier;
pub mod arena;
pub mod config;
pub mod indexer;
pub mod region;
pub mod source;
pub mod walker;
pub mod watch;

use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use ffs_section::layout::Status;

use crate::applier::ChangeApplier;
use crate::arena::Arena;
use crate::config::{Config, ConfigError};
use crate::region::{Region, RegionError};
use crate::source::{FsTreeSource, PathMap, TreeSource};
use crate::walker::WalkStats;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("change watch: {0}")]
    Watch(#[from] notify::Error),
}

impl ServerError {
    /// Distinct exit codes so a supervisor can tell bootstrap problems from
    /// region exhaustion.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Config(_) => 1,
            ServerError::Watch(_) => 1,
            ServerError::Region(RegionError::Map { .. }) => 2,
            ServerError::Region(RegionError::CapExceeded { .. }) => 3,
        }
    }
}

/// Walk the tree and install the index: Booting → InProgress → Updating →
/// Finished. On a fatal region error the status is left at `Error` and the
/// section must be rebuilt from scratch.
pub fn build_snapshot<S: TreeSource>(
    region: &mut Region,
    source: &S,
    root_path: &[u16],
) -> Result<WalkStats, RegionError> {
    let mut arena = Arena::new();
    let output = walker::walk(region, &mut arena, source, root_path).map_err(|e| {
        region.store_status(Status::Error);
        e
    })?;
    indexer::install(region, &mut arena, &output.buckets).map_err(|e| {
        region.store_status(Status::Error);
        e
    })?;

    let stats = output.stats;
    info!(
        nodes = stats.num_nodes,
        dirs = stats.num_dirs,
        reparse_points = stats.reparse_count,
        pending_fixes = stats.pending_fixes,
        bytes = region.header().bytes,
        "snapshot built"
    );
    Ok(stats)
}

/// Build the section for `config` and service change notifications until
/// the watcher shuts down.
pub fn run_server(config: &Config) -> Result<(), ServerError> {
    let section_path = config.section_path();
    let mut region = Region::create(&section_path, config.max_bytes)?;
    info!(
        section = %section_path.display(),
        cap = config.max_bytes,
        "section mapped"
    );

    let map = PathMap::new(config.root.clone(), &config.section_root);
    let source = FsTreeSource::new(map.clone());
    let root_path = map.section_root().to_vec();
    build_snapshot(&mut region, &source, &root_path)?;

    let watch = watch::ChangeWatch::new(map, Duration::from_millis(config.watch.debounce_ms))?;
    let mut applier = ChangeApplier::new(&mut region, &source);
    while let Some(batch) = watch.next_batch() {
        applier.apply_batch(&batch);
    }
    warn!("change watch channel closed, shutting down");
    Ok(())
}
