//! ffs-statd - shared-section file-stat server.
//!
//! Usage:
//!   ffs-statd <root-dir> [section-root]

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ffs_statd::config::Config;
use ffs_statd::run_server;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ffs_statd=info".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: ffs-statd <root-dir> [section-root]");
        std::process::exit(1);
    }

    let config = match bootstrap(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            std::process::exit(1);
        }
    };

    info!(
        root = %config.root.display(),
        section_root = %config.section_root,
        "starting ffs-statd"
    );

    if let Err(e) = run_server(&config) {
        error!(error = %e, "server failed");
        std::process::exit(e.exit_code());
    }
}

fn bootstrap(args: &[String]) -> Result<Config> {
    let root = PathBuf::from(&args[1]);
    if !root.exists() {
        bail!("root directory does not exist: {}", root.display());
    }
    let root = root
        .canonicalize()
        .context("failed to canonicalize root directory")?;

    let mut config = Config::load(root).context("failed to load configuration")?;
    if let Some(section_root) = args.get(2) {
        config.section_root = section_root.clone();
    }
    Ok(config)
}
