//! Server configuration.
//!
//! Resolution order: built-in defaults, then `<root>/.ffs/config.toml` if
//! present, then `FFS_*` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use ffs_section::wpath;

/// Default region cap: 300 MiB.
pub const DEFAULT_MAX_BYTES: usize = 300 * 1024 * 1024;

/// Default section namespace root the host tree is published under.
pub const DEFAULT_SECTION_ROOT: &str = "z:\\root";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid {var}: {value}")]
    BadEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host directory to snapshot.
    pub root: PathBuf,
    /// Section-namespace root the tree is published under.
    pub section_root: String,
    /// Section file name under /dev/shm; derived from `section_root` when
    /// not set explicitly.
    pub section_name: Option<String>,
    /// Region cap in bytes.
    pub max_bytes: usize,
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Debounce window for draining a change batch, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            section_root: DEFAULT_SECTION_ROOT.to_string(),
            section_name: None,
            max_bytes: DEFAULT_MAX_BYTES,
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 100 }
    }
}

impl Config {
    /// Load configuration for the given host root.
    pub fn load(root: PathBuf) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        let config_path = root.join(".ffs").join("config.toml");
        if config_path.exists() {
            debug!(path = %config_path.display(), "loading config file");
            let contents = std::fs::read_to_string(&config_path)?;
            config = toml::from_str(&contents)?;
        }

        config.root = root;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("FFS_SECTION_ROOT") {
            self.section_root = v;
        }
        if let Ok(v) = std::env::var("FFS_SECTION_NAME") {
            self.section_name = Some(v);
        }
        if let Ok(v) = std::env::var("FFS_MAX_BYTES") {
            self.max_bytes = v.parse().map_err(|_| ConfigError::BadEnv {
                var: "FFS_MAX_BYTES",
                value: v,
            })?;
        }
        if let Ok(v) = std::env::var("FFS_DEBOUNCE_MS") {
            self.watch.debounce_ms = v.parse().map_err(|_| ConfigError::BadEnv {
                var: "FFS_DEBOUNCE_MS",
                value: v,
            })?;
        }
        Ok(())
    }

    /// Path of the shared section file.
    pub fn section_path(&self) -> PathBuf {
        let name = match &self.section_name {
            Some(name) => name.clone(),
            None => section_file_name(&self.section_root),
        };
        Path::new("/dev/shm").join(name)
    }
}

/// Derive a section file name that encodes the published root:
/// `f:\src\lib` becomes `ffs_(f)!src!lib`.
pub fn section_file_name(section_root: &str) -> String {
    let units = wpath::encode(section_root);
    let mut name = String::from("ffs_");
    if wpath::is_drive_qualified(&units) {
        let drive = section_root.chars().next().unwrap_or('_');
        name.push('(');
        name.extend(drive.to_lowercase());
        name.push(')');
        let rest: String = section_root.chars().skip(2).collect();
        for part in rest.split('\\').filter(|p| !p.is_empty()) {
            name.push('!');
            name.push_str(part);
        }
    } else {
        for part in section_root.split('\\').filter(|p| !p.is_empty()) {
            name.push('!');
            name.push_str(part);
        }
    }
    name
}
