//! Scan configuration
//!
//! Loaded from `dirscope.json` in the working directory or next to the
//! executable. Every field has a default, so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::treemap::TreemapAlgorithm;

/// File name searched for by [`ScanConfig::load`]
pub const CONFIG_FILE_NAME: &str = "dirscope.json";

const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 300;

const DEFAULT_BUNDLE_EXTENSIONS: [&str; 7] = [
    "app",
    "bundle",
    "framework",
    "plugin",
    "kext",
    "photoslibrary",
    "xcarchive",
];

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScanConfig {
    /// Minimum spacing between two intermediate snapshot publishes.
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Scan entries whose name starts with a dot.
    #[serde(default)]
    pub include_hidden: bool,

    /// Directory extensions reported as a single opaque entry.
    #[serde(default = "default_bundle_extensions")]
    pub bundle_extensions: Vec<String>,

    #[serde(default)]
    pub treemap: TreemapAlgorithm,
}

fn default_publish_interval_ms() -> u64 {
    DEFAULT_PUBLISH_INTERVAL_MS
}

fn default_bundle_extensions() -> Vec<String> {
    DEFAULT_BUNDLE_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: DEFAULT_PUBLISH_INTERVAL_MS,
            include_hidden: false,
            bundle_extensions: default_bundle_extensions(),
            treemap: TreemapAlgorithm::default(),
        }
    }
}

impl ScanConfig {
    /// Load the config from the working directory, then from the
    /// executable's directory, falling back to defaults.
    pub fn load() -> Self {
        for candidate in Self::candidate_paths() {
            if !candidate.is_file() {
                continue;
            }
            match Self::load_from_path(&candidate) {
                Ok(config) => {
                    log::info!("Loaded config from {}", candidate.display());
                    return config;
                }
                Err(err) => log::warn!("{}", err),
            }
        }

        log::info!("No {} found, using default settings", CONFIG_FILE_NAME);
        Self::default()
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                paths.push(exe_dir.join(CONFIG_FILE_NAME));
            }
        }
        paths
    }
}
