use std::path::PathBuf;

use thiserror::Error;

/// Errors that end a scan before any tree could be produced
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not start scan worker: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Scan worker panicked")]
    WorkerPanicked,
}

/// Errors raised while loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
