use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to find any usable input device.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Failed to read device directory: {path}")]
    Namespace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No accessible input devices in {path}")]
    NoDevices { path: PathBuf },

    #[error("Input backend unavailable: {0}")]
    Backend(String),
}

/// Failure to bring the hooks up. Nothing is left running when this is returned.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Failed to create the readiness multiplexer")]
    Multiplexer(#[source] io::Error),

    #[error("Failed to spawn {worker} worker")]
    Spawn {
        worker: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Failure to read a single raw event record from a device.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Expected to read {expected} bytes, but got {got}")]
    Short { got: usize, expected: usize },

    #[error("Device read failed")]
    Io(#[from] io::Error),
}
