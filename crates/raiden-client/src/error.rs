// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Error types for the client crate

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no release found: {0}")]
    NotFound(String),

    #[error("{} already exists, pass force to overwrite", .0.display())]
    AlreadyInstalled(PathBuf),

    #[error("release index request failed: {0}")]
    Network(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("archive extraction failed: {0}")]
    Extraction(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("raiden is not running")]
    NotRunning,

    #[error("client process terminated while waiting for web ui")]
    ProcessTerminated,

    /// A name scan right after a confirmed kill still found the process.
    #[error("process {pid} still present after termination was confirmed")]
    InvariantViolation { pid: u32 },

    #[error("readiness wait cancelled")]
    Cancelled,

    #[error("web ui not ready after {attempts} attempts ({elapsed_secs}s)")]
    ReadinessTimeout { attempts: u32, elapsed_secs: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Whether the caller may simply retry the same call later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Download(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
