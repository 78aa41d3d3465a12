//! Error types for the comparison engine.
//!
//! Every fatal condition maps to one variant here. The binary turns them
//! into process exit codes with [`DebcompareError::exit_code`].

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DebcompareError>;

#[derive(Error, Debug)]
pub enum DebcompareError {
    #[error("Invalid version format: '{0}' has no deb<D>u<U> security suffix")]
    InvalidVersionFormat(String),

    #[error("Missing versions: at least one of the old or new version is required")]
    MissingVersions,

    #[error("Download failed: {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Missing fileinfo for {full_name}: {url} returned HTTP status {status}")]
    MissingFileinfo {
        full_name: String,
        url: String,
        status: u16,
    },

    #[error("Missing download URL: no snapshot fileinfo entry named '{0}'")]
    MissingDownloadUrl(String),

    #[error("Invalid artifact name: '{0}' is not a plain file name")]
    InvalidArtifactName(String),

    #[error("External tool failure: {command} ({status})\n{output}")]
    ExternalToolFailure {
        command: String,
        status: String,
        output: String,
    },

    #[error("Invalid CVE identifier: '{0}' doesn't match CVE-<year>-<id>")]
    InvalidCveIdentifier(String),

    #[error("Bug tracker error: {0}")]
    BugTracker(String),

    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("I/O Error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
}

impl DebcompareError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DebcompareError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code reported by the binary for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            DebcompareError::DownloadFailed { .. } => 100,
            DebcompareError::MissingFileinfo { .. } => 101,
            DebcompareError::MissingDownloadUrl(_) => 102,
            DebcompareError::ExternalToolFailure { .. } => 103,
            DebcompareError::InvalidVersionFormat(_) | DebcompareError::MissingVersions => 2,
            _ => 1,
        }
    }
}

impl From<std::io::Error> for DebcompareError {
    fn from(err: std::io::Error) -> Self {
        DebcompareError::io(PathBuf::new(), err)
    }
}
