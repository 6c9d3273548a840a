use std::path::PathBuf;

use thiserror::Error;

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("search item is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid base url {url}: {reason}")]
    BadBaseUrl { url: String, reason: String },
}

/// Failures of the rendering collaborator for a single URL.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("timed out after {seconds}s waiting for listing container on {url}")]
    ContainerTimeout { url: String, seconds: u64 },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("rendered page for {url} returned no markup")]
    EmptyPage { url: String },

    #[error("render task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("listing card has no `data-testid` attribute")]
    MissingIdAttribute,

    #[error("listing card id attribute `{0}` does not carry a listing id")]
    InvalidId(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open listing store {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read listing store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write listing store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to flush listing store {path}: {source}")]
    Flush {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("another instance is already running (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("instance marker {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("instance marker {path} I/O failure: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to terminate process {pid}: {reason}")]
    Terminate { pid: u32, reason: String },
}
