//! Crate-wide error types.
//!
//! Each subsystem defines its own narrow error enum (`CacheError`,
//! `ConfigError`, `ProxyError`, ...); `StartupError` is the top-level
//! error a `main` binds to and prints before exiting with status 1.

use std::path::PathBuf;

/// Errors returned by cache operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    /// `get_fast`'s `coverage_percent` argument was outside `[10, 100]`.
    #[error("coverage must be between 10 and 100, got {got}")]
    CoverageOutOfRange {
        /// The out-of-range value that was supplied.
        got: u8,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("{path}: {source}")]
    Io {
        /// Path of the file that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file could not be parsed as JSON.
    #[error("{path}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A required field was missing or held an invalid value.
    #[error("{path}: {field}: {reason}")]
    Validation {
        /// Path of the offending config file.
        path: PathBuf,
        /// Name of the offending field.
        field: String,
        /// Human-readable reason the field is invalid.
        reason: String,
    },
}

/// Errors that cause the server process to abort at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// Configuration failed to load or validate.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A required resource (TLS certificate, log file, ...) could not be opened.
    #[error("failed to open required resource {path}: {source}")]
    Resource {
        /// Path of the resource that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TCP listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Transient errors encountered while proxying a request upstream.
///
/// All variants surface as HTTP 502 and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No proxy rule matched the request's host.
    #[error("no proxy rule for host {0}")]
    NoRule(String),

    /// The upstream could not be dialed.
    #[error("failed to dial upstream: {0}")]
    Dial(#[source] reqwest::Error),

    /// The upstream response could not be read.
    #[error("failed to read upstream response: {0}")]
    Read(#[source] reqwest::Error),

    /// The inbound request body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(#[source] axum::Error),
}
