//! Error types for wiremock-launcher
//!
//! Centralized error handling using thiserror. Each phase of the fixture
//! lifecycle has its own error enum; `PrepareError` collects everything that
//! can abort `prepare`, and `LauncherError` is the crate-wide catch-all.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::LifecyclePhase;

/// Failure to obtain the artifact from the remote repository
#[derive(Debug, Error)]
pub enum FetchError {
    /// Server answered with something other than 200
    #[error("Download of {url} failed: statusCode={status}")]
    BadStatus { status: u16, url: String },

    /// DNS, connect, reset or timeout before/while reading the body
    #[error("Download of {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built (TLS backend, resolver)
    #[error("Could not create HTTP client: {0}")]
    ClientInit(#[source] reqwest::Error),

    /// Body could not be persisted
    #[error("Could not write to {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// HTTP status for `BadStatus`, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::BadStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// The port never accepted a connection within the deadline
#[derive(Debug, Error)]
#[error("Port {port} did not accept connections within {}ms", waited.as_millis())]
pub struct TimeoutError {
    pub port: u16,
    pub waited: Duration,
}

/// Failure to launch the managed process
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The OS refused to spawn the program (missing runtime, permissions, ...)
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS reported no pid for a freshly spawned child
    #[error("Spawned {program} but no pid was reported")]
    NoPid { program: String },

    /// `start` was called on a supervisor that already left `NotStarted`
    #[error("Process was already started")]
    AlreadyStarted,
}

/// Everything that can reject `prepare`
#[derive(Debug, Error)]
pub enum PrepareError {
    #[error("Downloading WireMock jar failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Launching WireMock failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("WireMock did not become ready: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Cannot prepare from phase {0:?}")]
    InvalidPhase(LifecyclePhase),
}

/// All error types that can occur in wiremock-launcher
#[derive(Debug, Error)]
pub enum LauncherError {
    /// Invalid or inconsistent configuration
    #[error("Config error: {0}")]
    Config(String),

    /// The artifact fetcher could not be set up
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LauncherError>;
