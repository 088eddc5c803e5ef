//! Error types for uvpack-bridge.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for all packing operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// Invalid input detected before any I/O (no objects, bad options, broken mesh).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The engine executable could not be launched.
    #[error("Failed to launch packing engine {}: {source}", path.display())]
    ProcessSpawn {
        /// Executable that was attempted.
        path: PathBuf,
        /// Underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// I/O error on the engine pipes (short read, broken pipe).
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Malformed frame, truncated body, or results that don't match the request.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Error text reported by the engine in an Error frame.
    #[error("{0}")]
    Engine(String),

    /// A pack session is already running.
    #[error("A packing session is already in progress")]
    SessionInProgress,

    /// The handle does not refer to the current session.
    #[error("Unknown session handle: {0}")]
    UnknownSession(u64),

    /// A session has ended but its meshes were never collected.
    #[error("Session {0} has ended; collect its meshes with finish_session first")]
    SessionNotCollected(u64),
}

impl PackError {
    /// Whether this error should additionally raise a modal alert in the host.
    pub fn wants_alert(&self) -> bool {
        matches!(self, PackError::Protocol(_) | PackError::Engine(_))
    }
}

/// Result type alias using PackError.
pub type Result<T> = std::result::Result<T, PackError>;

/// A pack that never started. Hands the meshes back to the caller.
pub struct StartError<M> {
    pub error: PackError,
    pub meshes: Vec<M>,
}

impl<M> StartError<M> {
    pub fn new(error: PackError, meshes: Vec<M>) -> Self {
        Self { error, meshes }
    }

    pub fn into_parts(self) -> (PackError, Vec<M>) {
        (self.error, self.meshes)
    }
}

impl<M> fmt::Debug for StartError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartError")
            .field("error", &self.error)
            .field("meshes", &self.meshes.len())
            .finish()
    }
}

impl<M> fmt::Display for StartError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<M> std::error::Error for StartError<M> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl<M> From<StartError<M>> for PackError {
    fn from(err: StartError<M>) -> Self {
        err.error
    }
}
