//! Error type for the distance feed.

use std::io;
use std::path::PathBuf;

/// Errors surfaced by startup and by the Position Source boundary.
///
/// Transient conditions (no reader yet, full pipe buffer) and per-pair
/// broken pipes are handled inside the pipe and delivery layers and never
/// become a `FeedError`.
#[derive(Debug)]
pub enum FeedError {
    /// Creating a named pipe failed for a reason other than "already exists".
    CreateChannel { path: PathBuf, source: io::Error },
    /// Opening a channel failed with a non-retryable error.
    OpenChannel { path: PathBuf, source: io::Error },
    /// Writing to a channel failed with a non-retryable error.
    Write { path: PathBuf, source: io::Error },
    /// The configured open/prime attempt budget ran out.
    RetriesExhausted { path: PathBuf, attempts: u32 },
    /// The Position Source produced an unusable snapshot.
    Source(String),
    /// Configuration could not be read, parsed or validated.
    Config(String),
    /// A delivery worker thread could not be started.
    Spawn(io::Error),
}

pub type Result<T> = std::result::Result<T, FeedError>;

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::CreateChannel { path, source } => write!(f, "Failed to create channel {}: {}", path.display(), source),
            FeedError::OpenChannel { path, source } => write!(f, "Failed to open channel {}: {}", path.display(), source),
            FeedError::Write { path, source } => write!(f, "Failed to write channel {}: {}", path.display(), source),
            FeedError::RetriesExhausted { path, attempts } => {
                write!(f, "Gave up on channel {} after {} attempts", path.display(), attempts)
            }
            FeedError::Source(msg) => write!(f, "Position source error: {}", msg),
            FeedError::Config(msg) => write!(f, "Configuration error: {}", msg),
            FeedError::Spawn(e) => write!(f, "Failed to start delivery worker: {}", e),
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::CreateChannel { source, .. } | FeedError::OpenChannel { source, .. } | FeedError::Write { source, .. } => Some(source),
            FeedError::Spawn(source) => Some(source),
            _ => None,
        }
    }
}
