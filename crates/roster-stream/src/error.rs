//! Error types for the event translation core.

use thiserror::Error;

use roster_state::StateError;

/// Result type alias for event translation operations.
pub type StreamResult<T> = Result<T, StreamError>;

/// Errors surfaced by projection, snapshots, and the event sink.
///
/// The core never retries and never publishes partially: any error
/// during a projection fails the whole transaction's event batch.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Store failures, including missing rows the changeset implied
    /// should exist, surfaced unchanged.
    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to encode event: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("event sink closed")]
    SinkClosed,

    #[error("snapshot cancelled by subscriber")]
    Cancelled,
}
