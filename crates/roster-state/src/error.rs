//! Error types for the Roster catalog store.

use thiserror::Error;

/// Result type alias for catalog store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during catalog store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("missing node: {0}")]
    MissingNode(String),

    #[error("missing service: {0}")]
    MissingService(String),
}
