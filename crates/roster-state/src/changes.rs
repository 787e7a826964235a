//! Changeset model — the row-level mutations recorded by one write
//! transaction, with before/after images.
//!
//! The event projection layer consumes these to decide which parts of
//! the catalog need re-delivering to subscribers.

use serde::{Deserialize, Serialize};

use crate::types::{HealthCheck, Node, ServiceInstance};

/// One row mutation with its surviving images.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RowChange<T> {
    Created { after: T },
    Updated { before: T, after: T },
    Deleted { before: T },
}

impl<T> RowChange<T> {
    /// The most recent image: `after` when one exists, else `before`.
    pub fn latest(&self) -> &T {
        match self {
            RowChange::Created { after } | RowChange::Updated { after, .. } => after,
            RowChange::Deleted { before } => before,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, RowChange::Deleted { .. })
    }
}

/// A mutation to one of the three catalog tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Change {
    Node(RowChange<Node>),
    Service(RowChange<ServiceInstance>),
    Check(RowChange<HealthCheck>),
}
