//! Event model — what subscribers receive.
//!
//! An [`Event`] is a tagged record carrying the topic, the routing key
//! subscribers filter on, the commit index of the originating
//! transaction, and a payload. Today the only payload shape is
//! [`ServiceHealthUpdate`]; the [`Payload`] variant leaves room for
//! more.

use serde::{Deserialize, Serialize};

use roster_state::CheckServiceNode;

use crate::error::StreamResult;

/// Topics the catalog core publishes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topic {
    /// Health updates for every service instance, keyed by service name.
    ServiceHealth,
    /// The connect-enabled overlay: proxies keyed by their destination
    /// service, plus connect-native instances.
    ServiceHealthConnect,
}

/// What happened to the instance in the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogOp {
    Register,
    Deregister,
}

/// A service health change: the operation plus the full projected join.
///
/// For `Deregister` the join is minimal — the node record carries only
/// the node name and the check list is empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceHealthUpdate {
    pub op: CatalogOp,
    pub check_service_node: CheckServiceNode,
}

/// Tagged event payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    ServiceHealth(ServiceHealthUpdate),
}

impl Payload {
    /// The service health update, when this payload carries one.
    pub fn service_health(&self) -> Option<&ServiceHealthUpdate> {
        match self {
            Payload::ServiceHealth(update) => Some(update),
        }
    }
}

/// One subscriber-visible event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub topic: Topic,
    /// The routing key subscribers index on — the service name, or the
    /// proxy destination on the connect topic.
    pub key: String,
    /// Commit index of the originating transaction (for snapshot events,
    /// the index of the snapshot read).
    pub index: u64,
    pub payload: Payload,
}

impl Event {
    /// Marshal the event into its wire form.
    pub fn encode(&self) -> StreamResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
