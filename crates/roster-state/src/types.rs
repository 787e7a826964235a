//! Domain types for the Roster catalog.
//!
//! These types represent the rows of the three catalog tables — nodes,
//! service instances, and health checks — plus the `CheckServiceNode`
//! join that subscribers consume. All types are serializable to/from
//! JSON for storage in redb tables and for the event wire form.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tenancy scope that disambiguates otherwise-identical identifiers
/// across tenants. Services and checks are namespaced; nodes are not.
pub type Namespace = String;

/// The conventional namespace when a caller has no tenancy of its own.
pub const DEFAULT_NAMESPACE: &str = "default";

// ── Node ──────────────────────────────────────────────────────────

/// A member of the catalog that service instances run on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub name: String,
    pub address: String,
    /// Arbitrary node metadata (datacenter, OS, rack, ...).
    pub meta: HashMap<String, String>,
}

impl Node {
    /// A node record carrying only its name.
    ///
    /// Deregistration payloads only need the name as a key; the full row
    /// may no longer exist by the time the event is built.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ── Service instance ──────────────────────────────────────────────

/// What kind of workload a service instance is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// A regular service instance.
    #[default]
    Typical,
    /// A sidecar proxy representing another service on the mesh.
    ConnectProxy,
}

/// Proxy configuration, meaningful when `kind == ConnectProxy`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceProxy {
    /// The service this proxy represents on the mesh.
    pub destination_service: String,
}

/// One registered instance of a service on a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceInstance {
    /// Name of the node this instance runs on.
    pub node: String,
    /// Instance ID, unique per (node, namespace).
    pub id: String,
    /// The service name subscribers index on.
    pub service: String,
    pub namespace: Namespace,
    pub kind: ServiceKind,
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub meta: HashMap<String, String>,
    /// Instance speaks the mesh protocol natively (no sidecar).
    pub connect_native: bool,
    pub proxy: ServiceProxy,
}

impl ServiceInstance {
    /// Build the composite key for the services table.
    pub fn table_key(&self) -> String {
        service_key(&self.node, &self.namespace, &self.id)
    }

    /// Whether events for this instance also belong on the connect topic.
    pub fn connect_enabled(&self) -> bool {
        self.kind == ServiceKind::ConnectProxy || self.connect_native
    }
}

/// Build the composite services-table key for (node, namespace, id).
pub fn service_key(node: &str, namespace: &str, id: &str) -> String {
    format!("{node}/{namespace}/{id}")
}

// ── Health check ──────────────────────────────────────────────────

/// Health state reported by a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    #[default]
    Passing,
    Warning,
    Critical,
}

/// A health check on a node, either node-scoped (empty `service_id`)
/// or scoped to a single service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HealthCheck {
    pub node: String,
    pub check_id: String,
    pub name: String,
    pub status: CheckStatus,
    /// Latest probe output, if any.
    pub output: String,
    /// Empty means the check applies to every instance on the node.
    pub service_id: String,
    pub service_name: String,
    pub namespace: Namespace,
}

impl HealthCheck {
    /// Build the composite key for the checks table.
    pub fn table_key(&self) -> String {
        check_key(&self.node, &self.namespace, &self.check_id)
    }

    /// Whether this check applies to the whole node.
    pub fn is_node_scoped(&self) -> bool {
        self.service_id.is_empty()
    }
}

/// Build the composite checks-table key for (node, namespace, check_id).
pub fn check_key(node: &str, namespace: &str, check_id: &str) -> String {
    format!("{node}/{namespace}/{check_id}")
}

// ── CheckServiceNode ──────────────────────────────────────────────

/// The projected join of a node, one of its service instances, and all
/// health checks that apply to that instance (node-scoped checks plus
/// the instance's own). Built by value per projection; never holds
/// references back into store rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckServiceNode {
    pub node: Node,
    pub service: ServiceInstance,
    pub checks: Vec<HealthCheck>,
}
