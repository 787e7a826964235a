//! redb table definitions for the Roster catalog store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Composite keys follow the pattern `{node}/{namespace}/{id}` so
//! a single prefix scan covers one node.

use redb::TableDefinition;

/// Node rows keyed by `{node}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Service instance rows keyed by `{node}/{namespace}/{instance_id}`.
pub const SERVICES: TableDefinition<&str, &[u8]> = TableDefinition::new("services");

/// Health check rows keyed by `{node}/{namespace}/{check_id}`.
pub const CHECKS: TableDefinition<&str, &[u8]> = TableDefinition::new("checks");

/// Store metadata (commit index) keyed by a fixed name.
pub const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Key in [`META`] holding the last committed index.
pub const COMMIT_INDEX_KEY: &str = "commit_index";
