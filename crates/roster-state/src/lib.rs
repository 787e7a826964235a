//! roster-state — embedded catalog store for Roster.
//!
//! Backed by [redb](https://docs.rs/redb), holds the three catalog tables
//! (nodes, service instances, health checks) behind typed operations.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{node}/{namespace}/{id}`) group everything on a node
//! under one prefix.
//!
//! Writes run through [`CatalogTxn`], which records a [`Change`] set of
//! before/after row images and carries the commit index its transaction
//! will be assigned; the event projection layer consumes both through the
//! [`CatalogReader`] contract. Reads of committed state go through
//! [`CatalogSnapshot`].
//!
//! The `CatalogStore` is `Clone` + `Send` + `Sync` (backed by
//! `Arc<Database>`) and can be shared across tasks.

pub mod changes;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use changes::{Change, RowChange};
pub use error::{StateError, StateResult};
pub use store::{CatalogReader, CatalogSnapshot, CatalogStore, CatalogTxn};
pub use types::*;
