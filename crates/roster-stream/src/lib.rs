//! roster-stream — catalog change-to-event translation for Roster.
//!
//! Translates committed catalog mutations into the minimal correct set
//! of subscriber-visible events across two overlapping topics, and
//! serves point-in-time snapshots for new subscribers.
//!
//! # Architecture
//!
//! - `classify` reduces a raw changeset to dirty nodes and dirty
//!   service instances.
//! - `project` rebuilds the `CheckServiceNode` join for every dirty
//!   entry and emits Register/Deregister events, finishing with the
//!   connect overlay.
//! - `connect` derives the `ServiceHealthConnect` view of a batch, with
//!   proxy keys rewritten to their destination service.
//! - `snapshot` streams the current state of a subscription into a
//!   sink and returns the index live streaming resumes from.
//! - `publish` ties projection to the store's commit path: project with
//!   the writer's view, commit, hand the batch to the sink.
//!
//! The whole pipeline is synchronous and holds no state between
//! transactions; ordering guarantees come from the single producer per
//! transaction and strictly increasing commit indexes.

pub mod buffer;
mod classify;
pub mod connect;
pub mod error;
pub mod event;
pub mod project;
pub mod publish;
pub mod snapshot;

pub use buffer::{EventBuffer, EventSink};
pub use connect::connect_events;
pub use error::{StreamError, StreamResult};
pub use event::{CatalogOp, Event, Payload, ServiceHealthUpdate, Topic};
pub use project::service_health_events;
pub use publish::commit_and_publish;
pub use snapshot::{service_health_snapshot, SubscribeRequest};
