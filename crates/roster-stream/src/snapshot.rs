//! SnapshotProducer — the initial catch-up stream for a new subscriber.
//!
//! Performs the same join the projector performs, over the current
//! committed view, filtered by the subscribed key, and hands each event
//! to the sink individually so the full snapshot is never materialised
//! in memory. Live streaming resumes at the returned index + 1.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::watch;
use tracing::debug;

use roster_state::{CatalogReader, CatalogStore, Namespace};

use crate::buffer::EventSink;
use crate::error::{StreamError, StreamResult};
use crate::event::Topic;
use crate::project::{node_and_checks, register_event};

/// A topic + key subscription with its tenancy scope and cancellation
/// signal.
pub struct SubscribeRequest {
    pub topic: Topic,
    /// Service name — or, on the connect topic, the destination service
    /// name the subscriber resolves.
    pub key: String,
    pub namespace: Namespace,
    /// Flipped to true when the subscriber goes away; checked between
    /// emissions.
    pub shutdown: watch::Receiver<bool>,
}

impl SubscribeRequest {
    pub fn new(
        topic: Topic,
        key: impl Into<String>,
        namespace: impl Into<String>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topic,
            key: key.into(),
            namespace: namespace.into(),
            shutdown,
        }
    }
}

/// Stream the current state of a subscription into `sink`, one Register
/// event per append. Returns the commit index of the read view.
///
/// On the connect topic the subscribed key is already the destination
/// the subscriber asked for, so no key rewriting happens here.
pub fn service_health_snapshot(
    store: &CatalogStore,
    req: &SubscribeRequest,
    sink: &impl EventSink,
) -> StreamResult<u64> {
    let snap = store.snapshot()?;
    let instances = match req.topic {
        Topic::ServiceHealth => {
            snap.list_instances_by_service(&req.key, Some(req.namespace.as_str()))?
        }
        Topic::ServiceHealthConnect => {
            snap.list_connect_instances(&req.key, Some(req.namespace.as_str()))?
        }
    };
    debug!(
        key = %req.key,
        index = snap.index(),
        instances = instances.len(),
        "serving subscription snapshot"
    );

    // Per-node check join, fetched once per node touched.
    let mut joined = HashMap::new();
    for (node_row, sn) in instances {
        if *req.shutdown.borrow() {
            return Err(StreamError::Cancelled);
        }

        let (_, node_checks, svc_checks) = match joined.entry(sn.node.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(node_and_checks(&snap, &sn.node)?),
        };

        let mut event = register_event(snap.index(), &node_row, &sn, node_checks, svc_checks);
        event.topic = req.topic;
        event.key = req.key.clone();
        sink.append(vec![event])?;
    }
    Ok(snap.index())
}
