//! EventProjector — turn one transaction's changeset into the events
//! subscribers must see.
//!
//! Runs synchronously under the committing writer, reading through the
//! writer's own view so the join is consistent with the changeset. The
//! order is fixed: every dirty node first (re-registering all of its
//! instances), then every dirty instance not already covered by its
//! node, then the connect overlay over the whole batch. Any store
//! failure fails the entire projection; no partial batch escapes.

use std::collections::HashMap;

use tracing::debug;

use roster_state::{
    CatalogReader, Change, CheckServiceNode, HealthCheck, Node, RowChange, ServiceInstance,
    ServiceKind, StateError,
};

use crate::classify::{classify, ServiceTuple};
use crate::connect::connect_events;
use crate::error::StreamResult;
use crate::event::{CatalogOp, Event, Payload, ServiceHealthUpdate, Topic};

/// Service-scoped checks grouped by (namespace, instance id).
pub(crate) type ChecksByInstance = HashMap<(String, String), Vec<HealthCheck>>;

/// All service and connect health events implied by `changes`, read
/// against `reader` (the committing transaction's own view).
pub fn service_health_events(
    reader: &impl CatalogReader,
    changes: &[Change],
) -> StreamResult<Vec<Event>> {
    let dirty = classify(changes);
    let mut events = Vec::new();

    for (&node, change) in &dirty.nodes {
        if matches!(change, Some(c) if c.is_deleted()) {
            // A deleted node carries no registrations; its instances were
            // cascade-deleted in the same changeset and deregister below.
            continue;
        }
        node_events(reader, node, &mut events)?;
    }

    for (tuple, change) in &dirty.services {
        match change {
            Some(RowChange::Deleted { before }) => {
                events.push(dereg_event(reader.index(), before));
                continue;
            }
            Some(RowChange::Updated { before, after }) => {
                if before.service != after.service {
                    // Renamed: subscribers on the old name must see the
                    // instance leave; it re-registers under the new name
                    // below.
                    events.push(dereg_event(reader.index(), before));
                }
                if before.kind == ServiceKind::ConnectProxy
                    && before.proxy.destination_service != after.proxy.destination_service
                {
                    // The proxy itself still exists under its own name;
                    // only connect subscribers keyed by the old
                    // destination see it leave.
                    let dereg = dereg_event(reader.index(), before);
                    events.extend(connect_events(std::slice::from_ref(&dereg)));
                }
            }
            _ => {}
        }

        if let Some(node_change) = dirty.nodes.get(tuple.node) {
            let node_deleted = matches!(node_change, Some(c) if c.is_deleted());
            if !node_deleted {
                // The node pass already re-registered this instance.
                continue;
            }
        }
        events.push(instance_event(reader, tuple)?);
    }

    let connect = connect_events(&events);
    events.extend(connect);

    debug!(index = reader.index(), count = events.len(), "projected catalog changes");
    Ok(events)
}

/// Register events for every current instance on a node.
fn node_events(
    reader: &impl CatalogReader,
    node: &str,
    out: &mut Vec<Event>,
) -> StreamResult<()> {
    let (node_row, node_checks, svc_checks) = node_and_checks(reader, node)?;
    for sn in reader.list_services_on_node(node, None)? {
        out.push(register_event(
            reader.index(),
            &node_row,
            &sn,
            &node_checks,
            &svc_checks,
        ));
    }
    Ok(())
}

/// Register event for one instance, rebuilt from the store.
fn instance_event(reader: &impl CatalogReader, tuple: &ServiceTuple<'_>) -> StreamResult<Event> {
    let (node_row, node_checks, svc_checks) = node_and_checks(reader, tuple.node)?;
    let sn = reader
        .get_service(tuple.node, tuple.namespace, tuple.id)?
        .ok_or_else(|| {
            StateError::MissingService(format!("{}/{}/{}", tuple.node, tuple.namespace, tuple.id))
        })?;
    Ok(register_event(
        reader.index(),
        &node_row,
        &sn,
        &node_checks,
        &svc_checks,
    ))
}

/// Fetch a node row and all its checks, split into node-scoped checks
/// and service-scoped checks grouped by instance.
pub(crate) fn node_and_checks(
    reader: &impl CatalogReader,
    node: &str,
) -> StreamResult<(Node, Vec<HealthCheck>, ChecksByInstance)> {
    let node_row = reader
        .get_node(node)?
        .ok_or_else(|| StateError::MissingNode(node.to_string()))?;

    let mut node_checks = Vec::new();
    let mut svc_checks: ChecksByInstance = HashMap::new();
    for check in reader.list_checks_on_node(node, None)? {
        if check.is_node_scoped() {
            node_checks.push(check);
        } else {
            svc_checks
                .entry((check.namespace.clone(), check.service_id.clone()))
                .or_default()
                .push(check);
        }
    }
    Ok((node_row, node_checks, svc_checks))
}

/// Build a Register event with the instance's merged check list:
/// node-scoped checks first, then the instance's own.
pub(crate) fn register_event(
    index: u64,
    node: &Node,
    sn: &ServiceInstance,
    node_checks: &[HealthCheck],
    svc_checks: &ChecksByInstance,
) -> Event {
    let mut checks = node_checks.to_vec();
    if let Some(own) = svc_checks.get(&(sn.namespace.clone(), sn.id.clone())) {
        checks.extend(own.iter().cloned());
    }
    Event {
        topic: Topic::ServiceHealth,
        key: sn.service.clone(),
        index,
        payload: Payload::ServiceHealth(ServiceHealthUpdate {
            op: CatalogOp::Register,
            check_service_node: CheckServiceNode {
                node: node.clone(),
                service: sn.clone(),
                checks,
            },
        }),
    }
}

/// Build a Deregister event from the pre-mutation instance image.
///
/// Only the node name is populated: the event is a key for subscribers
/// to drop state, and the node row may already be gone when the whole
/// node deregistered.
fn dereg_event(index: u64, sn: &ServiceInstance) -> Event {
    Event {
        topic: Topic::ServiceHealth,
        key: sn.service.clone(),
        index,
        payload: Payload::ServiceHealth(ServiceHealthUpdate {
            op: CatalogOp::Deregister,
            check_service_node: CheckServiceNode {
                node: Node::named(sn.node.as_str()),
                service: sn.clone(),
                checks: Vec::new(),
            },
        }),
    }
}
