//! ChangeClassifier — reduce a committed changeset to the set of nodes
//! and service instances whose subscriber-visible state may have moved.
//!
//! A check mutation can never be projected on its own: the subscriber
//! contract is the full `CheckServiceNode` join, so the classifier only
//! decides *what* to rebuild. Node-dirty entries fan out to every
//! instance on the node; service-dirty entries rebuild one instance.

use std::collections::BTreeMap;

use roster_state::{Change, HealthCheck, Node, RowChange, ServiceInstance};

/// Identity of one service instance: (node, tenancy scope, instance id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct ServiceTuple<'a> {
    pub node: &'a str,
    pub namespace: &'a str,
    pub id: &'a str,
}

impl<'a> ServiceTuple<'a> {
    fn of_check(check: &'a HealthCheck) -> Self {
        Self {
            node: &check.node,
            namespace: &check.namespace,
            id: &check.service_id,
        }
    }
}

/// The dirty sets driving projection.
///
/// A `None` value is a mark: the row itself did not change, but
/// something that feeds its join did. Ordered maps keep the projected
/// event order deterministic.
#[derive(Debug, Default)]
pub(crate) struct DirtySets<'a> {
    pub nodes: BTreeMap<&'a str, Option<&'a RowChange<Node>>>,
    pub services: BTreeMap<ServiceTuple<'a>, Option<&'a RowChange<ServiceInstance>>>,
}

impl<'a> DirtySets<'a> {
    /// First recorded mutation wins; a mark never downgrades a mutation.
    fn mark_node(&mut self, node: &'a str, change: Option<&'a RowChange<Node>>) {
        let slot = self.nodes.entry(node).or_insert(None);
        if slot.is_none() {
            *slot = change;
        }
    }

    fn mark_service(
        &mut self,
        tuple: ServiceTuple<'a>,
        change: Option<&'a RowChange<ServiceInstance>>,
    ) {
        let slot = self.services.entry(tuple).or_insert(None);
        if slot.is_none() {
            *slot = change;
        }
    }
}

/// Classify one transaction's changes, in input order.
pub(crate) fn classify(changes: &[Change]) -> DirtySets<'_> {
    let mut dirty = DirtySets::default();
    for change in changes {
        match change {
            Change::Node(change) => {
                // Deletions are marked too: the projector must know the
                // node is gone when node-level checks also moved.
                dirty.mark_node(&change.latest().name, Some(change));
            }
            Change::Service(change) => {
                let sn = change.latest();
                dirty.mark_service(
                    ServiceTuple {
                        node: &sn.node,
                        namespace: &sn.namespace,
                        id: &sn.id,
                    },
                    Some(change),
                );
            }
            Change::Check(change) => classify_check(&mut dirty, change),
        }
    }
    dirty
}

fn classify_check<'a>(dirty: &mut DirtySets<'a>, change: &'a RowChange<HealthCheck>) {
    match change {
        RowChange::Updated { before, after } => {
            if before.service_id.is_empty() || after.service_id.is_empty() {
                // Scope flipped between node and service level; every
                // instance on the node is affected.
                dirty.mark_node(&after.node, None);
            } else {
                dirty.mark_service(ServiceTuple::of_check(after), None);
                // Re-targeted to a different instance: the old instance
                // has one fewer check now and needs re-delivering too.
                if before.node != after.node
                    || before.namespace != after.namespace
                    || before.service_id != after.service_id
                {
                    dirty.mark_service(ServiceTuple::of_check(before), None);
                }
            }
        }
        RowChange::Deleted { before } => {
            if before.service_id.is_empty() {
                dirty.mark_node(&before.node, None);
            } else {
                dirty.mark_service(ServiceTuple::of_check(before), None);
            }
        }
        RowChange::Created { after } => {
            if after.service_id.is_empty() {
                dirty.mark_node(&after.node, None);
            } else {
                dirty.mark_service(ServiceTuple::of_check(after), None);
            }
        }
    }
}
