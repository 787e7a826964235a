//! CatalogStore — redb-backed catalog storage for Roster.
//!
//! Provides typed operations over nodes, service instances, and health
//! checks. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).
//!
//! Writes go through a [`CatalogTxn`], which records a changeset of
//! before/after row images and assigns the commit index the transaction
//! will carry. The event projection layer reads through [`CatalogReader`],
//! implemented by both [`CatalogTxn`] (the committing writer's own view,
//! including uncommitted writes) and [`CatalogSnapshot`] (a consistent
//! committed read view).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadTransaction, ReadableDatabase, ReadableTable, WriteTransaction};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::changes::{Change, RowChange};
use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

// ── Row helpers ────────────────────────────────────────────────────

fn encode<T: Serialize>(value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

fn get_row<T, Tbl>(table: &Tbl, key: &str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(map_err!(Read))? {
        Some(guard) => Ok(Some(decode(guard.value())?)),
        None => Ok(None),
    }
}

fn scan_rows<T, Tbl>(table: &Tbl, mut keep: impl FnMut(&T) -> bool) -> StateResult<Vec<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::new();
    for entry in table.iter().map_err(map_err!(Read))? {
        let (_, value) = entry.map_err(map_err!(Read))?;
        let row: T = decode(value.value())?;
        if keep(&row) {
            results.push(row);
        }
    }
    Ok(results)
}

fn matches_ns(namespace: Option<&str>, row_ns: &str) -> bool {
    namespace.map_or(true, |ns| ns == row_ns)
}

/// Join matched service instances with their node rows.
fn join_nodes<Tbl>(
    nodes: &Tbl,
    instances: Vec<ServiceInstance>,
) -> StateResult<Vec<(Node, ServiceInstance)>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    let mut results = Vec::with_capacity(instances.len());
    for sn in instances {
        let node = get_row::<Node, _>(nodes, sn.node.as_str())?
            .ok_or_else(|| StateError::MissingNode(sn.node.clone()))?;
        results.push((node, sn));
    }
    Ok(results)
}

// ── Read contract ──────────────────────────────────────────────────

/// Read contract consumed by the event projection and snapshot layers.
///
/// `namespace: Some(ns)` filters to one tenancy scope; `None` is the
/// wildcard used when re-delivering everything on a node.
pub trait CatalogReader {
    /// The commit index of this read view. For a write transaction this
    /// is the index the commit will be assigned.
    fn index(&self) -> u64;

    fn get_node(&self, name: &str) -> StateResult<Option<Node>>;

    fn get_service(
        &self,
        node: &str,
        namespace: &str,
        id: &str,
    ) -> StateResult<Option<ServiceInstance>>;

    fn list_services_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<ServiceInstance>>;

    /// All checks on a node, both node-scoped and service-scoped.
    /// Node-scoped checks apply to every tenancy and are returned
    /// regardless of the filter.
    fn list_checks_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<HealthCheck>>;

    /// Current instances registered under a service name, joined with
    /// their nodes.
    fn list_instances_by_service(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>>;

    /// Connect resolution for a service name: sidecar proxies whose
    /// destination is the service, plus connect-native instances of the
    /// service itself.
    fn list_connect_instances(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>>;
}

// Shared query bodies over any pair of opened tables.

fn services_on_node<Tbl>(
    services: &Tbl,
    node: &str,
    namespace: Option<&str>,
) -> StateResult<Vec<ServiceInstance>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    scan_rows(services, |sn: &ServiceInstance| {
        sn.node == node && matches_ns(namespace, &sn.namespace)
    })
}

fn checks_on_node<Tbl>(
    checks: &Tbl,
    node: &str,
    namespace: Option<&str>,
) -> StateResult<Vec<HealthCheck>>
where
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    scan_rows(checks, |c: &HealthCheck| {
        c.node == node && (c.is_node_scoped() || matches_ns(namespace, &c.namespace))
    })
}

fn instances_by_service<S, N>(
    services: &S,
    nodes: &N,
    service: &str,
    namespace: Option<&str>,
) -> StateResult<Vec<(Node, ServiceInstance)>>
where
    S: ReadableTable<&'static str, &'static [u8]>,
    N: ReadableTable<&'static str, &'static [u8]>,
{
    let matched = scan_rows(services, |sn: &ServiceInstance| {
        sn.service == service && matches_ns(namespace, &sn.namespace)
    })?;
    join_nodes(nodes, matched)
}

fn connect_instances<S, N>(
    services: &S,
    nodes: &N,
    service: &str,
    namespace: Option<&str>,
) -> StateResult<Vec<(Node, ServiceInstance)>>
where
    S: ReadableTable<&'static str, &'static [u8]>,
    N: ReadableTable<&'static str, &'static [u8]>,
{
    let matched = scan_rows(services, |sn: &ServiceInstance| {
        let targets = match sn.kind {
            ServiceKind::ConnectProxy => sn.proxy.destination_service == service,
            ServiceKind::Typical => sn.connect_native && sn.service == service,
        };
        targets && matches_ns(namespace, &sn.namespace)
    })?;
    join_nodes(nodes, matched)
}

// ── Store ──────────────────────────────────────────────────────────

/// Thread-safe catalog store backed by redb.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    /// Open (or create) a persistent catalog store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "catalog store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory catalog store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory catalog store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(SERVICES).map_err(map_err!(Table))?;
        txn.open_table(CHECKS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Begin a write transaction at the next commit index.
    ///
    /// redb serializes writers; a second `begin` blocks until the first
    /// transaction commits or aborts.
    pub fn begin(&self) -> StateResult<CatalogTxn> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let committed: u64 = {
            let table = txn.open_table(META).map_err(map_err!(Table))?;
            get_row(&table, COMMIT_INDEX_KEY)?.unwrap_or(0)
        };
        Ok(CatalogTxn {
            txn,
            index: committed + 1,
            changes: Vec::new(),
        })
    }

    /// Open a consistent read view of the last committed state.
    pub fn snapshot(&self) -> StateResult<CatalogSnapshot> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index: u64 = {
            let table = txn.open_table(META).map_err(map_err!(Table))?;
            get_row(&table, COMMIT_INDEX_KEY)?.unwrap_or(0)
        };
        Ok(CatalogSnapshot { txn, index })
    }
}

// ── Write transaction ──────────────────────────────────────────────

/// A catalog write transaction.
///
/// Mutations record before/after row images into the changeset exposed
/// by [`changes`](CatalogTxn::changes). Reads through [`CatalogReader`]
/// observe this transaction's own uncommitted writes.
pub struct CatalogTxn {
    txn: WriteTransaction,
    index: u64,
    changes: Vec<Change>,
}

impl CatalogTxn {
    /// The commit index this transaction will be assigned.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// The ordered row mutations recorded so far.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Insert or update a node row.
    pub fn put_node(&mut self, node: Node) -> StateResult<()> {
        let value = encode(&node)?;
        let before: Option<Node> = {
            let mut table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
            let result = match table
                .insert(node.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?
            {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        debug!(node = %node.name, "node stored");
        self.changes.push(Change::Node(match before {
            Some(before) => RowChange::Updated { before, after: node },
            None => RowChange::Created { after: node },
        }));
        Ok(())
    }

    /// Delete a node and everything on it: service instances (with their
    /// checks) and node-scoped checks. Every cascaded row appears in the
    /// changeset. Returns true if the node existed.
    pub fn delete_node(&mut self, name: &str) -> StateResult<bool> {
        let before: Option<Node> = {
            let mut table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
            let result = match table.remove(name).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        let Some(before) = before else {
            return Ok(false);
        };

        let instances: Vec<ServiceInstance> = {
            let table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
            scan_rows(&table, |sn: &ServiceInstance| sn.node == name)?
        };
        for sn in instances {
            self.delete_service(&sn.node, &sn.namespace, &sn.id)?;
        }
        // Whatever checks remain on the node are node-scoped.
        self.delete_checks_where(|c| c.node == name)?;

        debug!(node = %name, "node deleted");
        self.changes.push(Change::Node(RowChange::Deleted { before }));
        Ok(true)
    }

    /// Insert or update a service instance row.
    pub fn put_service(&mut self, service: ServiceInstance) -> StateResult<()> {
        let key = service.table_key();
        let value = encode(&service)?;
        let before: Option<ServiceInstance> = {
            let mut table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let result = match table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?
            {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        debug!(%key, service = %service.service, "service stored");
        self.changes.push(Change::Service(match before {
            Some(before) => RowChange::Updated {
                before,
                after: service,
            },
            None => RowChange::Created { after: service },
        }));
        Ok(())
    }

    /// Delete a service instance and its service-scoped checks.
    /// Returns true if the instance existed.
    pub fn delete_service(&mut self, node: &str, namespace: &str, id: &str) -> StateResult<bool> {
        let key = service_key(node, namespace, id);
        let before: Option<ServiceInstance> = {
            let mut table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
            let result = match table.remove(key.as_str()).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        let Some(before) = before else {
            return Ok(false);
        };

        // Cascade: a service instance takes its checks with it.
        self.delete_checks_where(|c| {
            c.node == node && c.namespace == namespace && c.service_id == id
        })?;

        debug!(%key, "service deleted");
        self.changes.push(Change::Service(RowChange::Deleted { before }));
        Ok(true)
    }

    /// Insert or update a health check row.
    pub fn put_check(&mut self, check: HealthCheck) -> StateResult<()> {
        let key = check.table_key();
        let value = encode(&check)?;
        let before: Option<HealthCheck> = {
            let mut table = self.txn.open_table(CHECKS).map_err(map_err!(Table))?;
            let result = match table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?
            {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        debug!(%key, status = ?check.status, "check stored");
        self.changes.push(Change::Check(match before {
            Some(before) => RowChange::Updated {
                before,
                after: check,
            },
            None => RowChange::Created { after: check },
        }));
        Ok(())
    }

    /// Delete a health check. Returns true if it existed.
    pub fn delete_check(&mut self, node: &str, namespace: &str, check_id: &str) -> StateResult<bool> {
        let key = check_key(node, namespace, check_id);
        let before: Option<HealthCheck> = {
            let mut table = self.txn.open_table(CHECKS).map_err(map_err!(Table))?;
            let result = match table.remove(key.as_str()).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            result
        };
        match before {
            Some(before) => {
                self.changes.push(Change::Check(RowChange::Deleted { before }));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove every check matching the predicate, recording each deletion.
    fn delete_checks_where(&mut self, doomed: impl Fn(&HealthCheck) -> bool) -> StateResult<()> {
        let removed: Vec<HealthCheck> = {
            let mut table = self.txn.open_table(CHECKS).map_err(map_err!(Table))?;
            let matched: Vec<HealthCheck> = scan_rows(&table, |c| doomed(c))?;
            let mut removed = Vec::with_capacity(matched.len());
            for check in matched {
                let key = check.table_key();
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    removed.push(check);
                }
            }
            removed
        };
        for check in removed {
            self.changes.push(Change::Check(RowChange::Deleted { before: check }));
        }
        Ok(())
    }

    /// Commit the transaction, persisting its index as the new commit
    /// index. Returns the index.
    pub fn commit(self) -> StateResult<u64> {
        let index = self.index;
        {
            let mut table = self.txn.open_table(META).map_err(map_err!(Table))?;
            let value = encode(&index)?;
            table
                .insert(COMMIT_INDEX_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        self.txn.commit().map_err(map_err!(Transaction))?;
        debug!(index, "catalog transaction committed");
        Ok(index)
    }

    /// Abort the transaction, discarding its writes and changeset.
    pub fn abort(self) -> StateResult<()> {
        self.txn.abort().map_err(map_err!(Transaction))
    }
}

impl CatalogReader for CatalogTxn {
    fn index(&self) -> u64 {
        self.index
    }

    fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        get_row(&table, name)
    }

    fn get_service(
        &self,
        node: &str,
        namespace: &str,
        id: &str,
    ) -> StateResult<Option<ServiceInstance>> {
        let table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        get_row(&table, service_key(node, namespace, id).as_str())
    }

    fn list_services_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<ServiceInstance>> {
        let table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        services_on_node(&table, node, namespace)
    }

    fn list_checks_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<HealthCheck>> {
        let table = self.txn.open_table(CHECKS).map_err(map_err!(Table))?;
        checks_on_node(&table, node, namespace)
    }

    fn list_instances_by_service(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>> {
        let services = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let nodes = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        instances_by_service(&services, &nodes, service, namespace)
    }

    fn list_connect_instances(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>> {
        let services = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let nodes = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        connect_instances(&services, &nodes, service, namespace)
    }
}

// ── Read snapshot ──────────────────────────────────────────────────

/// A consistent read view of the last committed catalog state.
///
/// Dropping the snapshot releases the read transaction.
pub struct CatalogSnapshot {
    txn: ReadTransaction,
    index: u64,
}

impl CatalogReader for CatalogSnapshot {
    fn index(&self) -> u64 {
        self.index
    }

    fn get_node(&self, name: &str) -> StateResult<Option<Node>> {
        let table = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        get_row(&table, name)
    }

    fn get_service(
        &self,
        node: &str,
        namespace: &str,
        id: &str,
    ) -> StateResult<Option<ServiceInstance>> {
        let table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        get_row(&table, service_key(node, namespace, id).as_str())
    }

    fn list_services_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<ServiceInstance>> {
        let table = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        services_on_node(&table, node, namespace)
    }

    fn list_checks_on_node(
        &self,
        node: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<HealthCheck>> {
        let table = self.txn.open_table(CHECKS).map_err(map_err!(Table))?;
        checks_on_node(&table, node, namespace)
    }

    fn list_instances_by_service(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>> {
        let services = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let nodes = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        instances_by_service(&services, &nodes, service, namespace)
    }

    fn list_connect_instances(
        &self,
        service: &str,
        namespace: Option<&str>,
    ) -> StateResult<Vec<(Node, ServiceInstance)>> {
        let services = self.txn.open_table(SERVICES).map_err(map_err!(Table))?;
        let nodes = self.txn.open_table(NODES).map_err(map_err!(Table))?;
        connect_instances(&services, &nodes, service, namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(name: &str) -> Node {
        Node {
            name: name.to_string(),
            address: "10.0.0.1".to_string(),
            meta: Default::default(),
        }
    }

    fn test_service(node: &str, id: &str, service: &str) -> ServiceInstance {
        ServiceInstance {
            node: node.to_string(),
            id: id.to_string(),
            service: service.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            address: "10.0.0.1".to_string(),
            port: 8080,
            ..ServiceInstance::default()
        }
    }

    fn test_check(node: &str, check_id: &str, service_id: &str) -> HealthCheck {
        HealthCheck {
            node: node.to_string(),
            check_id: check_id.to_string(),
            name: format!("check {check_id}"),
            service_id: service_id.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ..HealthCheck::default()
        }
    }

    fn seed(store: &CatalogStore) -> u64 {
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();
        txn.put_service(test_service("n1", "web-0", "web")).unwrap();
        txn.put_service(test_service("n1", "api-0", "api")).unwrap();
        txn.put_check(test_check("n1", "serf", "")).unwrap();
        txn.put_check(test_check("n1", "web-probe", "web-0")).unwrap();
        txn.commit().unwrap()
    }

    // ── CRUD and reads ─────────────────────────────────────────────

    #[test]
    fn node_put_and_get() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.get_node("n1").unwrap(), Some(test_node("n1")));
        assert!(snap.get_node("n2").unwrap().is_none());
    }

    #[test]
    fn services_on_node_with_namespace_filter() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();
        txn.put_service(test_service("n1", "web-0", "web")).unwrap();
        let mut tenant = test_service("n1", "web-0", "web");
        tenant.namespace = "team-a".to_string();
        txn.put_service(tenant).unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.list_services_on_node("n1", None).unwrap().len(), 2);
        assert_eq!(
            snap.list_services_on_node("n1", Some("team-a")).unwrap().len(),
            1
        );
        assert!(snap.list_services_on_node("n2", None).unwrap().is_empty());
    }

    #[test]
    fn checks_on_node_returns_node_scoped_for_any_namespace() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();
        txn.put_check(test_check("n1", "serf", "")).unwrap();
        let mut tenant_check = test_check("n1", "web-probe", "web-0");
        tenant_check.namespace = "team-a".to_string();
        txn.put_check(tenant_check).unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        // Wildcard sees both.
        assert_eq!(snap.list_checks_on_node("n1", None).unwrap().len(), 2);
        // Another tenancy still sees the node-scoped check.
        let default_view = snap
            .list_checks_on_node("n1", Some(DEFAULT_NAMESPACE))
            .unwrap();
        assert_eq!(default_view.len(), 1);
        assert!(default_view[0].is_node_scoped());
    }

    #[test]
    fn instances_by_service_joins_nodes() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();
        txn.put_node(test_node("n2")).unwrap();
        txn.put_service(test_service("n1", "web-0", "web")).unwrap();
        txn.put_service(test_service("n2", "web-1", "web")).unwrap();
        txn.put_service(test_service("n2", "api-0", "api")).unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        let web = snap.list_instances_by_service("web", None).unwrap();
        assert_eq!(web.len(), 2);
        for (node, sn) in &web {
            assert_eq!(node.name, sn.node);
            assert_eq!(sn.service, "web");
        }
    }

    #[test]
    fn connect_instances_resolve_proxies_and_native() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n1")).unwrap();

        let mut proxy = test_service("n1", "web-sidecar", "web-sidecar-proxy");
        proxy.kind = ServiceKind::ConnectProxy;
        proxy.proxy.destination_service = "web".to_string();
        txn.put_service(proxy).unwrap();

        let mut native = test_service("n1", "web-0", "web");
        native.connect_native = true;
        txn.put_service(native).unwrap();

        // Plain instance of the same service is not connect-visible.
        txn.put_service(test_service("n1", "web-1", "web")).unwrap();
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        let connect = snap.list_connect_instances("web", None).unwrap();
        assert_eq!(connect.len(), 2);
        assert!(connect.iter().all(|(_, sn)| sn.connect_enabled()));
    }

    // ── Commit index ───────────────────────────────────────────────

    #[test]
    fn commit_index_is_monotonic() {
        let store = CatalogStore::open_in_memory().unwrap();
        assert_eq!(store.snapshot().unwrap().index(), 0);

        let idx1 = seed(&store);
        assert_eq!(idx1, 1);
        assert_eq!(store.snapshot().unwrap().index(), 1);

        let mut txn = store.begin().unwrap();
        assert_eq!(txn.index(), 2);
        txn.put_node(test_node("n2")).unwrap();
        assert_eq!(txn.commit().unwrap(), 2);
        assert_eq!(store.snapshot().unwrap().index(), 2);
    }

    #[test]
    fn aborted_txn_leaves_no_trace() {
        let store = CatalogStore::open_in_memory().unwrap();
        seed(&store);

        let mut txn = store.begin().unwrap();
        txn.put_node(test_node("n9")).unwrap();
        txn.delete_service("n1", DEFAULT_NAMESPACE, "web-0").unwrap();
        txn.abort().unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.index(), 1);
        assert!(snap.get_node("n9").unwrap().is_none());
        assert!(snap
            .get_service("n1", DEFAULT_NAMESPACE, "web-0")
            .unwrap()
            .is_some());
    }

    // ── Changeset capture ──────────────────────────────────────────

    #[test]
    fn changeset_records_before_and_after_images() {
        let store = CatalogStore::open_in_memory().unwrap();
        seed(&store);

        let mut txn = store.begin().unwrap();
        let mut renamed = test_service("n1", "web-0", "web-v2");
        renamed.port = 9090;
        txn.put_service(renamed).unwrap();
        txn.delete_check("n1", DEFAULT_NAMESPACE, "serf").unwrap();
        txn.put_node(test_node("n3")).unwrap();

        let changes = txn.changes();
        assert_eq!(changes.len(), 3);
        match &changes[0] {
            Change::Service(RowChange::Updated { before, after }) => {
                assert_eq!(before.service, "web");
                assert_eq!(after.service, "web-v2");
                assert_eq!(after.port, 9090);
            }
            other => panic!("expected service update, got {other:?}"),
        }
        match &changes[1] {
            Change::Check(RowChange::Deleted { before }) => {
                assert_eq!(before.check_id, "serf");
            }
            other => panic!("expected check delete, got {other:?}"),
        }
        match &changes[2] {
            Change::Node(RowChange::Created { after }) => assert_eq!(after.name, "n3"),
            other => panic!("expected node create, got {other:?}"),
        }
    }

    #[test]
    fn delete_node_cascades_services_and_checks() {
        let store = CatalogStore::open_in_memory().unwrap();
        seed(&store);

        let mut txn = store.begin().unwrap();
        assert!(txn.delete_node("n1").unwrap());

        // Two service deletes, two check deletes (one cascaded via its
        // service, one node-scoped), one node delete.
        let changes = txn.changes();
        let service_deletes = changes
            .iter()
            .filter(|c| matches!(c, Change::Service(RowChange::Deleted { .. })))
            .count();
        let check_deletes = changes
            .iter()
            .filter(|c| matches!(c, Change::Check(RowChange::Deleted { .. })))
            .count();
        let node_deletes = changes
            .iter()
            .filter(|c| matches!(c, Change::Node(RowChange::Deleted { .. })))
            .count();
        assert_eq!((service_deletes, check_deletes, node_deletes), (2, 2, 1));

        txn.commit().unwrap();
        let snap = store.snapshot().unwrap();
        assert!(snap.get_node("n1").unwrap().is_none());
        assert!(snap.list_services_on_node("n1", None).unwrap().is_empty());
        assert!(snap.list_checks_on_node("n1", None).unwrap().is_empty());
    }

    #[test]
    fn delete_service_cascades_only_its_checks() {
        let store = CatalogStore::open_in_memory().unwrap();
        seed(&store);

        let mut txn = store.begin().unwrap();
        assert!(txn.delete_service("n1", DEFAULT_NAMESPACE, "web-0").unwrap());
        txn.commit().unwrap();

        let snap = store.snapshot().unwrap();
        let remaining = snap.list_checks_on_node("n1", None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_node_scoped());
    }

    #[test]
    fn delete_missing_rows_return_false() {
        let store = CatalogStore::open_in_memory().unwrap();
        let mut txn = store.begin().unwrap();
        assert!(!txn.delete_node("ghost").unwrap());
        assert!(!txn.delete_service("ghost", DEFAULT_NAMESPACE, "x").unwrap());
        assert!(!txn.delete_check("ghost", DEFAULT_NAMESPACE, "x").unwrap());
        assert!(txn.changes().is_empty());
    }

    // ── Writer's read view ─────────────────────────────────────────

    #[test]
    fn write_txn_reads_its_own_writes() {
        let store = CatalogStore::open_in_memory().unwrap();
        seed(&store);

        let mut txn = store.begin().unwrap();
        let mut moved = test_service("n1", "web-0", "web-v2");
        moved.port = 9090;
        txn.put_service(moved).unwrap();
        txn.delete_service("n1", DEFAULT_NAMESPACE, "api-0").unwrap();

        // The txn's reader sees the uncommitted state...
        let sn = txn
            .get_service("n1", DEFAULT_NAMESPACE, "web-0")
            .unwrap()
            .unwrap();
        assert_eq!(sn.service, "web-v2");
        assert!(txn
            .get_service("n1", DEFAULT_NAMESPACE, "api-0")
            .unwrap()
            .is_none());

        // ...while a concurrent snapshot still sees the committed state.
        let snap = store.snapshot().unwrap();
        assert_eq!(
            snap.get_service("n1", DEFAULT_NAMESPACE, "web-0")
                .unwrap()
                .unwrap()
                .service,
            "web"
        );
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("catalog.redb");

        {
            let store = CatalogStore::open(&db_path).unwrap();
            seed(&store);
        }

        let store = CatalogStore::open(&db_path).unwrap();
        let snap = store.snapshot().unwrap();
        assert_eq!(snap.index(), 1);
        assert!(snap.get_node("n1").unwrap().is_some());
        assert_eq!(snap.list_services_on_node("n1", None).unwrap().len(), 2);
    }
}
