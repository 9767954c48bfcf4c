//! Registry façade over the persistent store.
//!
//! The registry owns all node and placement state for one data directory
//! and mediates concurrent access through a process-wide reader/writer
//! lock. Plain reads take the shared guard; writes and every compound
//! read-modify-write operation hold the exclusive guard for their full
//! duration, so concurrent heartbeats for the same node serialize instead
//! of losing updates.

use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, RegistryResult};
use crate::node::{NodeInfo, NodeResources, NodeRole, NodeStatus};
use crate::placement::{select_best_node, AccountPlacement};
use crate::store::{FileStore, Namespace};

/// Cluster state registry for one data directory.
///
/// The registry assumes it is the only writer against its directory;
/// cross-process sharing is not supported.
pub struct Registry {
    store: FileStore,
    config: RegistryConfig,
    lock: RwLock<()>,
}

impl Registry {
    /// Open the registry, creating the data directory layout if needed
    pub fn open(config: RegistryConfig) -> RegistryResult<Self> {
        let store = FileStore::open(config.get_data_dir())?;
        info!("registry opened at {}", config.get_data_dir().display());

        Ok(Self {
            store,
            config,
            lock: RwLock::new(()),
        })
    }

    /// Fetch one node record by id
    pub fn get_node(&self, id: &str) -> RegistryResult<NodeInfo> {
        let _guard = self.lock.read();
        self.get_node_inner(id)
    }

    /// Persist a node record, overwriting any previous record for the
    /// same id. The caller populates `joined_at` on first save.
    pub fn save_node(&self, node: &NodeInfo) -> RegistryResult<()> {
        let _guard = self.lock.write();
        self.store.write(Namespace::Nodes, &node.id, node)?;
        debug!("saved node {} ({})", node.id, node.status);
        Ok(())
    }

    /// Remove a node record. Fails with `NodeNotFound` if no record
    /// exists. Placements referencing the node are left in place.
    pub fn delete_node(&self, id: &str) -> RegistryResult<()> {
        let _guard = self.lock.write();
        self.get_node_inner(id)?;
        self.store.delete(Namespace::Nodes, id)?;
        info!("deleted node {}", id);
        Ok(())
    }

    /// Snapshot of all persisted nodes, in unspecified order. Records
    /// that fail to parse are omitted.
    pub fn list_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        let _guard = self.lock.read();
        self.list_nodes_inner()
    }

    /// All nodes whose status is `online`
    pub fn list_online_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        let _guard = self.lock.read();
        let mut nodes = self.list_nodes_inner()?;
        nodes.retain(NodeInfo::is_online);
        Ok(nodes)
    }

    /// All nodes carrying the given role. A node advertising `all`
    /// matches every role; querying for `all` matches every node.
    pub fn list_nodes_by_role(&self, role: NodeRole) -> RegistryResult<Vec<NodeInfo>> {
        let _guard = self.lock.read();
        let mut nodes = self.list_nodes_inner()?;
        nodes.retain(|n| n.has_role(role));
        Ok(nodes)
    }

    /// Set a node's status and refresh its last-seen timestamp
    pub fn update_node_status(&self, id: &str, status: NodeStatus) -> RegistryResult<()> {
        let _guard = self.lock.write();
        self.set_status_inner(id, status)
    }

    /// Replace a node's resource snapshot and refresh its last-seen
    /// timestamp
    pub fn update_node_resources(&self, id: &str, resources: NodeResources) -> RegistryResult<()> {
        let _guard = self.lock.write();
        let mut node = self.get_node_inner(id)?;
        node.set_resources(resources);
        node.touch();
        self.store.write(Namespace::Nodes, id, &node)?;
        Ok(())
    }

    /// Process a heartbeat: promote the node to online, refresh its
    /// last-seen timestamp and, when supplied, replace its resource
    /// snapshot.
    ///
    /// Heartbeats never auto-register; a heartbeat from a node that has
    /// not joined fails with `NodeNotFound`.
    pub fn process_heartbeat(
        &self,
        id: &str,
        resources: Option<NodeResources>,
    ) -> RegistryResult<()> {
        let _guard = self.lock.write();
        let mut node = self.get_node_inner(id)?;
        node.mark_online();
        if let Some(resources) = resources {
            node.set_resources(resources);
        }
        self.store.write(Namespace::Nodes, id, &node)?;
        debug!("heartbeat from node {}", id);
        Ok(())
    }

    /// Every online node whose last heartbeat predates `now - timeout`.
    /// Purely observational; mutates nothing. Nodes in `maintenance` or
    /// `draining` are never reported.
    pub fn get_dead_nodes(&self, timeout: Duration) -> RegistryResult<Vec<NodeInfo>> {
        let _guard = self.lock.read();
        let mut nodes = self.list_nodes_inner()?;
        nodes.retain(|n| is_dead(n, timeout));
        Ok(nodes)
    }

    /// Demote every dead node to `offline`, returning the ids that were
    /// demoted. Best-effort: a node whose update fails is logged and
    /// omitted from the result, not retried.
    pub fn mark_dead_nodes(&self, timeout: Duration) -> RegistryResult<Vec<String>> {
        let _guard = self.lock.write();
        let mut dead = self.list_nodes_inner()?;
        dead.retain(|n| is_dead(n, timeout));

        let mut marked = Vec::new();
        for node in dead {
            match self.set_status_inner(&node.id, NodeStatus::Offline) {
                Ok(()) => {
                    info!("marked dead node {} offline", node.id);
                    marked.push(node.id);
                }
                Err(e) => warn!("failed to mark node {} offline: {}", node.id, e),
            }
        }

        Ok(marked)
    }

    /// Demote dead nodes using the configured inactivity timeout
    pub fn sweep_dead_nodes(&self) -> RegistryResult<Vec<String>> {
        self.mark_dead_nodes(self.config.get_node_timeout())
    }

    /// Fetch the placement record for an account
    pub fn get_account_placement(&self, account_id: u64) -> RegistryResult<AccountPlacement> {
        let _guard = self.lock.read();
        self.store
            .read(Namespace::Placements, &placement_key(account_id))?
            .ok_or(RegistryError::PlacementNotFound(account_id))
    }

    /// Record an account→node binding as of now, overwriting any previous
    /// binding for the account. The node is not verified to exist;
    /// callers are expected to have chosen it via placement selection.
    pub fn set_account_placement(&self, account_id: u64, node_id: &str) -> RegistryResult<()> {
        if account_id == 0 {
            return Err(RegistryError::InvalidRecord(
                "account id must be positive".to_string(),
            ));
        }

        let _guard = self.lock.write();
        let placement = AccountPlacement::new(account_id, node_id);
        self.store
            .write(Namespace::Placements, &placement_key(account_id), &placement)?;
        info!("placed account {} on node {}", account_id, node_id);
        Ok(())
    }

    /// Pick the best online node for a new account with the given role,
    /// without recording anything
    pub fn get_best_node_for_placement(&self, role: NodeRole) -> RegistryResult<NodeInfo> {
        let _guard = self.lock.read();
        let nodes = self.list_nodes_inner()?;
        select_best_node(&nodes, role).cloned()
    }

    /// Select a node for the account and durably record the binding in
    /// one exclusive section, returning the chosen node
    pub fn place_account(&self, account_id: u64, role: NodeRole) -> RegistryResult<NodeInfo> {
        if account_id == 0 {
            return Err(RegistryError::InvalidRecord(
                "account id must be positive".to_string(),
            ));
        }

        let _guard = self.lock.write();
        let nodes = self.list_nodes_inner()?;
        let chosen = select_best_node(&nodes, role)?.clone();

        let placement = AccountPlacement::new(account_id, &chosen.id);
        self.store
            .write(Namespace::Placements, &placement_key(account_id), &placement)?;
        info!("placed account {} on node {}", account_id, chosen.id);
        Ok(chosen)
    }

    fn get_node_inner(&self, id: &str) -> RegistryResult<NodeInfo> {
        let node: NodeInfo = self
            .store
            .read(Namespace::Nodes, id)?
            .ok_or_else(|| RegistryError::NodeNotFound(id.to_string()))?;
        if node.status == NodeStatus::Unknown {
            warn!("node {} has an unrecognized status on disk", id);
        }
        Ok(node)
    }

    fn list_nodes_inner(&self) -> RegistryResult<Vec<NodeInfo>> {
        let nodes: Vec<NodeInfo> = self.store.load_all(Namespace::Nodes)?;
        for node in &nodes {
            if node.status == NodeStatus::Unknown {
                warn!("node {} has an unrecognized status on disk", node.id);
            }
        }
        Ok(nodes)
    }

    fn set_status_inner(&self, id: &str, status: NodeStatus) -> RegistryResult<()> {
        let mut node = self.get_node_inner(id)?;
        node.status = status;
        node.touch();
        self.store.write(Namespace::Nodes, id, &node)?;
        debug!("node {} status -> {}", id, status);
        Ok(())
    }
}

fn placement_key(account_id: u64) -> String {
    format!("a-{}", account_id)
}

fn is_dead(node: &NodeInfo, timeout: Duration) -> bool {
    if !node.is_online() {
        return false;
    }
    // A last_seen in the future yields a negative age and is never dead
    Utc::now()
        .signed_duration_since(node.last_seen)
        .to_std()
        .map(|age| age > timeout)
        .unwrap_or(false)
}
