//! Node module for cluster node identification and liveness state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Node is up and heartbeating
    Online,

    /// Node has stopped heartbeating or was taken down
    Offline,

    /// Node is under operator maintenance; the dead-node sweep skips it
    Maintenance,

    /// Node is being drained of workload; no new placements land on it
    Draining,

    /// Status string on disk was not recognized
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Maintenance => write!(f, "maintenance"),
            NodeStatus::Draining => write!(f, "draining"),
            NodeStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Workload class a node is willing to carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Web/application hosting
    Web,

    /// Database hosting
    Data,

    /// Mail hosting
    Mail,

    /// DNS service
    Dns,

    /// Backup target
    Backup,

    /// Every role at once; matches any role query
    All,

    /// Role string on disk was not recognized
    #[serde(other)]
    Unknown,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Web => write!(f, "web"),
            NodeRole::Data => write!(f, "data"),
            NodeRole::Mail => write!(f, "mail"),
            NodeRole::Dns => write!(f, "dns"),
            NodeRole::Backup => write!(f, "backup"),
            NodeRole::All => write!(f, "all"),
            NodeRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time resource snapshot reported by a node.
///
/// The snapshot is always replaced as a whole; there is no partial update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResources {
    /// Number of CPU cores
    pub cpu_cores: u64,

    /// Total RAM in megabytes
    pub ram_mb: u64,

    /// Total disk in gigabytes
    pub disk_gb: u64,

    /// CPU utilization, 0-100
    pub used_cpu_percent: u8,

    /// RAM utilization, 0-100
    pub used_ram_percent: u8,

    /// Disk utilization, 0-100
    pub used_disk_percent: u8,

    /// Number of hosted accounts
    pub account_count: u64,

    /// Number of hosted domains
    pub domain_count: u64,
}

/// Information about a node in the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier; doubles as the record filename stem
    pub id: String,

    /// Network address of the node
    pub ip: String,

    /// Human-readable host name
    pub hostname: String,

    /// Roles the node advertises
    pub roles: Vec<NodeRole>,

    /// Region the node is deployed in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Datacenter within the region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,

    /// Current operational status
    pub status: NodeStatus,

    /// Last time the node was heard from
    pub last_seen: DateTime<Utc>,

    /// Time the node joined the cluster
    pub joined_at: DateTime<Utc>,

    /// Software version running on the node
    pub version: String,

    /// Latest resource snapshot, if the node has reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<NodeResources>,

    /// Free-form operator labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

impl NodeInfo {
    /// Create a new node record, online as of now
    pub fn new(
        id: impl Into<String>,
        ip: impl Into<String>,
        hostname: impl Into<String>,
        roles: Vec<NodeRole>,
        version: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        NodeInfo {
            id: id.into(),
            ip: ip.into(),
            hostname: hostname.into(),
            roles,
            region: None,
            datacenter: None,
            status: NodeStatus::Online,
            last_seen: now,
            joined_at: now,
            version: version.into(),
            resources: None,
            labels: None,
        }
    }

    /// Mark the node online and refresh its last-seen timestamp
    pub fn mark_online(&mut self) {
        self.status = NodeStatus::Online;
        self.touch();
    }

    /// Mark the node offline
    pub fn mark_offline(&mut self) {
        self.status = NodeStatus::Offline;
    }

    /// Refresh the last-seen timestamp to now
    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Check if the node is online
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// Check if the node carries a role.
    ///
    /// A node advertising `all` matches every role, and a query for `all`
    /// matches every node.
    pub fn has_role(&self, role: NodeRole) -> bool {
        role == NodeRole::All
            || self.roles.contains(&role)
            || self.roles.contains(&NodeRole::All)
    }

    /// Replace the resource snapshot as a whole
    pub fn set_resources(&mut self, resources: NodeResources) {
        self.resources = Some(resources);
    }

    /// Add an operator label to the node
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
    }
}
