//! Placement selection for new accounts.
//!
//! The selector is a pure function over a point-in-time snapshot of the
//! node set; it never re-reads state and never persists its decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::node::{NodeInfo, NodeResources, NodeRole};

/// Durable binding of an account to the node hosting it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPlacement {
    /// Account identifier, positive
    pub account_id: u64,

    /// Node the account was placed on
    pub node_id: String,

    /// Time the binding was recorded
    pub placed_at: DateTime<Utc>,
}

impl AccountPlacement {
    /// Create a binding recorded as of now
    pub fn new(account_id: u64, node_id: impl Into<String>) -> Self {
        AccountPlacement {
            account_id,
            node_id: node_id.into(),
            placed_at: Utc::now(),
        }
    }
}

/// Free-capacity score of a resource snapshot.
///
/// Sum of free CPU, RAM and disk percentages, each clamped to [0,100]:
/// 300 means completely idle, 0 means completely full. The three axes are
/// weighted equally; this function is the single place to change that
/// policy.
pub fn capacity_score(resources: &NodeResources) -> u32 {
    let free = |used: u8| 100 - u32::from(used.min(100));
    free(resources.used_cpu_percent)
        + free(resources.used_ram_percent)
        + free(resources.used_disk_percent)
}

/// Select the best node for placing a new account with the given role.
///
/// Candidates must be online, carry `role` (or `all`), and have reported a
/// resource snapshot. The node with the strictly greatest capacity score
/// wins; on equal scores the earliest candidate in iteration order is
/// kept. Fails with [`RegistryError::NoSuitableNode`] when nothing
/// survives filtering.
pub fn select_best_node<'a>(
    candidates: &'a [NodeInfo],
    role: NodeRole,
) -> RegistryResult<&'a NodeInfo> {
    let mut best: Option<(&NodeInfo, u32)> = None;

    for node in candidates {
        if !node.is_online() || !node.has_role(role) {
            continue;
        }
        let resources = match &node.resources {
            Some(r) => r,
            None => continue,
        };

        let score = capacity_score(resources);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((node, score)),
        }
    }

    best.map(|(node, _)| node)
        .ok_or(RegistryError::NoSuitableNode(role))
}
