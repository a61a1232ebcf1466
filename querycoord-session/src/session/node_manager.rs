//! Registry of query nodes currently participating in the cluster
//!
//! Membership handlers add and remove nodes, heartbeat handlers look nodes up
//! and update their stats, schedulers list nodes and skip the stopping ones.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::node_info::{ImmutableNodeInfo, NodeId, NodeInfo, NodeState};

/// In-memory node registry
///
/// Shared between collaborators as `Arc<NodeManager>`. A single map lock
/// guards membership so that [`get_all`](Self::get_all) returns a consistent
/// snapshot; per-node state lives behind each node's own locks.
#[derive(Debug, Default)]
pub struct NodeManager {
    nodes: RwLock<HashMap<NodeId, Arc<NodeInfo>>>,
}

impl NodeManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node, replacing any node with the same id
    ///
    /// A replaced node's stats and state are discarded; the new record
    /// starts out `Normal` with zeroed stats.
    pub fn add(&self, info: ImmutableNodeInfo) -> Arc<NodeInfo> {
        let node = Arc::new(NodeInfo::new(info));
        let previous = self.nodes.write().insert(node.id(), Arc::clone(&node));

        if let Some(previous) = previous {
            tracing::warn!(
                node_id = node.id(),
                previous_addr = previous.addr(),
                address = node.addr(),
                "Node re-registered, previous stats and state discarded"
            );
        } else {
            tracing::info!(node_id = node.id(), address = node.addr(), "Node added");
        }

        node
    }

    /// Look up a node
    #[must_use]
    pub fn get(&self, node_id: NodeId) -> Option<Arc<NodeInfo>> {
        self.nodes.read().get(&node_id).cloned()
    }

    /// Snapshot of all registered nodes, in no particular order
    #[must_use]
    pub fn get_all(&self) -> Vec<Arc<NodeInfo>> {
        self.nodes.read().values().cloned().collect()
    }

    /// Unregister a node; absent ids are ignored
    pub fn remove(&self, node_id: NodeId) -> Option<Arc<NodeInfo>> {
        let removed = self.nodes.write().remove(&node_id);
        if removed.is_some() {
            tracing::info!(node_id, "Node removed");
        }
        removed
    }

    /// Remove `node` only if it is still the registered record for its id
    ///
    /// Used by collaborators acting on a snapshot, so that a node which
    /// re-joined in the meantime is left alone.
    pub fn remove_exact(&self, node: &Arc<NodeInfo>) -> bool {
        let mut nodes = self.nodes.write();
        let is_current = nodes
            .get(&node.id())
            .is_some_and(|current| Arc::ptr_eq(current, node));
        if is_current {
            nodes.remove(&node.id());
            tracing::info!(node_id = node.id(), "Node removed");
        }
        is_current
    }

    /// Mark a node as draining; no-op if the node is unknown
    pub fn stopping(&self, node_id: NodeId) {
        match self.get(node_id) {
            Some(node) => {
                if !node.is_stopping_state() {
                    tracing::info!(node_id, "Node marked as stopping");
                }
                node.set_state(NodeState::Stopping);
            }
            None => {
                tracing::debug!(node_id, "Ignoring stopping request for unknown node");
            }
        }
    }

    /// Whether a node is draining
    ///
    /// Unknown nodes report `false`; use [`node_state`](Self::node_state)
    /// to tell an absent node from a healthy one.
    #[must_use]
    pub fn is_stopping_node(&self, node_id: NodeId) -> bool {
        self.node_state(node_id).is_some_and(NodeState::is_stopping)
    }

    /// Health state of a node, `None` if it is not registered
    #[must_use]
    pub fn node_state(&self, node_id: NodeId) -> Option<NodeState> {
        self.nodes.read().get(&node_id).map(|node| node.state())
    }

    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.read().contains_key(&node_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StatsOption;

    fn localhost(node_id: NodeId) -> ImmutableNodeInfo {
        ImmutableNodeInfo::new(node_id, "localhost", "localhost")
    }

    #[test]
    fn test_node_operation() {
        let manager = NodeManager::new();
        manager.add(localhost(1));
        manager.add(localhost(2));
        manager.add(localhost(3));

        assert!(manager.get(1).is_some());
        assert_eq!(manager.get_all().len(), 3);

        manager.remove(1);
        assert!(manager.get(1).is_none());
        assert_eq!(manager.get_all().len(), 2);

        manager.stopping(2);
        assert!(manager.is_stopping_node(2));

        let node = manager.get(2).unwrap();
        node.set_state(NodeState::Normal);
        assert!(!manager.is_stopping_node(2));
    }

    #[test]
    fn test_get_all_returns_each_node_once() {
        let manager = NodeManager::new();
        for id in [10, 20, 30] {
            manager.add(localhost(id));
        }

        let mut ids: Vec<NodeId> = manager.get_all().iter().map(|n| n.id()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let manager = NodeManager::new();
        manager.add(localhost(1));

        assert!(manager.remove(42).is_none());
        assert_eq!(manager.len(), 1);

        assert!(manager.remove(1).is_some());
        assert!(manager.remove(1).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_stopping_unknown_node() {
        let manager = NodeManager::new();

        manager.stopping(7);
        assert!(!manager.is_stopping_node(7));
        assert!(manager.node_state(7).is_none());
        assert!(!manager.contains(7));
    }

    #[test]
    fn test_node_state_distinguishes_absent() {
        let manager = NodeManager::new();
        manager.add(localhost(1));

        assert_eq!(manager.node_state(1), Some(NodeState::Normal));
        assert_eq!(manager.node_state(2), None);

        manager.stopping(1);
        assert_eq!(manager.node_state(1), Some(NodeState::Stopping));
    }

    #[test]
    fn test_add_replaces_existing_node() {
        let manager = NodeManager::new();
        let old = manager.add(localhost(1));
        old.update_stats([StatsOption::segment_count(10)]);
        manager.stopping(1);

        let new = manager.add(ImmutableNodeInfo::new(1, "10.0.0.1:21123", "worker-1"));

        assert_eq!(manager.len(), 1);
        let current = manager.get(1).unwrap();
        assert!(Arc::ptr_eq(&current, &new));
        assert_eq!(current.addr(), "10.0.0.1:21123");
        assert_eq!(current.segment_count(), 0);
        assert!(!manager.is_stopping_node(1));
    }

    #[test]
    fn test_stale_handle_is_detached() {
        let manager = NodeManager::new();
        let stale = manager.add(localhost(1));
        manager.remove(1);

        // Still readable, but no longer reachable through the manager
        stale.update_stats([StatsOption::channel_count(3)]);
        assert_eq!(stale.channel_count(), 3);
        assert!(manager.get(1).is_none());
    }

    #[test]
    fn test_remove_exact_skips_rejoined_node() {
        let manager = NodeManager::new();
        let old = manager.add(localhost(1));
        let new = manager.add(localhost(1));

        assert!(!manager.remove_exact(&old));
        assert!(manager.contains(1));

        assert!(manager.remove_exact(&new));
        assert!(!manager.contains(1));
    }

    #[test]
    fn test_get_all_is_a_snapshot() {
        let manager = NodeManager::new();
        manager.add(localhost(1));
        manager.add(localhost(2));

        let snapshot = manager.get_all();
        manager.remove(1);
        manager.add(localhost(3));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(manager.len(), 2);
    }
}
