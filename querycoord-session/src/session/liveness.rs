//! Heartbeat-based liveness monitoring
//!
//! Marks nodes whose last heartbeat is older than the configured timeout as
//! stopping, and optionally removes nodes that stay silent even longer.
//! Works purely through the public [`NodeManager`] contract.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::node_info::{NodeId, NodeState};
use super::node_manager::NodeManager;
use crate::config::LivenessConfig;
use crate::error::Result;

/// Outcome of a single liveness pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub marked_stopping: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

impl LivenessReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.marked_stopping.is_empty() && self.removed.is_empty()
    }
}

/// Liveness monitor for registered nodes
///
/// Never moves a node back to `Normal`: a stopping node may have been
/// drained on purpose, so recovery is left to whoever re-adds it.
pub struct LivenessMonitor {
    node_manager: Arc<NodeManager>,
    config: LivenessConfig,
    cancel_token: CancellationToken,
}

impl LivenessMonitor {
    #[must_use]
    pub fn new(node_manager: Arc<NodeManager>, config: LivenessConfig) -> Self {
        Self {
            node_manager,
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Run one liveness pass against `now`
    pub fn check(&self, now: DateTime<Utc>) -> LivenessReport {
        Self::check_nodes(&self.node_manager, &self.config, now)
    }

    fn check_nodes(
        node_manager: &NodeManager,
        config: &LivenessConfig,
        now: DateTime<Utc>,
    ) -> LivenessReport {
        let heartbeat_timeout = Duration::from_secs(config.heartbeat_timeout_secs);
        let removal_timeout = config.removal_timeout_secs.map(Duration::from_secs);
        let mut report = LivenessReport::default();

        for node in node_manager.get_all() {
            if removal_timeout.is_some_and(|timeout| node.is_stale(now, timeout)) {
                if node_manager.remove_exact(&node) {
                    tracing::warn!(
                        node_id = node.id(),
                        last_heartbeat = ?node.last_heartbeat(),
                        "Node removed: heartbeat expired"
                    );
                    report.removed.push(node.id());
                }
            } else if !node.is_stopping_state() && node.is_stale(now, heartbeat_timeout) {
                tracing::warn!(
                    node_id = node.id(),
                    last_heartbeat = ?node.last_heartbeat(),
                    "Node marked as stopping: heartbeat expired"
                );
                node.set_state(NodeState::Stopping);
                report.marked_stopping.push(node.id());
            }
        }

        report
    }

    /// Start the liveness loop
    ///
    /// Must be called from within a tokio runtime. Returns the `JoinHandle`
    /// so the caller can detect panics; use `shutdown()` to stop the loop.
    pub fn start(&self) -> Result<tokio::task::JoinHandle<()>> {
        self.config.validate()?;

        let node_manager = self.node_manager.clone();
        let config = self.config.clone();
        let cancel_token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut timer = interval(Duration::from_secs(config.check_interval_secs));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Liveness monitor shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        let report = Self::check_nodes(&node_manager, &config, Utc::now());
                        if !report.is_empty() {
                            tracing::debug!(
                                marked_stopping = report.marked_stopping.len(),
                                removed = report.removed.len(),
                                "Liveness check completed"
                            );
                        }
                    }
                }
            }
        });

        Ok(handle)
    }

    /// Gracefully stop the liveness loop
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::session::ImmutableNodeInfo;
    use chrono::TimeDelta;

    fn config(heartbeat_timeout_secs: u64, removal_timeout_secs: Option<u64>) -> LivenessConfig {
        LivenessConfig {
            check_interval_secs: 1,
            heartbeat_timeout_secs,
            removal_timeout_secs,
        }
    }

    fn add_with_heartbeat(manager: &NodeManager, node_id: NodeId, at: Option<DateTime<Utc>>) {
        let node = manager.add(ImmutableNodeInfo::new(node_id, "localhost", "localhost"));
        if let Some(at) = at {
            node.set_last_heartbeat(at);
        }
    }

    #[test]
    fn test_check_marks_stale_nodes_stopping() {
        let manager = Arc::new(NodeManager::new());
        let now = Utc::now();
        add_with_heartbeat(&manager, 1, Some(now - TimeDelta::seconds(5)));
        add_with_heartbeat(&manager, 2, Some(now - TimeDelta::seconds(60)));
        add_with_heartbeat(&manager, 3, None);

        let monitor = LivenessMonitor::new(manager.clone(), config(30, None));
        let report = monitor.check(now);

        assert_eq!(report.marked_stopping, vec![2]);
        assert!(report.removed.is_empty());
        assert!(!manager.is_stopping_node(1));
        assert!(manager.is_stopping_node(2));
        assert!(!manager.is_stopping_node(3));

        // Already stopping nodes are not reported again
        assert!(monitor.check(now).is_empty());
    }

    #[test]
    fn test_check_removes_long_silent_nodes() {
        let manager = Arc::new(NodeManager::new());
        let now = Utc::now();
        add_with_heartbeat(&manager, 1, Some(now - TimeDelta::seconds(60)));
        add_with_heartbeat(&manager, 2, Some(now - TimeDelta::seconds(300)));

        let monitor = LivenessMonitor::new(manager.clone(), config(30, Some(120)));
        let report = monitor.check(now);

        assert_eq!(report.marked_stopping, vec![1]);
        assert_eq!(report.removed, vec![2]);
        assert!(manager.get(2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_check_does_not_restore_recovered_nodes() {
        let manager = Arc::new(NodeManager::new());
        let now = Utc::now();
        add_with_heartbeat(&manager, 1, Some(now - TimeDelta::seconds(60)));

        let monitor = LivenessMonitor::new(manager.clone(), config(30, None));
        monitor.check(now);
        assert!(manager.is_stopping_node(1));

        manager.get(1).unwrap().set_last_heartbeat(now);
        assert!(monitor.check(now).is_empty());
        assert!(manager.is_stopping_node(1));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let manager = Arc::new(NodeManager::new());
        let monitor = LivenessMonitor::new(manager, config(30, Some(10)));

        assert!(matches!(monitor.start(), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let manager = Arc::new(NodeManager::new());
        add_with_heartbeat(&manager, 1, Some(Utc::now() - TimeDelta::seconds(60)));

        let monitor = LivenessMonitor::new(manager.clone(), config(30, None));
        let handle = monitor.start().unwrap();

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.is_stopping_node(1));

        monitor.shutdown();
        assert!(handle.await.is_ok());
    }
}
