//! Per-node identity, health state and runtime statistics
//!
//! A [`NodeInfo`] is shared as `Arc<NodeInfo>` between the [`NodeManager`]
//! that owns the registration and every collaborator that looked it up.
//! Statistics are updated through [`StatsOption`] descriptors, each of which
//! mutates one field; new statistics only need a new constructor.
//!
//! [`NodeManager`]: super::NodeManager

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// Cluster-wide unique identifier of a worker node
pub type NodeId = i64;

/// Identity of a node, fixed when the node joins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableNodeInfo {
    pub node_id: NodeId,
    pub address: String,
    pub hostname: String,
    /// Server version reported on join, empty if unknown
    #[serde(default)]
    pub version: String,
    /// Free-form placement labels (resource group hints etc.)
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ImmutableNodeInfo {
    #[must_use]
    pub fn new(node_id: NodeId, address: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            node_id,
            address: address.into(),
            hostname: hostname.into(),
            version: String::new(),
            labels: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Health state of a node as seen by schedulers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeState {
    /// Eligible for new assignments
    #[default]
    Normal = 0,
    /// Draining: existing work continues, no new assignments
    Stopping = 1,
}

impl NodeState {
    #[must_use]
    pub const fn is_stopping(self) -> bool {
        matches!(self, Self::Stopping)
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Stopping,
            _ => Self::Normal,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Runtime load statistics reported by a node
///
/// Zero means "not reported yet" for `cpu_num` and `mem_capacity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStats {
    pub segment_count: usize,
    pub channel_count: usize,
    pub cpu_num: usize,
    /// Memory capacity in MB
    pub mem_capacity: f64,
}

/// A single named mutation of [`NodeStats`]
///
/// Options are applied in order under the node's stats lock, so a batch
/// passed to [`NodeInfo::update_stats`] becomes visible all at once.
pub struct StatsOption {
    name: &'static str,
    apply: Box<dyn FnOnce(&mut NodeStats) + Send>,
}

impl StatsOption {
    /// Build a custom option; `name` is only used for tracing
    ///
    /// `apply` runs while the node's stats write lock is held, and that lock
    /// is not reentrant: the closure must not read or update the same
    /// [`NodeInfo`] (e.g. through a captured `Arc<NodeInfo>`), or it deadlocks.
    pub fn new(name: &'static str, apply: impl FnOnce(&mut NodeStats) + Send + 'static) -> Self {
        Self {
            name,
            apply: Box::new(apply),
        }
    }

    #[must_use]
    pub fn segment_count(count: usize) -> Self {
        Self::new("segment_count", move |stats| stats.segment_count = count)
    }

    #[must_use]
    pub fn channel_count(count: usize) -> Self {
        Self::new("channel_count", move |stats| stats.channel_count = count)
    }

    #[must_use]
    pub fn cpu_num(num: usize) -> Self {
        Self::new("cpu_num", move |stats| stats.cpu_num = num)
    }

    #[must_use]
    pub fn mem_capacity(capacity: f64) -> Self {
        Self::new("mem_capacity", move |stats| stats.mem_capacity = capacity)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    fn apply(self, stats: &mut NodeStats) {
        (self.apply)(stats);
    }
}

impl fmt::Debug for StatsOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatsOption").field("name", &self.name).finish_non_exhaustive()
    }
}

/// One registered worker node
///
/// Holding an `Arc<NodeInfo>` after the node was removed from (or replaced
/// in) the [`NodeManager`](super::NodeManager) keeps the value alive, but
/// updates made through it are no longer visible via the manager.
#[derive(Debug)]
pub struct NodeInfo {
    immutable_info: ImmutableNodeInfo,
    stats: RwLock<NodeStats>,
    state: AtomicU8,
    last_heartbeat: RwLock<Option<DateTime<Utc>>>,
}

impl NodeInfo {
    /// Create a node in [`NodeState::Normal`] with zeroed stats and no heartbeat
    #[must_use]
    pub fn new(immutable_info: ImmutableNodeInfo) -> Self {
        Self {
            immutable_info,
            stats: RwLock::new(NodeStats::default()),
            state: AtomicU8::new(NodeState::Normal as u8),
            last_heartbeat: RwLock::new(None),
        }
    }

    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.immutable_info.node_id
    }

    #[must_use]
    pub fn addr(&self) -> &str {
        &self.immutable_info.address
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.immutable_info.hostname
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.immutable_info.version
    }

    #[must_use]
    pub const fn labels(&self) -> &HashMap<String, String> {
        &self.immutable_info.labels
    }

    #[must_use]
    pub const fn immutable_info(&self) -> &ImmutableNodeInfo {
        &self.immutable_info
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.stats.read().segment_count
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.stats.read().channel_count
    }

    #[must_use]
    pub fn cpu_num(&self) -> usize {
        self.stats.read().cpu_num
    }

    #[must_use]
    pub fn mem_capacity(&self) -> f64 {
        self.stats.read().mem_capacity
    }

    /// Consistent copy of all statistics
    #[must_use]
    pub fn stats(&self) -> NodeStats {
        *self.stats.read()
    }

    /// Apply a batch of stats options, last write wins per field
    pub fn update_stats<I>(&self, opts: I)
    where
        I: IntoIterator<Item = StatsOption>,
    {
        let mut applied = Vec::new();
        {
            let mut stats = self.stats.write();
            for opt in opts {
                applied.push(opt.name());
                opt.apply(&mut stats);
            }
        }
        tracing::trace!(node_id = self.id(), options = ?applied, "Stats updated");
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        NodeState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Set the health state; any transition is allowed
    pub fn set_state(&self, state: NodeState) {
        let previous = NodeState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            tracing::debug!(node_id = self.id(), from = %previous, to = %state, "Node state changed");
        }
    }

    #[must_use]
    pub fn is_stopping_state(&self) -> bool {
        self.state().is_stopping()
    }

    /// Record the latest liveness signal; monotonicity is up to the caller
    pub fn set_last_heartbeat(&self, at: DateTime<Utc>) {
        *self.last_heartbeat.write() = Some(at);
    }

    #[must_use]
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self.last_heartbeat.read()
    }

    /// Time elapsed since the last heartbeat, `None` if none was recorded
    #[must_use]
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        self.last_heartbeat().map(|at| now.signed_duration_since(at))
    }

    /// Whether the last heartbeat is older than `timeout`
    ///
    /// Nodes that never sent a heartbeat are not stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.heartbeat_age(now)
            .and_then(|age| age.to_std().ok())
            .is_some_and(|age| age > timeout)
    }

    /// Point-in-time view for metrics export
    #[must_use]
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node_id: self.id(),
            address: self.immutable_info.address.clone(),
            hostname: self.immutable_info.hostname.clone(),
            version: self.immutable_info.version.clone(),
            labels: self.immutable_info.labels.clone(),
            state: self.state(),
            stats: self.stats(),
            last_heartbeat: self.last_heartbeat(),
        }
    }
}

/// Serializable view of a [`NodeInfo`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub node_id: NodeId,
    pub address: String,
    pub hostname: String,
    pub version: String,
    pub labels: HashMap<String, String>,
    pub state: NodeState,
    #[serde(flatten)]
    pub stats: NodeStats,
    pub last_heartbeat: Option<DateTime<Utc>>,
}
