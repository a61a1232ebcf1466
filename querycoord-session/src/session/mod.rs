//! Query node sessions: registry, per-node state and liveness

pub mod liveness;
pub mod node_info;
pub mod node_manager;

pub use liveness::{LivenessMonitor, LivenessReport};
pub use node_info::{ImmutableNodeInfo, NodeId, NodeInfo, NodeSnapshot, NodeState, NodeStats, StatsOption};
pub use node_manager::NodeManager;
