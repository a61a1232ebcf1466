pub mod config;
pub mod error;
pub mod logging;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{
    ImmutableNodeInfo, LivenessMonitor, NodeId, NodeInfo, NodeManager, NodeState, NodeStats, StatsOption,
};
