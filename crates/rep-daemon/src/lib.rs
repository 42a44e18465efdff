//! The sharded daemon supervisor: maintains exactly N long-lived
//! workers over `[0, 1024)` regardless of node churn. See spec.md §4.6.

pub mod membership;
pub mod supervisor;

pub use membership::{ClusterMembership, StaticMembership};
pub use supervisor::{DaemonError, Supervisor, Worker};
