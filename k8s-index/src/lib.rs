//! The Kubernetes-facing half of the SNAT reconciliation agent: the shared
//! index, matcher, resolver glue, file syncer, node-info reporter and
//! debounced scheduler described in §3-§5 of the reconciliation core design.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod cluster_info;
pub mod file_sync;
pub mod index;
pub mod matcher;
pub mod node_info_reporter;
pub mod resolver;
pub mod scheduler;
pub mod workload;

pub use cluster_info::ClusterInfo;
pub use index::{Index, SharedIndex};
pub use scheduler::{Scheduler, SchedulerTask};
