//! Density clustering, cluster memory, assignment matching, and lifecycle
//! coordination for the multi-object cluster-analytics pipeline (C5-C8).

pub mod coordinator;
pub mod dbscan;
mod error;
pub mod matcher;
pub mod memory;

pub use coordinator::{AfterPublish, BeforeAnalyze, ClusterCoordinator};
pub use error::{Error, Result};
pub use matcher::{match_clusters, Match, Observation};
pub use memory::{ClusterMemory, MemoryStatistics};
