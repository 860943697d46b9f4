//! Multi-category object tracker: category workers (C2), the scene tracker
//! that demultiplexes and aggregates them (C3), and the rate regulator that
//! publishes fused scene state on a fixed cadence (C4).

pub mod error;
pub mod regulator;
pub mod scene;
pub mod worker;

pub use error::{Error, Result};
pub use regulator::RateRegulator;
pub use scene::{CategoryRegistry, SceneTracker};
pub use worker::{CategoryWorker, InputMode, WorkerParams};
