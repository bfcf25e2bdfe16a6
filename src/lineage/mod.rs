// Lineage Graph Engine

pub mod engine;
mod resolve;
pub mod snapshots;

pub use engine::{LineageEngine, LineageOptions};
pub use snapshots::{NewSnapshot, SnapshotRange};
