// Kafka multi-tenancy control plane

pub mod api;
pub mod applications;
pub mod approval;
pub mod cache;
pub mod chargeback;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod lineage;
pub mod observability;
pub mod provisioning;
pub mod quota;
pub mod workflow;

pub use config::Config;
pub use errors::{AppError, Result};
