pub mod applications;
pub mod approvals;
pub mod chargeback;
pub mod extract;
pub mod health;
pub mod internal;
pub mod lineage;
pub mod middleware;
pub mod routes;

pub use routes::{create_router, AppState};
