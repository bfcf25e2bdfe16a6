pub mod memory;
pub mod pool;
pub mod postgres;
pub mod repository;
pub mod schema;

pub use memory::MemoryStore;
pub use pool::{create_pool, health_check, run_migrations};
pub use postgres::PgStore;
pub use repository::{
    AccessRequestFilter, ApplicationFilter, EdgeFilter, Repositories, RequestFilter,
    VirtualClusterFilter,
};
