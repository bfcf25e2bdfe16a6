pub mod client;
pub mod summary;

pub use client::create_client;
pub use summary::{NoopSummaryCache, RedisSummaryCache, SummaryCache};
