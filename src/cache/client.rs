use crate::{config::RedisConfig, errors::Result};
use redis::{aio::ConnectionManager, Client};

/// Connect to the Redis instance holding cached summaries
pub async fn create_client(config: &RedisConfig) -> Result<ConnectionManager> {
    tracing::info!("Connecting to summary cache");

    let client = Client::open(config.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;

    tracing::info!("Summary cache connected");

    Ok(manager)
}

/// PING the cache
pub async fn health_check(manager: &ConnectionManager) -> Result<()> {
    let mut conn = manager.clone();
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}
