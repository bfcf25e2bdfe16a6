// Short-TTL cache for lineage summaries

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::domain::{LineageSubject, LineageSummary};
use crate::errors::{AppError, Result};

#[async_trait]
pub trait SummaryCache: Send + Sync {
    async fn get(&self, subject: LineageSubject) -> Result<Option<LineageSummary>>;

    async fn put(&self, subject: LineageSubject, summary: &LineageSummary) -> Result<()>;

    async fn invalidate(&self, subjects: &[LineageSubject]) -> Result<()>;

    /// Liveness of the backing cache, if there is one.
    async fn ping(&self) -> Result<()>;
}

/// Used when `redis.enabled` is false; every read misses.
pub struct NoopSummaryCache;

#[async_trait]
impl SummaryCache for NoopSummaryCache {
    async fn get(&self, _subject: LineageSubject) -> Result<Option<LineageSummary>> {
        Ok(None)
    }

    async fn put(&self, _subject: LineageSubject, _summary: &LineageSummary) -> Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _subjects: &[LineageSubject]) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct RedisSummaryCache {
    manager: ConnectionManager,
    ttl_seconds: u64,
}

impl RedisSummaryCache {
    pub fn new(manager: ConnectionManager, ttl_seconds: u64) -> Self {
        Self {
            manager,
            ttl_seconds,
        }
    }
}

#[async_trait]
impl SummaryCache for RedisSummaryCache {
    async fn get(&self, subject: LineageSubject) -> Result<Option<LineageSummary>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(subject.cache_key()).await?;
        match raw {
            Some(raw) => {
                let summary = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Internal(format!("Corrupt cached summary: {}", e))
                })?;
                Ok(Some(summary))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, subject: LineageSubject, summary: &LineageSummary) -> Result<()> {
        let raw = serde_json::to_string(summary)
            .map_err(|e| AppError::Internal(format!("Failed to encode summary: {}", e)))?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(subject.cache_key(), raw, self.ttl_seconds)
            .await?;
        Ok(())
    }

    async fn invalidate(&self, subjects: &[LineageSubject]) -> Result<()> {
        if subjects.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = subjects.iter().map(LineageSubject::cache_key).collect();
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        super::client::health_check(&self.manager).await
    }
}
