use crate::cache::SummaryCache;
use crate::db::repository::StoreHealth;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthChecks {
    pub store: ComponentStatus,
    pub cache: ComponentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub status: String,
    pub message: Option<String>,
}

impl ComponentStatus {
    fn of(status: &str, message: Option<String>) -> Self {
        Self {
            status: status.to_string(),
            message,
        }
    }
}

pub struct HealthChecker {
    store: Arc<dyn StoreHealth>,
    /// `None` when the summary cache is disabled.
    cache: Option<Arc<dyn SummaryCache>>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn StoreHealth>, cache: Option<Arc<dyn SummaryCache>>) -> Self {
        Self { store, cache }
    }

    /// Liveness check - is the service running?
    pub async fn liveness(&self) -> HealthStatus {
        HealthStatus {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks {
                store: ComponentStatus::of("unknown", None),
                cache: ComponentStatus::of("unknown", None),
            },
        }
    }

    /// Readiness check - store reachable, and the cache when enabled
    pub async fn readiness(&self) -> HealthStatus {
        let store = self.check_store().await;
        let cache = self.check_cache().await;

        let overall_status = if store.status == "ok" && cache.status != "error" {
            "ok"
        } else {
            "degraded"
        };

        HealthStatus {
            status: overall_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            checks: HealthChecks { store, cache },
        }
    }

    async fn check_store(&self) -> ComponentStatus {
        match self.store.ping().await {
            Ok(_) => ComponentStatus::of("ok", None),
            Err(e) => ComponentStatus::of("error", Some(format!("Store check failed: {}", e))),
        }
    }

    async fn check_cache(&self) -> ComponentStatus {
        let Some(cache) = &self.cache else {
            return ComponentStatus::of("disabled", None);
        };
        match cache.ping().await {
            Ok(_) => ComponentStatus::of("ok", None),
            Err(e) => ComponentStatus::of("error", Some(format!("Cache check failed: {}", e))),
        }
    }
}
