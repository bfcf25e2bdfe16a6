use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::resolve::NameResolver;
use crate::cache::SummaryCache;
use crate::db::repository::{EdgeFilter, Repositories};
use crate::domain::{
    AccessScope, ApplicationLineage, CrossWorkspaceDirection, Direction, EdgePatch, EdgeUpsert,
    EdgeView, LineageEdge, LineageSubject, LineageSummary, Observation, TopicLineage,
    ACTIVE_WINDOW_HOURS,
};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;

/// Query options shared by the topic and application graph reads.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LineageOptions {
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<usize>,
}

/// Maintains the live edge set and answers graph queries over it.
pub struct LineageEngine {
    repos: Repositories,
    cache: Arc<dyn SummaryCache>,
}

impl LineageEngine {
    pub fn new(repos: Repositories, cache: Arc<dyn SummaryCache>) -> Self {
        Self { repos, cache }
    }

    pub(crate) fn repos(&self) -> &Repositories {
        &self.repos
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Fold one observation into its edge, creating the edge on first sight.
    #[tracing::instrument(skip(self, observation), fields(topic_id = %observation.key.topic_id))]
    pub async fn record_observation(&self, observation: Observation) -> Result<EdgeUpsert> {
        observation.key.validate()?;

        let topic = self
            .repos
            .topics
            .find_by_id(observation.key.topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic"))?;

        let source_workspace_id = match observation.key.source_application_id {
            Some(application_id) => Some(
                self.repos
                    .applications
                    .find_by_id(application_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Application"))?
                    .workspace_id,
            ),
            None => observation.source_workspace_id,
        };

        let now = Utc::now();
        let seed =
            LineageEdge::from_observation(&observation, source_workspace_id, topic.workspace_id, now);
        let upsert = self
            .repos
            .lineage
            .upsert_with_increment(seed, &observation, now)
            .await?;

        let outcome = if upsert.applied { "applied" } else { "duplicate" };
        MetricsRecorder::record_lineage_observation(observation.key.direction.as_str(), outcome);

        if upsert.applied {
            self.invalidate(&upsert.edge).await;
        } else {
            tracing::info!(
                edge_id = %upsert.edge.id,
                delivery_id = ?observation.delivery_id,
                "Observation already applied"
            );
        }
        Ok(upsert)
    }

    /// Collector/cleanup field update. All-time counters may not decrease.
    #[tracing::instrument(skip(self, patch))]
    pub async fn patch_edge(&self, edge_id: Uuid, patch: EdgePatch) -> Result<LineageEdge> {
        let mut edge = self.load_edge(edge_id).await?;
        patch.apply_to(&mut edge, Utc::now())?;
        self.repos.lineage.update(&edge).await?;
        self.invalidate(&edge).await;
        Ok(edge)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_edge(&self, edge_id: Uuid) -> Result<()> {
        let edge = self.load_edge(edge_id).await?;
        if !self.repos.lineage.delete(edge_id).await? {
            return Err(AppError::not_found("Lineage edge"));
        }
        self.invalidate(&edge).await;
        tracing::info!(edge_id = %edge_id, "Lineage edge deleted");
        Ok(())
    }

    /// Flip `isActive` off for edges unseen for the active window, and forget
    /// delivery ids older than the same window.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_stale(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - Duration::hours(ACTIVE_WINDOW_HOURS);
        let edges = self.repos.lineage.deactivate_stale(cutoff).await?;
        self.invalidate_all(&edges).await;

        let pruned = self.repos.lineage.prune_deliveries(cutoff).await?;
        tracing::info!(
            count = edges.len(),
            pruned_deliveries = pruned,
            cutoff = %cutoff,
            "Deactivated stale lineage edges"
        );
        Ok(edges.len() as u64)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, scope))]
    pub async fn topic_lineage(
        &self,
        scope: &AccessScope,
        topic_id: Uuid,
        options: LineageOptions,
    ) -> Result<TopicLineage> {
        let topic = self
            .repos
            .topics
            .find_by_id(topic_id)
            .await?
            .filter(|t| scope.can_view(t.workspace_id))
            .ok_or_else(|| AppError::not_found("Topic"))?;

        let edges = self
            .visible_edges(
                scope,
                EdgeFilter {
                    topic_id: Some(topic_id),
                    include_inactive: options.include_inactive,
                    ..Default::default()
                },
                options.limit,
            )
            .await?;

        let mut resolver = NameResolver::new(&self.repos);
        let (producers, consumers) = partition(resolver.views(&edges).await?);

        Ok(TopicLineage {
            topic_id: topic.id,
            topic_name: topic.name,
            workspace_id: topic.workspace_id,
            workspace_name: resolver.workspace(topic.workspace_id).await?,
            producers,
            consumers,
        })
    }

    #[tracing::instrument(skip(self, scope))]
    pub async fn application_lineage(
        &self,
        scope: &AccessScope,
        application_id: Uuid,
        options: LineageOptions,
    ) -> Result<ApplicationLineage> {
        let application = self
            .repos
            .applications
            .find_by_id(application_id)
            .await?
            .filter(|a| scope.can_view(a.workspace_id))
            .ok_or_else(|| AppError::not_found("Application"))?;

        let edges = self
            .visible_edges(
                scope,
                EdgeFilter {
                    source_application_id: Some(application_id),
                    include_inactive: options.include_inactive,
                    ..Default::default()
                },
                options.limit,
            )
            .await?;

        let mut resolver = NameResolver::new(&self.repos);
        let (produces_to, consumes_from) = partition(resolver.views(&edges).await?);

        Ok(ApplicationLineage {
            application_id: application.id,
            application_name: application.name,
            workspace_id: application.workspace_id,
            workspace_name: resolver.workspace(application.workspace_id).await?,
            produces_to,
            consumes_from,
        })
    }

    /// Counts and all-time totals over the active edges of a topic or
    /// application, served from the short-TTL cache when present.
    #[tracing::instrument(skip(self, scope))]
    pub async fn summarize(
        &self,
        scope: &AccessScope,
        subject: LineageSubject,
    ) -> Result<LineageSummary> {
        let filter = match subject {
            LineageSubject::Topic(topic_id) => {
                self.repos
                    .topics
                    .find_by_id(topic_id)
                    .await?
                    .filter(|t| scope.can_view(t.workspace_id))
                    .ok_or_else(|| AppError::not_found("Topic"))?;
                EdgeFilter {
                    topic_id: Some(topic_id),
                    ..Default::default()
                }
            }
            LineageSubject::Application(application_id) => {
                self.repos
                    .applications
                    .find_by_id(application_id)
                    .await?
                    .filter(|a| scope.can_view(a.workspace_id))
                    .ok_or_else(|| AppError::not_found("Application"))?;
                EdgeFilter {
                    source_application_id: Some(application_id),
                    ..Default::default()
                }
            }
        };

        match self.cache.get(subject).await {
            Ok(Some(summary)) => return Ok(summary),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "Summary cache read failed"),
        }

        let edges = self.repos.lineage.find_by_filter(&filter).await?;
        let summary = LineageSummary::from_edges(&edges);

        if let Err(err) = self.cache.put(subject, &summary).await {
            tracing::warn!(error = %err, "Summary cache write failed");
        }
        Ok(summary)
    }

    /// Edges crossing the workspace boundary: inbound edges target this
    /// workspace's topics from elsewhere, outbound edges leave it. Inactive
    /// edges are included so that past exposure stays auditable.
    #[tracing::instrument(skip(self, scope))]
    pub async fn cross_workspace_lineage(
        &self,
        scope: &AccessScope,
        workspace_id: Uuid,
        direction: CrossWorkspaceDirection,
    ) -> Result<Vec<EdgeView>> {
        if !scope.can_view(workspace_id) {
            return Err(AppError::not_found("Workspace"));
        }
        self.repos
            .workspaces
            .find_by_id(workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace"))?;

        let base = EdgeFilter {
            cross_workspace_only: true,
            include_inactive: true,
            ..Default::default()
        };
        let mut edges = Vec::new();
        if matches!(
            direction,
            CrossWorkspaceDirection::Inbound | CrossWorkspaceDirection::Both
        ) {
            let filter = EdgeFilter {
                target_workspace_id: Some(workspace_id),
                ..base.clone()
            };
            edges.extend(self.repos.lineage.find_by_filter(&filter).await?);
        }
        if matches!(
            direction,
            CrossWorkspaceDirection::Outbound | CrossWorkspaceDirection::Both
        ) {
            let filter = EdgeFilter {
                source_workspace_id: Some(workspace_id),
                ..base
            };
            edges.extend(self.repos.lineage.find_by_filter(&filter).await?);
        }

        let mut seen = HashSet::new();
        edges.retain(|e| e.is_cross_workspace && seen.insert(e.id));
        edges.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.id.cmp(&b.id)));

        NameResolver::new(&self.repos).views(&edges).await
    }

    /// Scope-filtered edges; `limit` counts visible edges only.
    async fn visible_edges(
        &self,
        scope: &AccessScope,
        mut filter: EdgeFilter,
        limit: Option<usize>,
    ) -> Result<Vec<LineageEdge>> {
        if scope.platform_admin {
            filter.limit = limit;
        }
        let mut edges: Vec<LineageEdge> = self
            .repos
            .lineage
            .find_by_filter(&filter)
            .await?
            .into_iter()
            .filter(|e| scope.can_view_either(e.source_workspace_id, e.target_workspace_id))
            .collect();
        if let Some(limit) = limit {
            edges.truncate(limit);
        }
        Ok(edges)
    }

    async fn load_edge(&self, edge_id: Uuid) -> Result<LineageEdge> {
        self.repos
            .lineage
            .find_by_id(edge_id)
            .await?
            .ok_or_else(|| AppError::not_found("Lineage edge"))
    }

    async fn invalidate(&self, edge: &LineageEdge) {
        self.invalidate_all(std::slice::from_ref(edge)).await;
    }

    async fn invalidate_all(&self, edges: &[LineageEdge]) {
        let mut subjects = HashSet::new();
        for edge in edges {
            subjects.insert(LineageSubject::Topic(edge.topic_id));
            if let Some(application_id) = edge.source_application_id {
                subjects.insert(LineageSubject::Application(application_id));
            }
        }
        if subjects.is_empty() {
            return;
        }
        let subjects: Vec<LineageSubject> = subjects.into_iter().collect();
        if let Err(err) = self.cache.invalidate(&subjects).await {
            tracing::warn!(
                error = %err,
                subjects = subjects.len(),
                "Summary cache invalidation failed"
            );
        }
    }
}

fn partition(views: Vec<EdgeView>) -> (Vec<EdgeView>, Vec<EdgeView>) {
    views
        .into_iter()
        .partition(|v| v.direction == Direction::Produce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NoopSummaryCache;
    use crate::db::repository::{ApplicationRepository, LineageRepository};
    use crate::db::MemoryStore;
    use crate::domain::{Application, EdgeKey, Topic, Workspace};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapCache {
        entries: Mutex<HashMap<String, LineageSummary>>,
    }

    #[async_trait]
    impl SummaryCache for MapCache {
        async fn get(&self, subject: LineageSubject) -> Result<Option<LineageSummary>> {
            Ok(self.entries.lock().unwrap().get(&subject.cache_key()).copied())
        }

        async fn put(&self, subject: LineageSubject, summary: &LineageSummary) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(subject.cache_key(), *summary);
            Ok(())
        }

        async fn invalidate(&self, subjects: &[LineageSubject]) -> Result<()> {
            let mut entries = self.entries.lock().unwrap();
            for subject in subjects {
                entries.remove(&subject.cache_key());
            }
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    struct World {
        store: Arc<MemoryStore>,
        engine: LineageEngine,
        retail: Uuid,
        payments: Uuid,
        orders_topic: Uuid,
        checkout_app: Uuid,
        ledger_app: Uuid,
    }

    async fn world_with_cache(cache: Arc<dyn SummaryCache>) -> World {
        let store = Arc::new(MemoryStore::new());
        let retail = Uuid::new_v4();
        let payments = Uuid::new_v4();
        for (id, name) in [(retail, "Retail"), (payments, "Payments")] {
            store
                .put_workspace(Workspace {
                    id,
                    name: name.into(),
                    slug: name.to_lowercase(),
                    application_quota: None,
                })
                .await;
        }
        let orders_topic = Uuid::new_v4();
        store
            .put_topic(Topic {
                id: orders_topic,
                name: "orders".into(),
                workspace_id: retail,
            })
            .await;

        let checkout = Application::new(retail, "Checkout".into(), "checkout".into());
        let ledger = Application::new(payments, "Ledger".into(), "ledger".into());
        ApplicationRepository::insert(store.as_ref(), &checkout)
            .await
            .unwrap();
        ApplicationRepository::insert(store.as_ref(), &ledger)
            .await
            .unwrap();

        World {
            engine: LineageEngine::new(Repositories::from_store(store.clone()), cache),
            store,
            retail,
            payments,
            orders_topic,
            checkout_app: checkout.id,
            ledger_app: ledger.id,
        }
    }

    async fn world() -> World {
        world_with_cache(Arc::new(NoopSummaryCache)).await
    }

    fn observation(app: Uuid, topic: Uuid, direction: Direction, bytes: u64) -> Observation {
        Observation {
            key: EdgeKey {
                source_application_id: Some(app),
                source_service_account: None,
                topic_id: topic,
                direction,
            },
            source_workspace_id: None,
            bytes,
            messages: 1,
            observed_at: Utc::now(),
            delivery_id: None,
        }
    }

    #[tokio::test]
    async fn test_observation_derives_cross_workspace_from_application() {
        let w = world().await;
        let same = w
            .engine
            .record_observation(observation(w.checkout_app, w.orders_topic, Direction::Produce, 10))
            .await
            .unwrap();
        assert!(!same.edge.is_cross_workspace);

        let cross = w
            .engine
            .record_observation(observation(w.ledger_app, w.orders_topic, Direction::Consume, 10))
            .await
            .unwrap();
        assert!(cross.edge.is_cross_workspace);
        assert_eq!(cross.edge.source_workspace_id, Some(w.payments));
        assert_eq!(cross.edge.target_workspace_id, w.retail);
    }

    #[tokio::test]
    async fn test_cross_workspace_query_only_returns_cross_edges() {
        let w = world().await;
        for (app, direction) in [
            (w.checkout_app, Direction::Produce),
            (w.ledger_app, Direction::Consume),
        ] {
            w.engine
                .record_observation(observation(app, w.orders_topic, direction, 10))
                .await
                .unwrap();
        }

        let admin = AccessScope::platform_admin("root");
        let inbound = w
            .engine
            .cross_workspace_lineage(&admin, w.retail, CrossWorkspaceDirection::Inbound)
            .await
            .unwrap();
        assert_eq!(inbound.len(), 1);
        assert!(inbound.iter().all(|e| e.is_cross_workspace));
        assert_eq!(inbound[0].application_name.as_deref(), Some("Ledger"));

        let outbound = w
            .engine
            .cross_workspace_lineage(&admin, w.payments, CrossWorkspaceDirection::Outbound)
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);

        let both = w
            .engine
            .cross_workspace_lineage(&admin, w.retail, CrossWorkspaceDirection::Both)
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert!(both.iter().all(|e| e.is_cross_workspace));
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_not_double_counted() {
        let w = world().await;
        let mut obs = observation(w.checkout_app, w.orders_topic, Direction::Produce, 100);
        obs.delivery_id = Some("collector-window-42".into());

        let first = w.engine.record_observation(obs.clone()).await.unwrap();
        assert!(first.applied);
        let second = w.engine.record_observation(obs).await.unwrap();
        assert!(!second.applied);
        assert_eq!(second.edge.bytes_all_time, 100);
    }

    #[tokio::test]
    async fn test_observations_without_delivery_id_are_additive() {
        let w = world().await;
        let obs = observation(w.checkout_app, w.orders_topic, Direction::Produce, 100);
        w.engine.record_observation(obs.clone()).await.unwrap();
        let second = w.engine.record_observation(obs).await.unwrap();
        assert_eq!(second.edge.bytes_all_time, 200);
    }

    #[tokio::test]
    async fn test_topic_lineage_partitions_and_hides_inactive() {
        let w = world().await;
        let producer = w
            .engine
            .record_observation(observation(w.checkout_app, w.orders_topic, Direction::Produce, 5))
            .await
            .unwrap();
        w.engine
            .record_observation(observation(w.ledger_app, w.orders_topic, Direction::Consume, 5))
            .await
            .unwrap();

        let admin = AccessScope::platform_admin("root");
        let graph = w
            .engine
            .topic_lineage(&admin, w.orders_topic, LineageOptions::default())
            .await
            .unwrap();
        assert_eq!(graph.producers.len(), 1);
        assert_eq!(graph.consumers.len(), 1);
        assert_eq!(graph.workspace_name.as_deref(), Some("Retail"));

        let patch = EdgePatch {
            is_active: Some(false),
            ..Default::default()
        };
        w.engine.patch_edge(producer.edge.id, patch).await.unwrap();

        let graph = w
            .engine
            .topic_lineage(&admin, w.orders_topic, LineageOptions::default())
            .await
            .unwrap();
        assert!(graph.producers.is_empty());

        let graph = w
            .engine
            .topic_lineage(
                &admin,
                w.orders_topic,
                LineageOptions {
                    include_inactive: true,
                    limit: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(graph.producers.len(), 1);
    }

    #[tokio::test]
    async fn test_application_lineage_from_source_side() {
        let w = world().await;
        w.engine
            .record_observation(observation(w.ledger_app, w.orders_topic, Direction::Consume, 5))
            .await
            .unwrap();

        let scope = AccessScope::member_of("pat", [w.payments]);
        let graph = w
            .engine
            .application_lineage(&scope, w.ledger_app, LineageOptions::default())
            .await
            .unwrap();
        assert!(graph.produces_to.is_empty());
        assert_eq!(graph.consumes_from.len(), 1);
        assert_eq!(graph.consumes_from[0].topic_name.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn test_invisible_topic_is_not_found() {
        let w = world().await;
        let outsider = AccessScope::member_of("eve", [w.payments]);
        let err = w
            .engine
            .topic_lineage(&outsider, w.orders_topic, LineageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_summary_counts_and_cache_invalidation() {
        let cache = Arc::new(MapCache::default());
        let w = world_with_cache(cache.clone()).await;
        let admin = AccessScope::platform_admin("root");
        w.engine
            .record_observation(observation(w.checkout_app, w.orders_topic, Direction::Produce, 40))
            .await
            .unwrap();

        let summary = w
            .engine
            .summarize(&admin, LineageSubject::Topic(w.orders_topic))
            .await
            .unwrap();
        assert_eq!(summary.producer_count, 1);
        assert_eq!(summary.total_bytes, 40);

        w.engine
            .record_observation(observation(w.ledger_app, w.orders_topic, Direction::Consume, 60))
            .await
            .unwrap();
        let summary = w
            .engine
            .summarize(&admin, LineageSubject::Topic(w.orders_topic))
            .await
            .unwrap();
        assert_eq!(summary.consumer_count, 1);
        assert_eq!(summary.total_bytes, 100);
    }

    #[tokio::test]
    async fn test_patch_cannot_decrease_all_time_counters() {
        let w = world().await;
        let upsert = w
            .engine
            .record_observation(observation(w.checkout_app, w.orders_topic, Direction::Produce, 50))
            .await
            .unwrap();

        let patch = EdgePatch {
            bytes_all_time: Some(10),
            ..Default::default()
        };
        let err = w.engine.patch_edge(upsert.edge.id, patch).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let reset = EdgePatch {
            bytes_last_24h: Some(0),
            messages_last_24h: Some(0),
            ..Default::default()
        };
        let edge = w.engine.patch_edge(upsert.edge.id, reset).await.unwrap();
        assert_eq!(edge.bytes_last_24h, 0);
        assert_eq!(edge.bytes_all_time, 50);
    }

    #[tokio::test]
    async fn test_deactivate_stale_edges() {
        let w = world().await;
        let mut old = observation(w.checkout_app, w.orders_topic, Direction::Produce, 5);
        old.observed_at = Utc::now() - Duration::hours(30);
        let upsert = w.engine.record_observation(old).await.unwrap();
        assert!(!upsert.edge.is_active);

        // Force it active, as a late PATCH could
        let mut edge = upsert.edge.clone();
        edge.is_active = true;
        LineageRepository::update(w.store.as_ref(), &edge)
            .await
            .unwrap();

        let count = w.engine.deactivate_stale(Utc::now()).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_deactivate_stale_refreshes_cached_summary() {
        let cache = Arc::new(MapCache::default());
        let w = world_with_cache(cache.clone()).await;
        let admin = AccessScope::platform_admin("root");

        let mut old = observation(w.checkout_app, w.orders_topic, Direction::Produce, 5);
        old.observed_at = Utc::now() - Duration::hours(30);
        let upsert = w.engine.record_observation(old).await.unwrap();
        let mut edge = upsert.edge.clone();
        edge.is_active = true;
        LineageRepository::update(w.store.as_ref(), &edge)
            .await
            .unwrap();

        let summary = w
            .engine
            .summarize(&admin, LineageSubject::Topic(w.orders_topic))
            .await
            .unwrap();
        assert_eq!(summary.producer_count, 1);

        w.engine.deactivate_stale(Utc::now()).await.unwrap();
        assert!(cache.entries.lock().unwrap().is_empty());
        let summary = w
            .engine
            .summarize(&admin, LineageSubject::Topic(w.orders_topic))
            .await
            .unwrap();
        assert_eq!(summary.producer_count, 0);
    }

    #[tokio::test]
    async fn test_limit_counts_only_visible_edges() {
        let w = world().await;
        let member = AccessScope::member_of("dev", [w.retail]);

        let mut visible = observation(w.checkout_app, w.orders_topic, Direction::Produce, 5);
        visible.observed_at = Utc::now() - Duration::hours(1);
        w.engine.record_observation(visible).await.unwrap();

        // Newer edge stored against workspaces the member cannot see
        let hidden_ws = Uuid::new_v4();
        let hidden = observation(w.checkout_app, Uuid::new_v4(), Direction::Produce, 5);
        let now = Utc::now();
        let seed = LineageEdge::from_observation(&hidden, Some(hidden_ws), hidden_ws, now);
        w.store
            .upsert_with_increment(seed, &hidden, now)
            .await
            .unwrap();

        let options = LineageOptions {
            include_inactive: false,
            limit: Some(1),
        };
        let lineage = w
            .engine
            .application_lineage(&member, w.checkout_app, options)
            .await
            .unwrap();
        assert_eq!(lineage.produces_to.len(), 1);
        assert_eq!(lineage.produces_to[0].topic_id, w.orders_topic);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_not_found() {
        let w = world().await;
        let err = w
            .engine
            .record_observation(observation(w.checkout_app, Uuid::new_v4(), Direction::Produce, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_service_account_source_uses_reported_workspace() {
        let w = world().await;
        let obs = Observation {
            key: EdgeKey {
                source_application_id: None,
                source_service_account: Some("sa-etl".into()),
                topic_id: w.orders_topic,
                direction: Direction::Consume,
            },
            source_workspace_id: Some(w.payments),
            bytes: 1,
            messages: 1,
            observed_at: Utc::now(),
            delivery_id: None,
        };
        let upsert = w.engine.record_observation(obs).await.unwrap();
        assert!(upsert.edge.is_cross_workspace);
    }
}
