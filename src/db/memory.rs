// In-memory store used by the `memory` backend and by tests

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::repository::*;
use crate::domain::{
    Application, ApplicationRequest, ApplicationStatus, AutoApprovePolicy, EdgeUpsert,
    LineageEdge, LineageSnapshot, Observation, ProvisioningDetails, ProvisioningStatus,
    RequestStatus, Topic, TopicAccessRequest, UsageMetric, VirtualCluster, Workspace,
};
use crate::errors::{AppError, Result};

#[derive(Default)]
struct MemoryState {
    workspaces: HashMap<Uuid, Workspace>,
    topics: HashMap<Uuid, Topic>,
    applications: HashMap<Uuid, Application>,
    virtual_clusters: HashMap<Uuid, VirtualCluster>,
    edges: HashMap<Uuid, LineageEdge>,
    edge_keys: HashMap<String, Uuid>,
    /// (edge natural key, delivery id) -> received at
    deliveries: HashMap<(String, String), DateTime<Utc>>,
    snapshots: Vec<LineageSnapshot>,
    requests: HashMap<Uuid, ApplicationRequest>,
    access_requests: HashMap<Uuid, TopicAccessRequest>,
    policies: HashMap<Uuid, AutoApprovePolicy>,
    usage: HashMap<(Uuid, NaiveDate), UsageMetric>,
}

/// Single-process store. Every write takes the one lock, which makes each
/// repository call atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a workspace owned by the CRUD layer.
    pub async fn put_workspace(&self, workspace: Workspace) {
        self.state
            .write()
            .await
            .workspaces
            .insert(workspace.id, workspace);
    }

    /// Seed a topic owned by the CRUD layer.
    pub async fn put_topic(&self, topic: Topic) {
        self.state.write().await.topics.insert(topic.id, topic);
    }
}

#[async_trait]
impl WorkspaceRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Workspace>> {
        Ok(self.state.read().await.workspaces.get(&id).cloned())
    }
}

#[async_trait]
impl TopicRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Topic>> {
        Ok(self.state.read().await.topics.get(&id).cloned())
    }
}

#[async_trait]
impl ApplicationRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Application>> {
        Ok(self.state.read().await.applications.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
        let state = self.state.read().await;
        let mut apps: Vec<Application> = state
            .applications
            .values()
            .filter(|a| filter.workspace_id.map_or(true, |w| a.workspace_id == w))
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| {
                filter
                    .provisioning_status
                    .map_or(true, |s| a.provisioning_status == s)
            })
            .filter(|a| filter.slug.as_deref().map_or(true, |s| a.slug == s))
            .cloned()
            .collect();
        apps.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(apps)
    }

    async fn count_active(&self, workspace_id: Uuid) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .applications
            .values()
            .filter(|a| a.workspace_id == workspace_id && a.status == ApplicationStatus::Active)
            .count() as u64)
    }

    async fn insert(&self, application: &Application) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .applications
            .values()
            .any(|a| a.slug == application.slug)
        {
            return Err(AppError::InvalidState(format!(
                "Application with slug '{}' already exists",
                application.slug
            )));
        }
        state
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn update(&self, application: &Application) -> Result<()> {
        let mut state = self.state.write().await;
        match state.applications.get_mut(&application.id) {
            Some(stored) => {
                *stored = application.clone();
                Ok(())
            }
            None => Err(AppError::not_found("Application")),
        }
    }

    async fn update_if_unchanged(
        &self,
        application: &Application,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.applications.get_mut(&application.id) {
            Some(stored) if stored.updated_at == expected_updated_at => {
                *stored = application.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(AppError::not_found("Application")),
        }
    }

    async fn begin_provisioning(
        &self,
        id: Uuid,
        from: &[ProvisioningStatus],
        workflow_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let mut state = self.state.write().await;
        let Some(app) = state.applications.get_mut(&id) else {
            return Ok(None);
        };
        if app.status != ApplicationStatus::Active || !from.contains(&app.provisioning_status) {
            return Ok(None);
        }

        app.provisioning_status = ProvisioningStatus::InProgress;
        app.provisioning_workflow_id = Some(workflow_id.to_string());
        app.provisioning_details = ProvisioningDetails::new();
        app.provisioning_error = None;
        app.provisioning_completed_at = None;
        app.updated_at = now;
        Ok(Some(app.clone()))
    }
}

#[async_trait]
impl VirtualClusterRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<VirtualCluster>> {
        Ok(self.state.read().await.virtual_clusters.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &VirtualClusterFilter) -> Result<Vec<VirtualCluster>> {
        let state = self.state.read().await;
        let mut clusters: Vec<VirtualCluster> = state
            .virtual_clusters
            .values()
            .filter(|c| filter.application_id.map_or(true, |a| c.application_id == a))
            .filter(|c| filter.environment.map_or(true, |e| c.environment == e))
            .filter(|c| filter.status.map_or(true, |s| c.status == s))
            .cloned()
            .collect();
        clusters.sort_by_key(|c| (c.application_id, c.environment));
        Ok(clusters)
    }

    async fn insert(&self, cluster: &VirtualCluster) -> Result<()> {
        let mut state = self.state.write().await;
        if state.virtual_clusters.values().any(|c| {
            c.application_id == cluster.application_id && c.environment == cluster.environment
        }) {
            return Err(AppError::InvalidState(format!(
                "Virtual cluster for environment '{}' already exists",
                cluster.environment
            )));
        }
        state.virtual_clusters.insert(cluster.id, cluster.clone());
        Ok(())
    }

    async fn upsert(&self, cluster: &VirtualCluster) -> Result<VirtualCluster> {
        let mut state = self.state.write().await;
        let existing = state
            .virtual_clusters
            .values()
            .find(|c| {
                c.application_id == cluster.application_id && c.environment == cluster.environment
            })
            .map(|c| (c.id, c.created_at));

        let mut stored = cluster.clone();
        if let Some((id, created_at)) = existing {
            stored.id = id;
            stored.created_at = created_at;
        }
        state.virtual_clusters.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, cluster: &VirtualCluster) -> Result<()> {
        let mut state = self.state.write().await;
        match state.virtual_clusters.get_mut(&cluster.id) {
            Some(stored) => {
                *stored = cluster.clone();
                Ok(())
            }
            None => Err(AppError::not_found("Virtual cluster")),
        }
    }
}

#[async_trait]
impl LineageRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<LineageEdge>> {
        Ok(self.state.read().await.edges.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &EdgeFilter) -> Result<Vec<LineageEdge>> {
        let state = self.state.read().await;
        let mut edges: Vec<LineageEdge> = state
            .edges
            .values()
            .filter(|e| filter.topic_id.map_or(true, |t| e.topic_id == t))
            .filter(|e| {
                filter
                    .source_application_id
                    .map_or(true, |a| e.source_application_id == Some(a))
            })
            .filter(|e| {
                filter
                    .source_workspace_id
                    .map_or(true, |w| e.source_workspace_id == Some(w))
            })
            .filter(|e| {
                filter
                    .target_workspace_id
                    .map_or(true, |w| e.target_workspace_id == w)
            })
            .filter(|e| filter.direction.map_or(true, |d| e.direction == d))
            .filter(|e| !filter.cross_workspace_only || e.is_cross_workspace)
            .filter(|e| filter.include_inactive || e.is_active)
            .cloned()
            .collect();
        edges.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            edges.truncate(limit);
        }
        Ok(edges)
    }

    async fn upsert_with_increment(
        &self,
        seed: LineageEdge,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<EdgeUpsert> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let natural_key = seed.key().natural_key();
        let existing = state.edge_keys.get(&natural_key).copied();

        if let Some(delivery_id) = &observation.delivery_id {
            let delivery = (natural_key.clone(), delivery_id.clone());
            let seen = existing.and_then(|id| state.edges.get(&id).cloned());
            match seen {
                Some(edge) if state.deliveries.contains_key(&delivery) => {
                    return Ok(EdgeUpsert {
                        edge,
                        applied: false,
                    });
                }
                _ => {
                    state.deliveries.insert(delivery, now);
                }
            }
        }

        let stored = match existing {
            Some(id) => state.edges.get_mut(&id),
            None => None,
        };
        let edge = match stored {
            Some(edge) => {
                edge.apply_observation(
                    observation,
                    seed.source_workspace_id,
                    seed.target_workspace_id,
                    now,
                );
                edge.clone()
            }
            None => {
                state.edge_keys.insert(natural_key, seed.id);
                state.edges.insert(seed.id, seed.clone());
                seed
            }
        };

        Ok(EdgeUpsert {
            edge,
            applied: true,
        })
    }

    async fn update(&self, edge: &LineageEdge) -> Result<()> {
        let mut state = self.state.write().await;
        match state.edges.get_mut(&edge.id) {
            Some(stored) => {
                *stored = edge.clone();
                Ok(())
            }
            None => Err(AppError::not_found("Lineage edge")),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.edges.remove(&id) {
            Some(edge) => {
                let natural_key = edge.key().natural_key();
                state.deliveries.retain(|(key, _), _| *key != natural_key);
                state.edge_keys.remove(&natural_key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<LineageEdge>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut changed = Vec::new();
        for edge in state.edges.values_mut() {
            if edge.is_active && edge.last_seen < cutoff {
                edge.is_active = false;
                edge.updated_at = now;
                changed.push(edge.clone());
            }
        }
        Ok(changed)
    }

    async fn prune_deliveries(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.deliveries.len();
        state.deliveries.retain(|_, received_at| *received_at >= cutoff);
        Ok((before - state.deliveries.len()) as u64)
    }
}

#[async_trait]
impl SnapshotRepository for MemoryStore {
    async fn append(&self, snapshot: &LineageSnapshot) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .snapshots
            .iter()
            .any(|s| s.topic_id == snapshot.topic_id && s.day == snapshot.day)
        {
            return Err(AppError::InvalidState(format!(
                "Snapshot for topic {} on {} already exists",
                snapshot.topic_id, snapshot.day
            )));
        }
        state.snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn find_by_filter(
        &self,
        topic_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<LineageSnapshot>> {
        let state = self.state.read().await;
        let mut snapshots: Vec<LineageSnapshot> = state
            .snapshots
            .iter()
            .filter(|s| s.topic_id == topic_id)
            .filter(|s| from.map_or(true, |f| s.day >= f))
            .filter(|s| to.map_or(true, |t| s.day <= t))
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.day);
        Ok(snapshots)
    }
}

#[async_trait]
impl RequestRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApplicationRequest>> {
        Ok(self.state.read().await.requests.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &RequestFilter) -> Result<Vec<ApplicationRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<ApplicationRequest> = state
            .requests
            .values()
            .filter(|r| filter.workspace_id.map_or(true, |w| r.workspace_id == w))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                filter
                    .name
                    .as_deref()
                    .map_or(true, |n| r.name.eq_ignore_ascii_case(n))
            })
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn insert(&self, request: &ApplicationRequest) -> Result<()> {
        let mut state = self.state.write().await;
        if state.requests.values().any(|r| {
            r.status.is_pending()
                && r.workspace_id == request.workspace_id
                && r.name.eq_ignore_ascii_case(&request.name)
        }) {
            return Err(AppError::InvalidState(format!(
                "A pending request for application '{}' already exists",
                request.name
            )));
        }
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update(&self, request: &ApplicationRequest, expected: RequestStatus) -> Result<()> {
        let mut state = self.state.write().await;
        match state.requests.get_mut(&request.id) {
            Some(stored) if stored.status == expected => {
                *stored = request.clone();
                Ok(())
            }
            Some(stored) => Err(AppError::InvalidState(format!(
                "Request is {}, expected {}",
                stored.status, expected
            ))),
            None => Err(AppError::not_found("Application request")),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.write().await.requests.remove(&id).is_some())
    }
}

#[async_trait]
impl AccessRequestRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TopicAccessRequest>> {
        Ok(self.state.read().await.access_requests.get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: &AccessRequestFilter) -> Result<Vec<TopicAccessRequest>> {
        let state = self.state.read().await;
        let mut requests: Vec<TopicAccessRequest> = state
            .access_requests
            .values()
            .filter(|r| filter.topic_id.map_or(true, |t| r.topic_id == t))
            .filter(|r| filter.application_id.map_or(true, |a| r.application_id == a))
            .filter(|r| {
                filter.workspace_id.map_or(true, |w| {
                    r.requesting_workspace_id == w || r.topic_workspace_id == w
                })
            })
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn insert(&self, request: &TopicAccessRequest) -> Result<()> {
        let mut state = self.state.write().await;
        if request.status.is_pending()
            && state.access_requests.values().any(|r| {
                r.status.is_pending()
                    && r.application_id == request.application_id
                    && r.topic_id == request.topic_id
            })
        {
            return Err(AppError::InvalidState(
                "A pending access request for this application and topic already exists"
                    .to_string(),
            ));
        }
        state.access_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update(&self, request: &TopicAccessRequest, expected: RequestStatus) -> Result<()> {
        let mut state = self.state.write().await;
        match state.access_requests.get_mut(&request.id) {
            Some(stored) if stored.status == expected => {
                *stored = request.clone();
                Ok(())
            }
            Some(stored) => Err(AppError::InvalidState(format!(
                "Request is {}, expected {}",
                stored.status, expected
            ))),
            None => Err(AppError::not_found("Topic access request")),
        }
    }
}

#[async_trait]
impl PolicyRepository for MemoryStore {
    async fn find_by_workspace(&self, workspace_id: Uuid) -> Result<Option<AutoApprovePolicy>> {
        Ok(self.state.read().await.policies.get(&workspace_id).cloned())
    }

    async fn upsert(&self, policy: &AutoApprovePolicy) -> Result<()> {
        self.state
            .write()
            .await
            .policies
            .insert(policy.workspace_id, policy.clone());
        Ok(())
    }
}

#[async_trait]
impl UsageRepository for MemoryStore {
    async fn upsert_batch(&self, metrics: &[UsageMetric]) -> Result<u64> {
        let mut state = self.state.write().await;
        for metric in metrics {
            state
                .usage
                .insert((metric.application_id, metric.period_start), metric.clone());
        }
        Ok(metrics.len() as u64)
    }

    async fn find_for_period(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<UsageMetric>> {
        let state = self.state.read().await;
        let mut metrics: Vec<UsageMetric> = state
            .usage
            .values()
            .filter(|m| m.period_start >= from && m.period_start <= to)
            .cloned()
            .collect();
        metrics.sort_by_key(|m| (m.period_start, m.application_id));
        Ok(metrics)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, EdgeKey};
    use std::sync::Arc;

    fn observation(app: Uuid, topic: Uuid, delivery: Option<&str>) -> Observation {
        Observation {
            key: EdgeKey {
                source_application_id: Some(app),
                source_service_account: None,
                topic_id: topic,
                direction: Direction::Produce,
            },
            source_workspace_id: None,
            bytes: 100,
            messages: 10,
            observed_at: Utc::now(),
            delivery_id: delivery.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_concurrent_upserts_do_not_lose_increments() {
        let store = Arc::new(MemoryStore::new());
        let app = Uuid::new_v4();
        let topic = Uuid::new_v4();
        let target = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let obs = observation(app, topic, None);
                let now = Utc::now();
                let seed = LineageEdge::from_observation(&obs, None, target, now);
                store.upsert_with_increment(seed, &obs, now).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let edges = LineageRepository::find_by_filter(store.as_ref(), &EdgeFilter::default())
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].bytes_all_time, 2000);
        assert_eq!(edges[0].messages_all_time, 200);
    }

    async fn record(store: &MemoryStore, obs: &Observation, now: DateTime<Utc>) -> EdgeUpsert {
        let seed = LineageEdge::from_observation(obs, None, Uuid::new_v4(), now);
        store.upsert_with_increment(seed, obs, now).await.unwrap()
    }

    #[tokio::test]
    async fn test_shared_window_delivery_id_applies_to_each_edge() {
        let store = MemoryStore::new();
        let app = Uuid::new_v4();
        let now = Utc::now();

        let first = observation(app, Uuid::new_v4(), Some("collector-window-42"));
        let second = observation(app, Uuid::new_v4(), Some("collector-window-42"));
        assert!(record(&store, &first, now).await.applied);
        let upsert = record(&store, &second, now).await;
        assert!(upsert.applied);
        assert_eq!(upsert.edge.topic_id, second.key.topic_id);

        // The same window on the first edge again is a no-op
        let again = record(&store, &first, now).await;
        assert!(!again.applied);
        assert_eq!(again.edge.bytes_all_time, 100);
    }

    #[tokio::test]
    async fn test_redelivery_after_delete_recreates_edge() {
        let store = MemoryStore::new();
        let obs = observation(Uuid::new_v4(), Uuid::new_v4(), Some("window-7"));
        let now = Utc::now();

        let created = record(&store, &obs, now).await;
        assert!(LineageRepository::delete(&store, created.edge.id).await.unwrap());

        let recreated = record(&store, &obs, now).await;
        assert!(recreated.applied);
        assert_ne!(recreated.edge.id, created.edge.id);
        assert_eq!(recreated.edge.bytes_all_time, 100);
    }

    #[tokio::test]
    async fn test_pruned_delivery_ids_are_forgotten() {
        let store = MemoryStore::new();
        let obs = observation(Uuid::new_v4(), Uuid::new_v4(), Some("window-1"));
        let received = Utc::now() - chrono::Duration::hours(30);
        record(&store, &obs, received).await;

        let pruned = store
            .prune_deliveries(Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(pruned, 1);
        assert!(store.state.read().await.deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_begin_provisioning_is_conditional() {
        let store = MemoryStore::new();
        let mut app = Application::new(Uuid::new_v4(), "Orders".into(), "orders".into());
        app.provisioning_status = ProvisioningStatus::InProgress;
        ApplicationRepository::insert(&store, &app).await.unwrap();

        let result = store
            .begin_provisioning(
                app.id,
                &[ProvisioningStatus::Failed, ProvisioningStatus::Partial],
                "wf",
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_stale_application_write_is_rejected() {
        let store = MemoryStore::new();
        let app = Application::new(Uuid::new_v4(), "Orders".into(), "orders".into());
        ApplicationRepository::insert(&store, &app).await.unwrap();
        let loaded_at = app.updated_at;

        let mut winner = app.clone();
        winner.status = ApplicationStatus::Decommissioning;
        winner.updated_at = loaded_at + chrono::Duration::seconds(1);
        assert!(store.update_if_unchanged(&winner, loaded_at).await.unwrap());

        let mut loser = app.clone();
        loser.provisioning_status = ProvisioningStatus::Failed;
        loser.updated_at = loaded_at + chrono::Duration::seconds(2);
        assert!(!store.update_if_unchanged(&loser, loaded_at).await.unwrap());

        let stored = ApplicationRepository::find_by_id(&store, app.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ApplicationStatus::Decommissioning);
        assert_eq!(stored.provisioning_status, app.provisioning_status);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        let first = Application::new(ws, "Orders".into(), "orders".into());
        let second = Application::new(ws, "Orders 2".into(), "orders".into());
        ApplicationRepository::insert(&store, &first).await.unwrap();
        let err = ApplicationRepository::insert(&store, &second)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_usage_upsert_replaces_same_period() {
        let store = MemoryStore::new();
        let day = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
        let metric = UsageMetric {
            application_id: Uuid::new_v4(),
            application_name: "orders".into(),
            workspace_id: Uuid::new_v4(),
            workspace_name: "retail".into(),
            period_start: day,
            bytes_in: 1,
            bytes_out: 1,
            messages_in: 1,
            messages_out: 1,
        };
        store.upsert_batch(&[metric.clone()]).await.unwrap();
        let replacement = UsageMetric {
            bytes_in: 5,
            ..metric
        };
        store.upsert_batch(&[replacement]).await.unwrap();

        let stored = store.find_for_period(day, day).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].bytes_in, 5);
    }
}
