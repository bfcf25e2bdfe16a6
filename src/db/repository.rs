// Narrow repository interfaces over the shared document store.
//
// Each entity gets find-by-id, find-by-filter and a write path. Access
// predicates are not part of these interfaces; services apply an explicit
// `AccessScope` filter to whatever the store returns.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    AccessLevel, Application, ApplicationRequest, ApplicationStatus, AutoApprovePolicy, Direction,
    EdgeUpsert, Environment, LineageEdge, LineageSnapshot, Observation, ProvisioningStatus,
    RequestStatus, Topic, TopicAccessRequest, UsageMetric, VirtualCluster, VirtualClusterStatus,
    Workspace,
};
use crate::errors::{AppError, Result};

// ============================================================================
// Filters
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub workspace_id: Option<Uuid>,
    pub status: Option<ApplicationStatus>,
    pub provisioning_status: Option<ProvisioningStatus>,
    pub slug: Option<String>,
}

/// Explicit query parameters for virtual clusters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VirtualClusterFilter {
    pub application_id: Option<Uuid>,
    pub environment: Option<Environment>,
    pub status: Option<VirtualClusterStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeFilter {
    pub topic_id: Option<Uuid>,
    pub source_application_id: Option<Uuid>,
    pub source_workspace_id: Option<Uuid>,
    pub target_workspace_id: Option<Uuid>,
    pub direction: Option<Direction>,
    pub cross_workspace_only: bool,
    pub include_inactive: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub workspace_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AccessRequestFilter {
    pub topic_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    /// Matches either the requesting or the topic-owning workspace.
    pub workspace_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

// ============================================================================
// Repositories
// ============================================================================

#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Workspace>>;
}

#[async_trait]
pub trait TopicRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Topic>>;
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Application>>;

    async fn find_by_filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>>;

    async fn count_active(&self, workspace_id: Uuid) -> Result<u64>;

    /// Insert a new application; a taken slug is `InvalidState`.
    async fn insert(&self, application: &Application) -> Result<()>;

    /// Replace a stored application; a missing one is `NotFound`.
    async fn update(&self, application: &Application) -> Result<()>;

    /// Replace a stored application only while its `updatedAt` still equals
    /// `expected_updated_at`. Returns `false` when another writer got there
    /// first; a missing application is `NotFound`.
    async fn update_if_unchanged(
        &self,
        application: &Application,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Conditionally move an active application into `in_progress`, clearing
    /// prior error state. Returns `None` when the current provisioning status
    /// is not in `from` or the application is not active.
    async fn begin_provisioning(
        &self,
        id: Uuid,
        from: &[ProvisioningStatus],
        workflow_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Application>>;
}

#[async_trait]
pub trait VirtualClusterRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<VirtualCluster>>;

    async fn find_by_filter(&self, filter: &VirtualClusterFilter) -> Result<Vec<VirtualCluster>>;

    /// Insert; a second cluster for the same (application, environment) is `InvalidState`.
    async fn insert(&self, cluster: &VirtualCluster) -> Result<()>;

    /// Insert or replace by (application, environment), returning the stored record.
    async fn upsert(&self, cluster: &VirtualCluster) -> Result<VirtualCluster>;

    async fn update(&self, cluster: &VirtualCluster) -> Result<()>;
}

#[async_trait]
pub trait LineageRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<LineageEdge>>;

    async fn find_by_filter(&self, filter: &EdgeFilter) -> Result<Vec<LineageEdge>>;

    /// Atomic find-or-create-then-increment keyed by the edge's natural key.
    /// `seed` is stored when the key is new; otherwise its resolved workspaces
    /// refresh the stored edge. Delivery ids are deduplicated per edge: a
    /// (natural key, delivery id) pair that was already applied leaves the
    /// edge untouched and reports `applied: false`.
    async fn upsert_with_increment(
        &self,
        seed: LineageEdge,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<EdgeUpsert>;

    async fn update(&self, edge: &LineageEdge) -> Result<()>;

    /// Delete an edge together with its recorded delivery ids.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Mark edges whose last observation is older than `cutoff` inactive,
    /// returning the edges that changed.
    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<LineageEdge>>;

    /// Forget delivery ids received before `cutoff`.
    async fn prune_deliveries(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Append-only store for daily snapshots.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// A second snapshot for the same (topic, day) is `InvalidState`.
    async fn append(&self, snapshot: &LineageSnapshot) -> Result<()>;

    async fn find_by_filter(
        &self,
        topic_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<LineageSnapshot>>;
}

#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApplicationRequest>>;

    async fn find_by_filter(&self, filter: &RequestFilter) -> Result<Vec<ApplicationRequest>>;

    /// Insert a pending request; another pending request with the same
    /// (workspace, name) is `InvalidState`.
    async fn insert(&self, request: &ApplicationRequest) -> Result<()>;

    /// Store `request` only if the stored status still equals `expected`.
    async fn update(&self, request: &ApplicationRequest, expected: RequestStatus) -> Result<()>;

    async fn delete(&self, id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait AccessRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TopicAccessRequest>>;

    async fn find_by_filter(&self, filter: &AccessRequestFilter) -> Result<Vec<TopicAccessRequest>>;

    /// Insert; another pending request for the same (application, topic) is `InvalidState`.
    async fn insert(&self, request: &TopicAccessRequest) -> Result<()>;

    async fn update(&self, request: &TopicAccessRequest, expected: RequestStatus) -> Result<()>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn find_by_workspace(&self, workspace_id: Uuid) -> Result<Option<AutoApprovePolicy>>;

    async fn upsert(&self, policy: &AutoApprovePolicy) -> Result<()>;
}

#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// Store collector records; a record for an existing (application,
    /// period start) replaces it.
    async fn upsert_batch(&self, metrics: &[UsageMetric]) -> Result<u64>;

    async fn find_for_period(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<UsageMetric>>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// Every repository, behind trait objects.
#[derive(Clone)]
pub struct Repositories {
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub topics: Arc<dyn TopicRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub virtual_clusters: Arc<dyn VirtualClusterRepository>,
    pub lineage: Arc<dyn LineageRepository>,
    pub snapshots: Arc<dyn SnapshotRepository>,
    pub requests: Arc<dyn RequestRepository>,
    pub access_requests: Arc<dyn AccessRequestRepository>,
    pub policies: Arc<dyn PolicyRepository>,
    pub usage: Arc<dyn UsageRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Repositories {
    /// Wire every repository to one store implementing all of them.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: WorkspaceRepository
            + TopicRepository
            + ApplicationRepository
            + VirtualClusterRepository
            + LineageRepository
            + SnapshotRepository
            + RequestRepository
            + AccessRequestRepository
            + PolicyRepository
            + UsageRepository
            + StoreHealth
            + 'static,
    {
        Self {
            workspaces: store.clone(),
            topics: store.clone(),
            applications: store.clone(),
            virtual_clusters: store.clone(),
            lineage: store.clone(),
            snapshots: store.clone(),
            requests: store.clone(),
            access_requests: store.clone(),
            policies: store.clone(),
            usage: store.clone(),
            health: store,
        }
    }
}

/// Tries before a contended application write is reported as a conflict.
const APPLICATION_WRITE_ATTEMPTS: usize = 5;

impl Repositories {
    /// Read-modify-write of one application, guarded by its `updatedAt`.
    ///
    /// `change` runs against freshly loaded state on every attempt and
    /// returns whether there is anything to write. The new `updatedAt` is
    /// strictly later than the one it replaces.
    pub async fn modify_application<F>(&self, id: Uuid, mut change: F) -> Result<Application>
    where
        F: FnMut(&mut Application, DateTime<Utc>) -> Result<bool> + Send,
    {
        for attempt in 1..=APPLICATION_WRITE_ATTEMPTS {
            let mut application = self
                .applications
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found("Application"))?;
            let expected = application.updated_at;
            let now = Utc::now().max(expected + Duration::microseconds(1));

            if !change(&mut application, now)? {
                return Ok(application);
            }
            application.updated_at = now;
            if self
                .applications
                .update_if_unchanged(&application, expected)
                .await?
            {
                return Ok(application);
            }
            tracing::debug!(application_id = %id, attempt, "Application write conflict, reloading");
        }

        Err(AppError::InvalidState(format!(
            "Application {} is being modified concurrently",
            id
        )))
    }
}

/// Allowed levels are stored as their string form.
pub(crate) fn levels_to_strings(levels: &[AccessLevel]) -> Vec<String> {
    levels.iter().map(|l| l.as_str().to_string()).collect()
}
