// Runner- and collector-facing endpoints under /internal

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{
        extract::{Enveloped, ValidatedJson, ValidatedQuery},
        routes::AppState,
    },
    db::VirtualClusterFilter,
    domain::{
        AccessLevel, Application, AutoApprovePolicy, EdgePatch, EdgeUpsert, Environment,
        LineageEdge, LineageSnapshot, Observation, UsageMetric, VirtualCluster,
    },
    errors::{query_response, Result},
    lineage::NewSnapshot,
    provisioning::{ApplicationPatch, EnvironmentReport, NewVirtualCluster, VirtualClusterPatch},
};

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyBody {
    pub enabled: bool,
    #[serde(default)]
    pub allowed_levels: Vec<AccessLevel>,
}

// ============================================================================
// Provisioning callbacks
// ============================================================================

/// PATCH /internal/applications/:id
#[tracing::instrument(skip(state, body))]
pub async fn patch_application(
    State(state): State<AppState>,
    Path(application_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<ApplicationPatch>,
) -> Result<Json<Application>> {
    Ok(Json(state.tracker.apply_patch(application_id, body).await?))
}

/// POST /internal/applications/:id/environments/:env
#[tracing::instrument(skip(state, body))]
pub async fn report_environment(
    State(state): State<AppState>,
    Path((application_id, environment)): Path<(Uuid, Environment)>,
    ValidatedJson(body): ValidatedJson<EnvironmentReport>,
) -> Result<Json<Application>> {
    Ok(Json(
        state
            .tracker
            .report_environment_result(application_id, environment, body)
            .await?,
    ))
}

// ============================================================================
// Virtual clusters
// ============================================================================

/// GET /internal/virtual-clusters?applicationId&environment&status
#[tracing::instrument(skip(state))]
pub async fn list_virtual_clusters(
    State(state): State<AppState>,
    Enveloped(ValidatedQuery(filter)): Enveloped<ValidatedQuery<VirtualClusterFilter>>,
) -> Response {
    query_response(state.virtual_clusters.list(&filter).await)
}

/// POST /internal/virtual-clusters
#[tracing::instrument(skip(state, body))]
pub async fn create_virtual_cluster(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<NewVirtualCluster>,
) -> Result<(StatusCode, Json<VirtualCluster>)> {
    let cluster = state.virtual_clusters.create(body).await?;
    Ok((StatusCode::CREATED, Json(cluster)))
}

/// PATCH /internal/virtual-clusters/:id
#[tracing::instrument(skip(state, body))]
pub async fn patch_virtual_cluster(
    State(state): State<AppState>,
    Path(cluster_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<VirtualClusterPatch>,
) -> Result<Json<VirtualCluster>> {
    Ok(Json(state.virtual_clusters.update(cluster_id, body).await?))
}

// ============================================================================
// Lineage collector
// ============================================================================

/// POST /internal/lineage/observations
#[tracing::instrument(skip(state, body))]
pub async fn record_observation(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<Observation>,
) -> Result<Json<EdgeUpsert>> {
    Ok(Json(state.lineage.record_observation(body).await?))
}

/// PATCH /internal/lineage-edges/:id
#[tracing::instrument(skip(state, body))]
pub async fn patch_edge(
    State(state): State<AppState>,
    Path(edge_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<EdgePatch>,
) -> Result<Json<LineageEdge>> {
    Ok(Json(state.lineage.patch_edge(edge_id, body).await?))
}

/// DELETE /internal/lineage-edges/:id
#[tracing::instrument(skip(state))]
pub async fn delete_edge(
    State(state): State<AppState>,
    Path(edge_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.lineage.delete_edge(edge_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /internal/lineage-edges/deactivate-stale
#[tracing::instrument(skip(state))]
pub async fn deactivate_stale_edges(State(state): State<AppState>) -> Result<Json<CountResponse>> {
    let count = state.lineage.deactivate_stale(Utc::now()).await?;
    Ok(Json(CountResponse { count }))
}

/// POST /internal/lineage-snapshots
#[tracing::instrument(skip(state, body))]
pub async fn append_snapshot(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<NewSnapshot>,
) -> Result<(StatusCode, Json<LineageSnapshot>)> {
    let snapshot = state.lineage.append_snapshot(body).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

// ============================================================================
// Usage and policies
// ============================================================================

/// POST /internal/usage-metrics
#[tracing::instrument(skip(state, body))]
pub async fn ingest_usage(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<Vec<UsageMetric>>,
) -> Result<Json<CountResponse>> {
    let count = state.chargeback.ingest(body).await?;
    Ok(Json(CountResponse { count }))
}

/// PUT /internal/auto-approve-policies/:workspace_id
#[tracing::instrument(skip(state, body))]
pub async fn put_auto_approve_policy(
    State(state): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<PolicyBody>,
) -> Result<Json<AutoApprovePolicy>> {
    let policy = AutoApprovePolicy {
        workspace_id,
        enabled: body.enabled,
        allowed_levels: body.allowed_levels,
    };
    Ok(Json(state.approvals.set_auto_approve_policy(policy).await?))
}
