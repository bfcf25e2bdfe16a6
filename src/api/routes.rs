use crate::{
    api::{
        applications, approvals, chargeback, health, internal, lineage,
        middleware::{require_internal_key, track_metrics, InternalKey},
    },
    applications::ApplicationService,
    approval::ApprovalService,
    cache::SummaryCache,
    chargeback::ChargebackService,
    config::Config,
    db::repository::Repositories,
    lineage::LineageEngine,
    observability::HealthChecker,
    provisioning::{ProvisioningTracker, VirtualClusterService},
    quota::QuotaEvaluator,
    workflow::WorkflowRunner,
};
use axum::{
    extract::FromRef,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub repos: Repositories,
    pub quota: Arc<QuotaEvaluator>,
    pub tracker: Arc<ProvisioningTracker>,
    pub virtual_clusters: Arc<VirtualClusterService>,
    pub applications: Arc<ApplicationService>,
    pub approvals: Arc<ApprovalService>,
    pub lineage: Arc<LineageEngine>,
    pub chargeback: Arc<ChargebackService>,
    pub health_checker: Arc<HealthChecker>,
    pub internal_key: Arc<InternalKey>,
}

impl AppState {
    /// Wire every service over one set of repositories. `cache` is `None`
    /// when the summary cache is disabled.
    pub fn new(
        config: &Config,
        repos: Repositories,
        runner: Arc<dyn WorkflowRunner>,
        cache: Option<Arc<dyn SummaryCache>>,
    ) -> Self {
        let summary_cache: Arc<dyn SummaryCache> = match &cache {
            Some(cache) => cache.clone(),
            None => Arc::new(crate::cache::NoopSummaryCache),
        };

        let quota = Arc::new(QuotaEvaluator::new(&repos, &config.quota));
        let tracker = Arc::new(ProvisioningTracker::new(
            repos.clone(),
            runner,
            &config.provisioning,
        ));
        let approvals = Arc::new(ApprovalService::new(
            repos.clone(),
            quota.clone(),
            tracker.clone(),
            &config.quota,
            &config.approval,
        ));
        let applications = Arc::new(ApplicationService::new(
            repos.clone(),
            quota.clone(),
            tracker.clone(),
            approvals.clone(),
        ));

        Self {
            virtual_clusters: Arc::new(VirtualClusterService::new(&repos)),
            lineage: Arc::new(LineageEngine::new(repos.clone(), summary_cache)),
            chargeback: Arc::new(ChargebackService::new(&repos, &config.chargeback)),
            health_checker: Arc::new(HealthChecker::new(repos.health.clone(), cache)),
            internal_key: Arc::new(InternalKey::new(&config.internal_api.shared_key)),
            repos,
            quota,
            tracker,
            applications,
            approvals,
        }
    }
}

impl FromRef<AppState> for Arc<HealthChecker> {
    fn from_ref(state: &AppState) -> Self {
        state.health_checker.clone()
    }
}

pub fn create_router(state: AppState, metrics_enabled: bool) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        // Health endpoints
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));
    if metrics_enabled {
        router = router.route("/metrics", get(health::metrics));
    }

    router
        .nest("/v1", v1_routes())
        .nest(
            "/internal",
            internal_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                require_internal_key,
            )),
        )
        // Add middleware
        .layer(middleware::from_fn(track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Add state
        .with_state(state)
}

/// Portal-facing routes; the caller scope comes from gateway headers.
fn v1_routes() -> Router<AppState> {
    Router::new()
        // Applications and provisioning
        .route(
            "/workspaces/:id/applications",
            post(applications::create_application),
        )
        .route("/workspaces/:id/quota", get(applications::get_quota))
        .route(
            "/applications/:id/provisioning/trigger",
            post(applications::trigger_provisioning),
        )
        .route(
            "/applications/:id/provisioning/retry",
            post(applications::retry_provisioning),
        )
        .route(
            "/applications/:id/decommission",
            post(applications::decommission_application),
        )
        .route("/provisioning/issues", get(applications::list_issues))
        // Lineage
        .route("/topics/:id/lineage", get(lineage::topic_lineage))
        .route("/topics/:id/lineage/summary", get(lineage::topic_summary))
        .route("/topics/:id/lineage/history", get(lineage::topic_history))
        .route("/applications/:id/lineage", get(lineage::application_lineage))
        .route(
            "/applications/:id/lineage/summary",
            get(lineage::application_summary),
        )
        .route(
            "/workspaces/:id/lineage/cross-workspace",
            get(lineage::cross_workspace),
        )
        // Chargeback
        .route("/chargeback", get(chargeback::report))
        .route("/chargeback/export", get(chargeback::export))
        // Approval workflow
        .route("/application-requests", get(approvals::list_requests))
        .route(
            "/application-requests/:id",
            axum::routing::delete(approvals::withdraw_request),
        )
        .route(
            "/application-requests/:id/approve",
            post(approvals::approve_request),
        )
        .route(
            "/application-requests/:id/reject",
            post(approvals::reject_request),
        )
        .route(
            "/topic-access-requests",
            get(approvals::list_topic_access).post(approvals::request_topic_access),
        )
        .route(
            "/topic-access-requests/:id/approve",
            post(approvals::approve_topic_access),
        )
        .route(
            "/topic-access-requests/:id/reject",
            post(approvals::reject_topic_access),
        )
}

/// Runner- and collector-facing routes behind the shared key.
fn internal_routes() -> Router<AppState> {
    Router::new()
        .route("/applications/:id", patch(internal::patch_application))
        .route(
            "/applications/:id/environments/:env",
            post(internal::report_environment),
        )
        .route(
            "/virtual-clusters",
            get(internal::list_virtual_clusters).post(internal::create_virtual_cluster),
        )
        .route(
            "/virtual-clusters/:id",
            patch(internal::patch_virtual_cluster),
        )
        .route("/lineage/observations", post(internal::record_observation))
        .route(
            "/lineage-edges/:id",
            patch(internal::patch_edge).delete(internal::delete_edge),
        )
        .route(
            "/lineage-edges/deactivate-stale",
            post(internal::deactivate_stale_edges),
        )
        .route("/lineage-snapshots", post(internal::append_snapshot))
        .route("/usage-metrics", post(internal::ingest_usage))
        .route(
            "/auto-approve-policies/:workspace_id",
            axum::routing::put(internal::put_auto_approve_policy),
        )
}
