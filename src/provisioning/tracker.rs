use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::patch::{ApplicationPatch, EnvironmentReport};
use crate::config::ProvisioningConfig;
use crate::db::repository::{ApplicationFilter, Repositories, VirtualClusterFilter};
use crate::domain::{
    Application, ApplicationStatus, Environment, EnvironmentOutcome, ProvisioningStatus,
    VirtualCluster, VirtualClusterStatus,
};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;
use crate::workflow::{ProvisioningRequest, WorkflowRunner};

/// Trigger is allowed from any status except `in_progress`.
const TRIGGERABLE: [ProvisioningStatus; 4] = [
    ProvisioningStatus::Pending,
    ProvisioningStatus::Completed,
    ProvisioningStatus::Partial,
    ProvisioningStatus::Failed,
];

const RETRIABLE: [ProvisioningStatus; 2] = [ProvisioningStatus::Failed, ProvisioningStatus::Partial];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueFilter {
    Failed,
    Partial,
    InProgress,
    Pending,
    #[default]
    All,
}

impl IssueFilter {
    fn status(&self) -> Option<ProvisioningStatus> {
        match self {
            IssueFilter::Failed => Some(ProvisioningStatus::Failed),
            IssueFilter::Partial => Some(ProvisioningStatus::Partial),
            IssueFilter::InProgress => Some(ProvisioningStatus::InProgress),
            IssueFilter::Pending => Some(ProvisioningStatus::Pending),
            IssueFilter::All => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TriggerKind {
    Trigger,
    Retry,
}

impl TriggerKind {
    fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Trigger => "trigger",
            TriggerKind::Retry => "retry",
        }
    }

    fn allowed_from(&self) -> &'static [ProvisioningStatus] {
        match self {
            TriggerKind::Trigger => &TRIGGERABLE,
            TriggerKind::Retry => &RETRIABLE,
        }
    }
}

/// Owns an application's provisioning status and the per-environment
/// callbacks that drive it.
pub struct ProvisioningTracker {
    repos: Repositories,
    runner: Arc<dyn WorkflowRunner>,
    required: Vec<Environment>,
    gateway_domain: String,
}

impl ProvisioningTracker {
    pub fn new(
        repos: Repositories,
        runner: Arc<dyn WorkflowRunner>,
        config: &ProvisioningConfig,
    ) -> Self {
        Self {
            repos,
            runner,
            required: config.required_environments.clone(),
            gateway_domain: config.gateway_domain.clone(),
        }
    }

    pub fn required_environments(&self) -> &[Environment] {
        &self.required
    }

    pub(crate) fn runner(&self) -> &Arc<dyn WorkflowRunner> {
        &self.runner
    }

    /// Start provisioning. A failed runner call leaves the application
    /// `failed` with the error recorded, and is not an error for the caller.
    #[tracing::instrument(skip(self))]
    pub async fn trigger(&self, application_id: Uuid) -> Result<Application> {
        self.start(application_id, TriggerKind::Trigger).await
    }

    /// Like `trigger`, but only from `failed` or `partial`.
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, application_id: Uuid) -> Result<Application> {
        self.start(application_id, TriggerKind::Retry).await
    }

    async fn start(&self, application_id: Uuid, kind: TriggerKind) -> Result<Application> {
        let application = self.load(application_id).await?;
        check_startable(&application, kind)?;

        let workspace = self
            .repos
            .workspaces
            .find_by_id(application.workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace"))?;

        let workflow_id = Application::provisioning_workflow_id(application.id);
        let now = Utc::now();
        let Some(mut application) = self
            .repos
            .applications
            .begin_provisioning(application.id, kind.allowed_from(), &workflow_id, now)
            .await?
        else {
            // Lost the race to a concurrent trigger or callback
            let current = self.load(application_id).await?;
            check_startable(&current, kind)?;
            return Err(AppError::InvalidState(format!(
                "Application {} changed state concurrently",
                application_id
            )));
        };

        tracing::info!(
            application_id = %application.id,
            workflow_id = %workflow_id,
            kind = kind.as_str(),
            "Provisioning started"
        );

        let request = ProvisioningRequest {
            workflow_id: workflow_id.clone(),
            application_id: application.id,
            application_slug: application.slug.clone(),
            workspace_id: workspace.id,
            workspace_slug: workspace.slug.clone(),
        };

        match self.runner.start_provisioning(&request).await {
            Ok(runner_workflow_id) => {
                MetricsRecorder::record_provisioning_trigger(kind.as_str(), "started");
                if runner_workflow_id != workflow_id {
                    application = self
                        .repos
                        .modify_application(application.id, |app, _| {
                            if app.provisioning_workflow_id.as_deref() != Some(workflow_id.as_str()) {
                                return Ok(false);
                            }
                            app.provisioning_workflow_id = Some(runner_workflow_id.clone());
                            Ok(true)
                        })
                        .await?;
                }
            }
            Err(err) => {
                MetricsRecorder::record_provisioning_trigger(kind.as_str(), "failed");
                let message = match err {
                    AppError::UpstreamFailure(message) => message,
                    other => other.to_string(),
                };
                tracing::error!(
                    application_id = %application.id,
                    workflow_id = %workflow_id,
                    error = %message,
                    "Provisioning trigger failed"
                );
                application = self
                    .repos
                    .modify_application(application.id, |app, _| {
                        // Teardown or a newer run may already own the record
                        if app.provisioning_status != ProvisioningStatus::InProgress
                            || app.provisioning_workflow_id.as_deref() != Some(workflow_id.as_str())
                        {
                            return Ok(false);
                        }
                        app.provisioning_status = ProvisioningStatus::Failed;
                        app.provisioning_error = Some(message.clone());
                        app.provisioning_completed_at = None;
                        Ok(true)
                    })
                    .await?;
            }
        }

        Ok(application)
    }

    /// Record one environment's result from the runner.
    ///
    /// Redelivery of an identical result only bumps `updatedAt`. The
    /// aggregate status is recomputed once every required environment has
    /// reported; until then the application stays `in_progress`.
    #[tracing::instrument(skip(self, report), fields(status = ?report.status))]
    pub async fn report_environment_result(
        &self,
        application_id: Uuid,
        environment: Environment,
        report: EnvironmentReport,
    ) -> Result<Application> {
        if !self.required.contains(&environment) {
            return Err(AppError::Validation(format!(
                "Environment '{}' is not provisioned by this control plane",
                environment
            )));
        }

        let detail = report.detail();
        MetricsRecorder::record_environment_callback(environment.as_str(), status_label(&report));

        let required = &self.required;
        let mut duplicate = false;
        let application = self
            .repos
            .modify_application(application_id, |application, now| {
                if application.status == ApplicationStatus::Deleted {
                    return Err(AppError::InvalidState(format!(
                        "Application {} is deleted",
                        application_id
                    )));
                }

                duplicate = application.provisioning_details.get(&environment) == Some(&detail);
                if duplicate {
                    return Ok(true);
                }

                application
                    .provisioning_details
                    .insert(environment, detail.clone());
                match ProvisioningStatus::aggregate(required, &application.provisioning_details) {
                    Some(status) => {
                        application.provisioning_status = status;
                        application.provisioning_completed_at = Some(now);
                        application.provisioning_error = environment_errors(application);
                    }
                    None => {
                        application.provisioning_status = ProvisioningStatus::InProgress;
                        application.provisioning_completed_at = None;
                    }
                }
                Ok(true)
            })
            .await?;

        if duplicate {
            tracing::debug!(
                application_id = %application.id,
                environment = %environment,
                "Duplicate environment result"
            );
            return Ok(application);
        }
        if application.provisioning_status.is_terminal() {
            tracing::info!(
                application_id = %application.id,
                status = %application.provisioning_status,
                "Provisioning finished"
            );
        }

        if application.status == ApplicationStatus::Active {
            self.sync_virtual_cluster(&application, environment, &report)
                .await?;
        }

        tracing::info!(
            application_id = %application.id,
            environment = %environment,
            status = ?report.status,
            "Environment result recorded"
        );
        Ok(application)
    }

    async fn sync_virtual_cluster(
        &self,
        application: &Application,
        environment: Environment,
        report: &EnvironmentReport,
    ) -> Result<()> {
        let status = match report.status {
            EnvironmentOutcome::Success => VirtualClusterStatus::Active,
            EnvironmentOutcome::Failed => VirtualClusterStatus::Failed,
            EnvironmentOutcome::Skipped => return Ok(()),
        };

        let filter = VirtualClusterFilter {
            application_id: Some(application.id),
            environment: Some(environment),
            status: None,
        };
        let existing = self
            .repos
            .virtual_clusters
            .find_by_filter(&filter)
            .await?
            .into_iter()
            .next();

        let mut cluster = existing
            .unwrap_or_else(|| VirtualCluster::new(application.id, environment, status));
        cluster.status = status;
        cluster.updated_at = Utc::now();
        if let Some(host) = &report.advertised_host {
            cluster.advertised_host = Some(host.clone());
        }
        if let Some(prefix) = &report.topic_prefix {
            cluster.topic_prefix = Some(prefix.clone());
        }
        if status == VirtualClusterStatus::Active {
            if cluster.advertised_host.is_none() {
                cluster.advertised_host = Some(format!(
                    "{}-{}.{}",
                    application.slug, environment, self.gateway_domain
                ));
            }
            if cluster.topic_prefix.is_none() {
                cluster.topic_prefix = Some(format!("{}.", application.slug));
            }
        }

        self.repos.virtual_clusters.upsert(&cluster).await?;
        Ok(())
    }

    /// Field update from the runner (`PATCH /internal/applications/{id}`).
    #[tracing::instrument(skip(self, patch))]
    pub async fn apply_patch(
        &self,
        application_id: Uuid,
        patch: ApplicationPatch,
    ) -> Result<Application> {
        if patch.is_empty() {
            return Err(AppError::Validation("Empty patch".to_string()));
        }

        let application = self
            .repos
            .modify_application(application_id, |application, now| {
                patch.apply_to(application, now)?;
                Ok(true)
            })
            .await?;

        tracing::info!(
            application_id = %application.id,
            status = %application.provisioning_status,
            lifecycle = application.status.as_str(),
            "Application patched by workflow runner"
        );
        Ok(application)
    }

    /// Applications needing operator attention, most recently changed first.
    #[tracing::instrument(skip(self))]
    pub async fn list_with_issues(&self, filter: IssueFilter) -> Result<Vec<Application>> {
        let query = ApplicationFilter {
            provisioning_status: filter.status(),
            ..Default::default()
        };
        let applications = self.repos.applications.find_by_filter(&query).await?;

        Ok(applications
            .into_iter()
            .filter(|a| a.status != ApplicationStatus::Deleted)
            .filter(|a| a.provisioning_status != ProvisioningStatus::Completed)
            .collect())
    }

    async fn load(&self, application_id: Uuid) -> Result<Application> {
        self.repos
            .applications
            .find_by_id(application_id)
            .await?
            .ok_or_else(|| AppError::not_found("Application"))
    }
}

fn check_startable(application: &Application, kind: TriggerKind) -> Result<()> {
    if application.status != ApplicationStatus::Active {
        return Err(AppError::InvalidState(format!(
            "Application {} is {}",
            application.id,
            application.status.as_str()
        )));
    }
    if application.provisioning_status == ProvisioningStatus::InProgress {
        return Err(AppError::InvalidState(format!(
            "Provisioning for application {} is already in progress",
            application.id
        )));
    }
    if !kind.allowed_from().contains(&application.provisioning_status) {
        return Err(AppError::InvalidState(format!(
            "Cannot {} provisioning from status '{}'",
            kind.as_str(),
            application.provisioning_status
        )));
    }
    Ok(())
}

fn status_label(report: &EnvironmentReport) -> &'static str {
    match report.status {
        EnvironmentOutcome::Success => "success",
        EnvironmentOutcome::Failed => "failed",
        EnvironmentOutcome::Skipped => "skipped",
    }
}

/// "env: error" for every environment that reported one.
fn environment_errors(application: &Application) -> Option<String> {
    let errors: Vec<String> = application
        .provisioning_details
        .iter()
        .filter_map(|(env, detail)| detail.error.as_ref().map(|e| format!("{}: {}", env, e)))
        .collect();
    if errors.is_empty() {
        None
    } else {
        Some(errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::ApplicationRepository;
    use crate::db::MemoryStore;
    use crate::domain::Workspace;
    use crate::workflow::RecordingWorkflowRunner;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::sync::Mutex;

    /// Applies one competing write just before the first conditional write.
    struct InterleavedApplications {
        inner: Arc<MemoryStore>,
        competing: Mutex<Option<Application>>,
    }

    #[async_trait]
    impl ApplicationRepository for InterleavedApplications {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<Application>> {
            ApplicationRepository::find_by_id(self.inner.as_ref(), id).await
        }

        async fn find_by_filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
            ApplicationRepository::find_by_filter(self.inner.as_ref(), filter).await
        }

        async fn count_active(&self, workspace_id: Uuid) -> Result<u64> {
            self.inner.count_active(workspace_id).await
        }

        async fn insert(&self, application: &Application) -> Result<()> {
            ApplicationRepository::insert(self.inner.as_ref(), application).await
        }

        async fn update(&self, application: &Application) -> Result<()> {
            ApplicationRepository::update(self.inner.as_ref(), application).await
        }

        async fn update_if_unchanged(
            &self,
            application: &Application,
            expected_updated_at: DateTime<Utc>,
        ) -> Result<bool> {
            let competing = self.competing.lock().unwrap().take();
            if let Some(competing) = competing {
                ApplicationRepository::update(self.inner.as_ref(), &competing).await?;
            }
            self.inner
                .update_if_unchanged(application, expected_updated_at)
                .await
        }

        async fn begin_provisioning(
            &self,
            id: Uuid,
            from: &[ProvisioningStatus],
            workflow_id: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<Application>> {
            self.inner.begin_provisioning(id, from, workflow_id, now).await
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        runner: Arc<RecordingWorkflowRunner>,
        tracker: ProvisioningTracker,
    }

    async fn fixture(runner: RecordingWorkflowRunner) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let runner = Arc::new(runner);
        let tracker = ProvisioningTracker::new(
            Repositories::from_store(store.clone()),
            runner.clone(),
            &ProvisioningConfig {
                required_environments: Environment::ALL.to_vec(),
                gateway_domain: "kafka.test".into(),
            },
        );
        Fixture {
            store,
            runner,
            tracker,
        }
    }

    async fn seed_app(store: &MemoryStore, status: ProvisioningStatus) -> Application {
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: "Retail".into(),
            slug: "retail".into(),
            application_quota: None,
        };
        store.put_workspace(workspace.clone()).await;
        let mut app = Application::new(workspace.id, "Orders".into(), "orders".into());
        app.provisioning_status = status;
        ApplicationRepository::insert(store, &app).await.unwrap();
        app
    }

    fn report(status: EnvironmentOutcome) -> EnvironmentReport {
        EnvironmentReport {
            status,
            error: match status {
                EnvironmentOutcome::Failed => Some("broker timeout".into()),
                _ => None,
            },
            message: None,
            advertised_host: None,
            topic_prefix: None,
        }
    }

    #[tokio::test]
    async fn test_trigger_sets_in_progress_with_deterministic_workflow_id() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;

        let updated = f.tracker.trigger(app.id).await.unwrap();
        assert_eq!(updated.provisioning_status, ProvisioningStatus::InProgress);
        assert_eq!(
            updated.provisioning_workflow_id.as_deref(),
            Some(format!("kafka-provision-{}", app.id).as_str())
        );

        let started = f.runner.started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].workspace_slug, "retail");
    }

    #[tokio::test]
    async fn test_failed_trigger_records_failed_status() {
        let f = fixture(RecordingWorkflowRunner::failing("runner unreachable")).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;

        let updated = f.tracker.trigger(app.id).await.unwrap();
        assert_eq!(updated.provisioning_status, ProvisioningStatus::Failed);

        let stored = ApplicationRepository::find_by_id(f.store.as_ref(), app.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.provisioning_status, ProvisioningStatus::Failed);
        assert_eq!(stored.provisioning_error.as_deref(), Some("runner unreachable"));
    }

    #[tokio::test]
    async fn test_retry_while_in_progress_is_rejected_without_trigger() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::InProgress).await;

        let err = f.tracker.retry(app.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(f.runner.started().is_empty());
    }

    #[tokio::test]
    async fn test_retry_from_completed_is_rejected() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Completed).await;

        let err = f.tracker.retry(app.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(f.runner.started().is_empty());
    }

    #[tokio::test]
    async fn test_retry_from_partial_clears_prior_error() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let mut app = seed_app(&f.store, ProvisioningStatus::Partial).await;
        app.provisioning_error = Some("stage: broker timeout".into());
        ApplicationRepository::update(f.store.as_ref(), &app)
            .await
            .unwrap();

        let updated = f.tracker.retry(app.id).await.unwrap();
        assert_eq!(updated.provisioning_status, ProvisioningStatus::InProgress);
        assert_eq!(updated.provisioning_error, None);
        assert!(updated.provisioning_details.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_missing_application_is_not_found() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let err = f.tracker.trigger(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mixed_environment_results_aggregate_to_partial() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;
        f.tracker.trigger(app.id).await.unwrap();

        let after_dev = f
            .tracker
            .report_environment_result(app.id, Environment::Dev, report(EnvironmentOutcome::Success))
            .await
            .unwrap();
        assert_eq!(after_dev.provisioning_status, ProvisioningStatus::InProgress);

        f.tracker
            .report_environment_result(app.id, Environment::Stage, report(EnvironmentOutcome::Failed))
            .await
            .unwrap();
        let done = f
            .tracker
            .report_environment_result(app.id, Environment::Prod, report(EnvironmentOutcome::Success))
            .await
            .unwrap();

        assert_eq!(done.provisioning_status, ProvisioningStatus::Partial);
        assert!(done.provisioning_completed_at.is_some());
        assert_eq!(done.provisioning_error.as_deref(), Some("stage: broker timeout"));
    }

    #[tokio::test]
    async fn test_all_success_completes_and_activates_clusters() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;
        f.tracker.trigger(app.id).await.unwrap();

        let mut last = None;
        for env in Environment::ALL {
            last = Some(
                f.tracker
                    .report_environment_result(app.id, env, report(EnvironmentOutcome::Success))
                    .await
                    .unwrap(),
            );
        }
        let done = last.unwrap();
        assert_eq!(done.provisioning_status, ProvisioningStatus::Completed);

        let clusters = crate::db::repository::VirtualClusterRepository::find_by_filter(
            f.store.as_ref(),
            &VirtualClusterFilter {
                application_id: Some(app.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(clusters.len(), 3);
        assert!(done.is_fully_provisioned(&clusters, &Environment::ALL));
        let dev = clusters
            .iter()
            .find(|c| c.environment == Environment::Dev)
            .unwrap();
        assert_eq!(dev.advertised_host.as_deref(), Some("orders-dev.kafka.test"));
    }

    #[tokio::test]
    async fn test_all_failures_aggregate_to_failed() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;
        f.tracker.trigger(app.id).await.unwrap();

        let mut last = None;
        for (env, outcome) in [
            (Environment::Dev, EnvironmentOutcome::Failed),
            (Environment::Stage, EnvironmentOutcome::Skipped),
            (Environment::Prod, EnvironmentOutcome::Failed),
        ] {
            last = Some(
                f.tracker
                    .report_environment_result(app.id, env, report(outcome))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(last.unwrap().provisioning_status, ProvisioningStatus::Failed);
    }

    #[tokio::test]
    async fn test_duplicate_callback_only_bumps_timestamp() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let app = seed_app(&f.store, ProvisioningStatus::Pending).await;
        f.tracker.trigger(app.id).await.unwrap();

        let first = f
            .tracker
            .report_environment_result(app.id, Environment::Dev, report(EnvironmentOutcome::Success))
            .await
            .unwrap();
        let second = f
            .tracker
            .report_environment_result(app.id, Environment::Dev, report(EnvironmentOutcome::Success))
            .await
            .unwrap();

        assert_eq!(first.provisioning_details, second.provisioning_details);
        assert_eq!(first.provisioning_status, second.provisioning_status);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_callback_racing_decommission_keeps_both_changes() {
        let store = Arc::new(MemoryStore::new());
        let app = seed_app(&store, ProvisioningStatus::InProgress).await;
        let mut competing = app.clone();
        competing.status = ApplicationStatus::Decommissioning;
        competing.updated_at = app.updated_at + Duration::seconds(1);

        let mut repos = Repositories::from_store(store.clone());
        repos.applications = Arc::new(InterleavedApplications {
            inner: store.clone(),
            competing: Mutex::new(Some(competing)),
        });
        let tracker = ProvisioningTracker::new(
            repos,
            Arc::new(RecordingWorkflowRunner::new()),
            &ProvisioningConfig {
                required_environments: Environment::ALL.to_vec(),
                gateway_domain: "kafka.test".into(),
            },
        );

        let updated = tracker
            .report_environment_result(app.id, Environment::Dev, report(EnvironmentOutcome::Success))
            .await
            .unwrap();
        assert_eq!(updated.status, ApplicationStatus::Decommissioning);
        assert!(updated.updated_at > app.updated_at + Duration::seconds(1));

        let stored = ApplicationRepository::find_by_id(store.as_ref(), app.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ApplicationStatus::Decommissioning);
        assert!(stored.provisioning_details.contains_key(&Environment::Dev));
        assert_eq!(stored.provisioning_status, ProvisioningStatus::InProgress);
    }

    #[tokio::test]
    async fn test_unrequired_environment_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let tracker = ProvisioningTracker::new(
            Repositories::from_store(store.clone()),
            Arc::new(RecordingWorkflowRunner::new()),
            &ProvisioningConfig {
                required_environments: vec![Environment::Dev],
                gateway_domain: "kafka.test".into(),
            },
        );
        let app = seed_app(&store, ProvisioningStatus::InProgress).await;
        let err = tracker
            .report_environment_result(app.id, Environment::Prod, report(EnvironmentOutcome::Success))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_with_issues_filters_by_status() {
        let f = fixture(RecordingWorkflowRunner::new()).await;
        let failed = seed_app(&f.store, ProvisioningStatus::Failed).await;
        let mut done = Application::new(failed.workspace_id, "Done".into(), "done".into());
        done.provisioning_status = ProvisioningStatus::Completed;
        ApplicationRepository::insert(f.store.as_ref(), &done)
            .await
            .unwrap();

        let all = f.tracker.list_with_issues(IssueFilter::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, failed.id);

        let partial = f.tracker.list_with_issues(IssueFilter::Partial).await.unwrap();
        assert!(partial.is_empty());
    }
}
