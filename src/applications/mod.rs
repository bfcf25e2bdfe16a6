// Application creation and decommissioning

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::approval::ApprovalService;
use crate::db::repository::{ApplicationFilter, Repositories, VirtualClusterFilter};
use crate::domain::{
    validate_slug, AccessScope, Application, ApplicationRequest, ApplicationStatus,
    ProvisioningStatus, VirtualClusterStatus,
};
use crate::errors::{AppError, Result};
use crate::provisioning::ProvisioningTracker;
use crate::quota::QuotaEvaluator;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewApplication {
    pub name: String,
    pub slug: String,
}

impl NewApplication {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Application name is required".to_string()));
        }
        validate_slug(&self.slug)
    }
}

/// Either the application was created, or quota sent it to approval.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum CreateOutcome {
    Created(Application),
    PendingApproval(ApplicationRequest),
}

pub struct ApplicationService {
    repos: Repositories,
    quota: Arc<QuotaEvaluator>,
    tracker: Arc<ProvisioningTracker>,
    approvals: Arc<ApprovalService>,
}

impl ApplicationService {
    pub fn new(
        repos: Repositories,
        quota: Arc<QuotaEvaluator>,
        tracker: Arc<ProvisioningTracker>,
        approvals: Arc<ApprovalService>,
    ) -> Self {
        Self {
            repos,
            quota,
            tracker,
            approvals,
        }
    }

    /// Create within quota and start provisioning, or file an approval
    /// request when the workspace is full.
    #[tracing::instrument(skip(self, scope, input), fields(slug = %input.slug))]
    pub async fn create(
        &self,
        scope: &AccessScope,
        workspace_id: Uuid,
        input: NewApplication,
    ) -> Result<CreateOutcome> {
        input.validate()?;
        if !scope.can_view(workspace_id) {
            return Err(AppError::not_found("Workspace"));
        }
        ensure_slug_free(&self.repos, &input.slug).await?;

        let decision = self.quota.evaluate(workspace_id, 1).await?;
        if !decision.allowed {
            tracing::info!(
                workspace_id = %workspace_id,
                used = decision.used,
                quota = decision.quota,
                "Quota exceeded, filing approval request"
            );
            let request = self
                .approvals
                .submit(workspace_id, input.name, input.slug, scope.user_id.clone())
                .await?;
            return Ok(CreateOutcome::PendingApproval(request));
        }

        let application = insert_application(&self.repos, workspace_id, input.name, input.slug).await?;
        Ok(CreateOutcome::Created(
            start_first_run(&self.tracker, application).await,
        ))
    }

    /// Start teardown: lifecycle `decommissioning`, every virtual cluster
    /// `deleting`, and any in-flight workflow cancelled. The runner finishes
    /// by patching the application to `deleted`.
    #[tracing::instrument(skip(self, scope))]
    pub async fn decommission(&self, scope: &AccessScope, application_id: Uuid) -> Result<Application> {
        let application = self
            .repos
            .applications
            .find_by_id(application_id)
            .await?
            .filter(|a| scope.can_view(a.workspace_id))
            .ok_or_else(|| AppError::not_found("Application"))?;

        if !scope.is_workspace_admin(application.workspace_id) {
            return Err(AppError::Forbidden(
                "Only workspace admins may decommission applications".to_string(),
            ));
        }

        let mut was_running = false;
        let application = self
            .repos
            .modify_application(application.id, |application, _| {
                if application.status != ApplicationStatus::Active {
                    return Err(AppError::InvalidState(format!(
                        "Application {} is already {}",
                        application.id,
                        application.status.as_str()
                    )));
                }
                was_running = application.provisioning_status == ProvisioningStatus::InProgress;
                application.status = ApplicationStatus::Decommissioning;
                Ok(true)
            })
            .await?;
        let now = application.updated_at;

        let clusters = self
            .repos
            .virtual_clusters
            .find_by_filter(&VirtualClusterFilter {
                application_id: Some(application.id),
                ..Default::default()
            })
            .await?;
        for mut cluster in clusters {
            if cluster.status == VirtualClusterStatus::Deleting {
                continue;
            }
            cluster.status = VirtualClusterStatus::Deleting;
            cluster.updated_at = now;
            self.repos.virtual_clusters.update(&cluster).await?;
        }

        if was_running {
            let workflow_id = application
                .provisioning_workflow_id
                .clone()
                .unwrap_or_else(|| Application::provisioning_workflow_id(application.id));
            if let Err(err) = self.tracker.runner().cancel_workflow(&workflow_id).await {
                tracing::warn!(
                    application_id = %application.id,
                    workflow_id = %workflow_id,
                    error = %err,
                    "Could not cancel provisioning workflow"
                );
            }
        }

        tracing::info!(application_id = %application.id, "Application decommissioning");
        Ok(application)
    }
}

pub(crate) async fn ensure_slug_free(repos: &Repositories, slug: &str) -> Result<()> {
    let existing = repos
        .applications
        .find_by_filter(&ApplicationFilter {
            slug: Some(slug.to_string()),
            ..Default::default()
        })
        .await?;
    if !existing.is_empty() {
        return Err(AppError::InvalidState(format!(
            "An application with slug '{}' already exists",
            slug
        )));
    }
    Ok(())
}

/// Insert a new active application with provisioning still `pending`.
pub(crate) async fn insert_application(
    repos: &Repositories,
    workspace_id: Uuid,
    name: String,
    slug: String,
) -> Result<Application> {
    let application = Application::new(workspace_id, name, slug);
    repos.applications.insert(&application).await?;
    tracing::info!(
        application_id = %application.id,
        workspace_id = %workspace_id,
        slug = %application.slug,
        "Application created"
    );
    Ok(application)
}

/// Trigger the first provisioning run of a freshly inserted application.
/// The application stands either way; when the trigger itself errors it
/// stays `pending` and can be triggered again.
pub(crate) async fn start_first_run(tracker: &ProvisioningTracker, application: Application) -> Application {
    match tracker.trigger(application.id).await {
        Ok(started) => started,
        Err(err) => {
            tracing::warn!(
                application_id = %application.id,
                error = %err,
                "Could not start provisioning for new application"
            );
            application
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApprovalConfig, ProvisioningConfig, QuotaConfig};
    use crate::db::MemoryStore;
    use crate::domain::{Environment, RequestStatus, VirtualCluster, Workspace};
    use crate::workflow::RecordingWorkflowRunner;

    struct Fixture {
        store: Arc<MemoryStore>,
        runner: Arc<RecordingWorkflowRunner>,
        service: ApplicationService,
        workspace_id: Uuid,
    }

    async fn fixture(quota: u32) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let workspace_id = Uuid::new_v4();
        store
            .put_workspace(Workspace {
                id: workspace_id,
                name: "Retail".into(),
                slug: "retail".into(),
                application_quota: Some(quota),
            })
            .await;

        let repos = Repositories::from_store(store.clone());
        let runner = Arc::new(RecordingWorkflowRunner::new());
        let quota_config = QuotaConfig {
            default_application_quota: 5,
            admin_ceiling: None,
        };
        let quota = Arc::new(QuotaEvaluator::new(&repos, &quota_config));
        let tracker = Arc::new(ProvisioningTracker::new(
            repos.clone(),
            runner.clone(),
            &ProvisioningConfig {
                required_environments: Environment::ALL.to_vec(),
                gateway_domain: "kafka.test".into(),
            },
        ));
        let approvals = Arc::new(ApprovalService::new(
            repos.clone(),
            quota.clone(),
            tracker.clone(),
            &quota_config,
            &ApprovalConfig {
                rejected_retention_days: 30,
            },
        ));
        Fixture {
            service: ApplicationService::new(repos, quota, tracker, approvals),
            store,
            runner,
            workspace_id,
        }
    }

    fn input(slug: &str) -> NewApplication {
        NewApplication {
            name: slug.to_uppercase(),
            slug: slug.into(),
        }
    }

    #[tokio::test]
    async fn test_create_within_quota_triggers_provisioning() {
        let f = fixture(2).await;
        let scope = AccessScope::member_of("dev", [f.workspace_id]);

        let outcome = f.service.create(&scope, f.workspace_id, input("orders")).await.unwrap();
        let CreateOutcome::Created(app) = outcome else {
            panic!("expected a created application");
        };
        assert_eq!(app.provisioning_status, ProvisioningStatus::InProgress);
        assert_eq!(f.runner.started().len(), 1);
    }

    #[tokio::test]
    async fn test_create_over_quota_files_request() {
        let f = fixture(1).await;
        let scope = AccessScope::member_of("dev", [f.workspace_id]);
        f.service.create(&scope, f.workspace_id, input("orders")).await.unwrap();

        let outcome = f.service.create(&scope, f.workspace_id, input("billing")).await.unwrap();
        let CreateOutcome::PendingApproval(request) = outcome else {
            panic!("expected an approval request");
        };
        assert_eq!(request.status, RequestStatus::PendingWorkspace);
        assert_eq!(request.requested_by, "dev");
        assert_eq!(f.runner.started().len(), 1);
    }

    #[tokio::test]
    async fn test_slug_must_be_unique_and_dns_safe() {
        let f = fixture(5).await;
        let scope = AccessScope::member_of("dev", [f.workspace_id]);
        f.service.create(&scope, f.workspace_id, input("orders")).await.unwrap();

        let err = f
            .service
            .create(&scope, f.workspace_id, input("orders"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let err = f
            .service
            .create(&scope, f.workspace_id, input("Bad_Slug"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_decommission_marks_clusters_and_cancels_workflow() {
        let f = fixture(5).await;
        let admin = AccessScope::member_of("lead", []).with_admin_of(f.workspace_id);
        let CreateOutcome::Created(app) =
            f.service.create(&admin, f.workspace_id, input("orders")).await.unwrap()
        else {
            panic!("expected a created application");
        };
        let cluster = VirtualCluster::new(app.id, Environment::Dev, VirtualClusterStatus::Active);
        crate::db::repository::VirtualClusterRepository::insert(f.store.as_ref(), &cluster)
            .await
            .unwrap();

        let app = f.service.decommission(&admin, app.id).await.unwrap();
        assert_eq!(app.status, ApplicationStatus::Decommissioning);
        assert_eq!(f.runner.cancelled(), vec![Application::provisioning_workflow_id(app.id)]);

        let stored = crate::db::repository::VirtualClusterRepository::find_by_id(
            f.store.as_ref(),
            cluster.id,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stored.status, VirtualClusterStatus::Deleting);

        let err = f.service.decommission(&admin, app.id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_decommission_requires_workspace_admin() {
        let f = fixture(5).await;
        let member = AccessScope::member_of("dev", [f.workspace_id]);
        let CreateOutcome::Created(app) =
            f.service.create(&member, f.workspace_id, input("orders")).await.unwrap()
        else {
            panic!("expected a created application");
        };
        let err = f.service.decommission(&member, app.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
