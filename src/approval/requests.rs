// Two-stage application request workflow

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::applications::{ensure_slug_free, insert_application, start_first_run};
use crate::config::{ApprovalConfig, QuotaConfig};
use crate::db::repository::{Repositories, RequestFilter};
use crate::domain::{validate_slug, AccessScope, ApplicationRequest, RequestStatus};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;
use crate::provisioning::ProvisioningTracker;
use crate::quota::QuotaEvaluator;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RequestQuery {
    pub workspace_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rejection {
    pub reason: String,
}

/// Decides application requests and topic-access requests.
pub struct ApprovalService {
    pub(super) repos: Repositories,
    quota: Arc<QuotaEvaluator>,
    tracker: Arc<ProvisioningTracker>,
    admin_ceiling: Option<u32>,
    pub(super) retention_days: i64,
}

impl ApprovalService {
    pub fn new(
        repos: Repositories,
        quota: Arc<QuotaEvaluator>,
        tracker: Arc<ProvisioningTracker>,
        quota_config: &QuotaConfig,
        config: &ApprovalConfig,
    ) -> Self {
        Self {
            repos,
            quota,
            tracker,
            admin_ceiling: quota_config.admin_ceiling,
            retention_days: config.rejected_retention_days,
        }
    }

    /// File a request in `pending_workspace`. A pending request for the same
    /// (workspace, name) already existing is `InvalidState`.
    #[tracing::instrument(skip(self))]
    pub async fn submit(
        &self,
        workspace_id: Uuid,
        name: String,
        slug: String,
        requested_by: String,
    ) -> Result<ApplicationRequest> {
        validate_slug(&slug)?;
        let request = ApplicationRequest::new(workspace_id, name, slug, requested_by);
        self.repos.requests.insert(&request).await?;
        MetricsRecorder::record_approval_transition("application", request.status.as_str());
        tracing::info!(request_id = %request.id, workspace_id = %workspace_id, "Application request filed");
        Ok(request)
    }

    /// Advance one stage. The workspace stage needs an admin of the
    /// requesting workspace, the platform stage a platform admin. The
    /// platform stage creates the application and triggers provisioning.
    #[tracing::instrument(skip(self, scope), fields(user_id = %scope.user_id))]
    pub async fn approve(&self, scope: &AccessScope, request_id: Uuid) -> Result<ApplicationRequest> {
        let mut request = self.load_visible(scope, request_id).await?;
        let expected = request.status;
        let now = Utc::now();

        match expected {
            RequestStatus::PendingWorkspace => {
                require_workspace_admin(scope, request.workspace_id)?;
                request.status = RequestStatus::PendingPlatform;
                request.updated_at = now;
                self.repos.requests.update(&request, expected).await?;
            }
            RequestStatus::PendingPlatform => {
                require_platform_admin(scope)?;
                if let Some(ceiling) = self.admin_ceiling {
                    let decision = self
                        .quota
                        .evaluate_against(request.workspace_id, 1, ceiling)
                        .await?;
                    if !decision.allowed {
                        return Err(AppError::InvalidState(format!(
                            "Workspace already has {} applications, administrative ceiling is {}",
                            decision.used, decision.quota
                        )));
                    }
                }
                ensure_slug_free(&self.repos, &request.slug).await?;

                request.status = RequestStatus::Approved;
                request.decided_at = Some(now);
                request.updated_at = now;
                self.repos.requests.update(&request, expected).await?;

                let inserted = insert_application(
                    &self.repos,
                    request.workspace_id,
                    request.name.clone(),
                    request.slug.clone(),
                )
                .await;
                let application = match inserted {
                    Ok(application) => application,
                    Err(err) => {
                        // Nothing was created; put the request back so it can be approved again
                        request.status = RequestStatus::PendingPlatform;
                        request.decided_at = None;
                        request.updated_at = Utc::now();
                        self.repos
                            .requests
                            .update(&request, RequestStatus::Approved)
                            .await?;
                        return Err(err);
                    }
                };

                request.application_id = Some(application.id);
                request.updated_at = Utc::now();
                self.repos
                    .requests
                    .update(&request, RequestStatus::Approved)
                    .await?;
                start_first_run(&self.tracker, application).await;
            }
            RequestStatus::Approved | RequestStatus::Rejected => {
                return Err(AppError::InvalidState(format!(
                    "Request {} is already {}",
                    request.id, request.status
                )));
            }
        }

        MetricsRecorder::record_approval_transition("application", request.status.as_str());
        tracing::info!(
            request_id = %request.id,
            status = %request.status,
            decided_by = %scope.user_id,
            "Application request approved"
        );
        Ok(request)
    }

    /// Reject from either pending stage; the reason is required.
    #[tracing::instrument(skip(self, scope, rejection), fields(user_id = %scope.user_id))]
    pub async fn reject(
        &self,
        scope: &AccessScope,
        request_id: Uuid,
        rejection: Rejection,
    ) -> Result<ApplicationRequest> {
        let reason = require_reason(rejection)?;
        let mut request = self.load_visible(scope, request_id).await?;
        let expected = request.status;

        match expected {
            RequestStatus::PendingWorkspace => require_workspace_admin(scope, request.workspace_id)?,
            RequestStatus::PendingPlatform => require_platform_admin(scope)?,
            _ => {
                return Err(AppError::InvalidState(format!(
                    "Request {} is already {}",
                    request.id, request.status
                )))
            }
        }

        let now = Utc::now();
        request.status = RequestStatus::Rejected;
        request.rejection_reason = Some(reason);
        request.decided_at = Some(now);
        request.updated_at = now;
        self.repos.requests.update(&request, expected).await?;

        MetricsRecorder::record_approval_transition("application", request.status.as_str());
        tracing::info!(request_id = %request.id, decided_by = %scope.user_id, "Application request rejected");
        Ok(request)
    }

    /// Delete a still-pending request. Decided requests stay for audit.
    #[tracing::instrument(skip(self, scope), fields(user_id = %scope.user_id))]
    pub async fn withdraw(&self, scope: &AccessScope, request_id: Uuid) -> Result<()> {
        let request = self.load_visible(scope, request_id).await?;
        if !request.status.is_pending() {
            return Err(AppError::InvalidState(format!(
                "Request {} is {} and cannot be deleted",
                request.id, request.status
            )));
        }
        if !self.repos.requests.delete(request.id).await? {
            return Err(AppError::not_found("Application request"));
        }
        MetricsRecorder::record_approval_transition("application", "withdrawn");
        tracing::info!(request_id = %request.id, "Application request withdrawn");
        Ok(())
    }

    /// Requests in the caller's workspaces, newest first, without rejected
    /// requests past the retention window.
    #[tracing::instrument(skip(self, scope))]
    pub async fn list(&self, scope: &AccessScope, query: RequestQuery) -> Result<Vec<ApplicationRequest>> {
        let now = Utc::now();
        let requests = self
            .repos
            .requests
            .find_by_filter(&RequestFilter {
                workspace_id: query.workspace_id,
                status: query.status,
                name: None,
            })
            .await?;
        Ok(requests
            .into_iter()
            .filter(|r| scope.can_view(r.workspace_id))
            .filter(|r| r.is_visible(now, self.retention_days))
            .collect())
    }

    async fn load_visible(&self, scope: &AccessScope, request_id: Uuid) -> Result<ApplicationRequest> {
        self.repos
            .requests
            .find_by_id(request_id)
            .await?
            .filter(|r| scope.can_view(r.workspace_id))
            .ok_or_else(|| AppError::not_found("Application request"))
    }
}

pub(super) fn require_workspace_admin(scope: &AccessScope, workspace_id: Uuid) -> Result<()> {
    if scope.is_workspace_admin(workspace_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Workspace admin role required for this decision".to_string(),
        ))
    }
}

fn require_platform_admin(scope: &AccessScope) -> Result<()> {
    if scope.platform_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Platform admin role required for this decision".to_string(),
        ))
    }
}

pub(super) fn require_reason(rejection: Rejection) -> Result<String> {
    let reason = rejection.reason.trim();
    if reason.is_empty() {
        return Err(AppError::Validation("A rejection reason is required".to_string()));
    }
    Ok(reason.to_string())
}
