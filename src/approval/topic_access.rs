// Single-stage topic access requests with per-workspace auto-approval

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::requests::{require_reason, require_workspace_admin, ApprovalService, Rejection};
use crate::db::repository::AccessRequestFilter;
use crate::domain::{
    AccessLevel, AccessScope, AutoApprovePolicy, RequestStatus, TopicAccessRequest,
};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTopicAccessRequest {
    pub topic_id: Uuid,
    pub application_id: Uuid,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccessRequestQuery {
    pub topic_id: Option<Uuid>,
    pub application_id: Option<Uuid>,
    pub workspace_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
}

impl ApprovalService {
    /// File an access request for another workspace's topic. The owning
    /// workspace's auto-approve policy is evaluated here, once, and the
    /// outcome is recorded on the request.
    #[tracing::instrument(skip(self, scope, input), fields(user_id = %scope.user_id))]
    pub async fn request_topic_access(
        &self,
        scope: &AccessScope,
        input: NewTopicAccessRequest,
    ) -> Result<TopicAccessRequest> {
        let application = self
            .repos
            .applications
            .find_by_id(input.application_id)
            .await?
            .filter(|a| scope.can_view(a.workspace_id))
            .ok_or_else(|| AppError::not_found("Application"))?;
        let topic = self
            .repos
            .topics
            .find_by_id(input.topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic"))?;
        if topic.workspace_id == application.workspace_id {
            return Err(AppError::Validation(
                "Application already belongs to the topic's workspace".to_string(),
            ));
        }

        let auto_approved = self
            .repos
            .policies
            .find_by_workspace(topic.workspace_id)
            .await?
            .map_or(false, |policy| policy.allows(input.access_level));

        let now = Utc::now();
        let request = TopicAccessRequest {
            id: Uuid::new_v4(),
            topic_id: topic.id,
            topic_workspace_id: topic.workspace_id,
            application_id: application.id,
            requesting_workspace_id: application.workspace_id,
            access_level: input.access_level,
            requested_by: scope.user_id.clone(),
            status: if auto_approved {
                RequestStatus::Approved
            } else {
                RequestStatus::PendingWorkspace
            },
            auto_approved,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
            decided_at: auto_approved.then_some(now),
        };
        self.repos.access_requests.insert(&request).await?;

        MetricsRecorder::record_approval_transition("topic_access", request.status.as_str());
        tracing::info!(
            request_id = %request.id,
            topic_id = %topic.id,
            access_level = request.access_level.as_str(),
            auto_approved,
            "Topic access requested"
        );
        Ok(request)
    }

    /// Approve a pending access request; needs an admin of the topic's workspace.
    #[tracing::instrument(skip(self, scope), fields(user_id = %scope.user_id))]
    pub async fn approve_topic_access(
        &self,
        scope: &AccessScope,
        request_id: Uuid,
    ) -> Result<TopicAccessRequest> {
        self.decide_topic_access(scope, request_id, None).await
    }

    #[tracing::instrument(skip(self, scope, rejection), fields(user_id = %scope.user_id))]
    pub async fn reject_topic_access(
        &self,
        scope: &AccessScope,
        request_id: Uuid,
        rejection: Rejection,
    ) -> Result<TopicAccessRequest> {
        let reason = require_reason(rejection)?;
        self.decide_topic_access(scope, request_id, Some(reason)).await
    }

    #[tracing::instrument(skip(self, scope))]
    pub async fn list_topic_access(
        &self,
        scope: &AccessScope,
        query: AccessRequestQuery,
    ) -> Result<Vec<TopicAccessRequest>> {
        let now = Utc::now();
        let requests = self
            .repos
            .access_requests
            .find_by_filter(&AccessRequestFilter {
                topic_id: query.topic_id,
                application_id: query.application_id,
                workspace_id: query.workspace_id,
                status: query.status,
            })
            .await?;
        Ok(requests
            .into_iter()
            .filter(|r| scope.can_view(r.requesting_workspace_id) || scope.can_view(r.topic_workspace_id))
            .filter(|r| r.is_visible(now, self.retention_days))
            .collect())
    }

    /// Replace a workspace's auto-approve policy.
    #[tracing::instrument(skip(self, policy), fields(workspace_id = %policy.workspace_id))]
    pub async fn set_auto_approve_policy(&self, policy: AutoApprovePolicy) -> Result<AutoApprovePolicy> {
        self.repos
            .workspaces
            .find_by_id(policy.workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace"))?;
        self.repos.policies.upsert(&policy).await?;
        tracing::info!(enabled = policy.enabled, "Auto-approve policy updated");
        Ok(policy)
    }

    async fn decide_topic_access(
        &self,
        scope: &AccessScope,
        request_id: Uuid,
        rejection_reason: Option<String>,
    ) -> Result<TopicAccessRequest> {
        let mut request = self
            .repos
            .access_requests
            .find_by_id(request_id)
            .await?
            .filter(|r| scope.can_view(r.requesting_workspace_id) || scope.can_view(r.topic_workspace_id))
            .ok_or_else(|| AppError::not_found("Topic access request"))?;

        let expected = request.status;
        if !expected.is_pending() {
            return Err(AppError::InvalidState(format!(
                "Access request {} is already {}",
                request.id, request.status
            )));
        }
        require_workspace_admin(scope, request.topic_workspace_id)?;

        let now = Utc::now();
        request.status = if rejection_reason.is_some() {
            RequestStatus::Rejected
        } else {
            RequestStatus::Approved
        };
        request.rejection_reason = rejection_reason;
        request.decided_at = Some(now);
        request.updated_at = now;
        self.repos.access_requests.update(&request, expected).await?;

        MetricsRecorder::record_approval_transition("topic_access", request.status.as_str());
        tracing::info!(
            request_id = %request.id,
            status = %request.status,
            decided_by = %scope.user_id,
            "Topic access request decided"
        );
        Ok(request)
    }
}
