// Quota Evaluator: may a workspace create more applications right now?

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::db::repository::{ApplicationRepository, Repositories, WorkspaceRepository};
use crate::errors::{AppError, Result};
use crate::observability::MetricsRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    pub allowed: bool,
    pub used: u64,
    pub quota: u64,
}

impl QuotaDecision {
    fn new(used: u64, quota: u64, requested: u32) -> Self {
        Self {
            allowed: used.saturating_add(requested as u64) <= quota,
            used,
            quota,
        }
    }
}

pub struct QuotaEvaluator {
    workspaces: Arc<dyn WorkspaceRepository>,
    applications: Arc<dyn ApplicationRepository>,
    default_quota: u32,
}

impl QuotaEvaluator {
    pub fn new(repos: &Repositories, config: &QuotaConfig) -> Self {
        Self {
            workspaces: repos.workspaces.clone(),
            applications: repos.applications.clone(),
            default_quota: config.default_application_quota,
        }
    }

    /// Compare active applications plus `requested` against the workspace quota.
    #[tracing::instrument(skip(self))]
    pub async fn evaluate(&self, workspace_id: Uuid, requested: u32) -> Result<QuotaDecision> {
        let quota = self.workspace_quota(workspace_id).await?;
        self.decide(workspace_id, requested, quota).await
    }

    /// Same check against an explicit ceiling instead of the workspace quota.
    #[tracing::instrument(skip(self))]
    pub async fn evaluate_against(
        &self,
        workspace_id: Uuid,
        requested: u32,
        ceiling: u32,
    ) -> Result<QuotaDecision> {
        self.workspace_quota(workspace_id).await?;
        self.decide(workspace_id, requested, ceiling).await
    }

    async fn workspace_quota(&self, workspace_id: Uuid) -> Result<u32> {
        let workspace = self
            .workspaces
            .find_by_id(workspace_id)
            .await?
            .ok_or_else(|| AppError::not_found("Workspace"))?;
        Ok(workspace.application_quota.unwrap_or(self.default_quota))
    }

    async fn decide(&self, workspace_id: Uuid, requested: u32, quota: u32) -> Result<QuotaDecision> {
        if requested == 0 {
            return Err(AppError::Validation(
                "Requested application count must be at least 1".to_string(),
            ));
        }

        let used = self.applications.count_active(workspace_id).await?;
        let decision = QuotaDecision::new(used, quota as u64, requested);

        MetricsRecorder::record_quota_decision(decision.allowed);
        tracing::debug!(
            workspace_id = %workspace_id,
            used = decision.used,
            quota = decision.quota,
            allowed = decision.allowed,
            "Quota evaluated"
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::domain::{Application, ApplicationStatus, Workspace};

    async fn setup(quota: Option<u32>, active: usize) -> (QuotaEvaluator, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let workspace = Workspace {
            id: Uuid::new_v4(),
            name: "Retail".into(),
            slug: "retail".into(),
            application_quota: quota,
        };
        store.put_workspace(workspace.clone()).await;
        for i in 0..active {
            let app = Application::new(workspace.id, format!("App {}", i), format!("app-{}", i));
            ApplicationRepository::insert(store.as_ref(), &app)
                .await
                .unwrap();
        }
        let repos = Repositories::from_store(store.clone());
        let evaluator = QuotaEvaluator::new(
            &repos,
            &QuotaConfig {
                default_application_quota: 5,
                admin_ceiling: None,
            },
        );
        (evaluator, store, workspace.id)
    }

    #[tokio::test]
    async fn test_quota_boundary_at_limit_is_denied() {
        let (evaluator, _, ws) = setup(Some(3), 3).await;
        let decision = evaluator.evaluate(ws, 1).await.unwrap();
        assert_eq!(
            decision,
            QuotaDecision {
                allowed: false,
                used: 3,
                quota: 3
            }
        );
    }

    #[tokio::test]
    async fn test_quota_boundary_below_limit_is_allowed() {
        let (evaluator, _, ws) = setup(Some(3), 2).await;
        let decision = evaluator.evaluate(ws, 1).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.used, 2);
    }

    #[tokio::test]
    async fn test_default_quota_applies_without_override() {
        let (evaluator, _, ws) = setup(None, 4).await;
        let decision = evaluator.evaluate(ws, 1).await.unwrap();
        assert_eq!(decision.quota, 5);
        assert!(decision.allowed);
        assert!(!evaluator.evaluate(ws, 2).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_only_active_applications_count() {
        let (evaluator, store, ws) = setup(Some(1), 0).await;
        let mut app = Application::new(ws, "Old".into(), "old".into());
        app.status = ApplicationStatus::Deleted;
        ApplicationRepository::insert(store.as_ref(), &app)
            .await
            .unwrap();

        let decision = evaluator.evaluate(ws, 1).await.unwrap();
        assert_eq!(decision.used, 0);
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_unknown_workspace_is_not_found() {
        let (evaluator, _, _) = setup(None, 0).await;
        let err = evaluator.evaluate(Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_zero_count_is_validation_error() {
        let (evaluator, _, ws) = setup(None, 0).await;
        let err = evaluator.evaluate(ws, 0).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_admin_ceiling_overrides_workspace_quota() {
        let (evaluator, _, ws) = setup(Some(2), 2).await;
        assert!(!evaluator.evaluate(ws, 1).await.unwrap().allowed);
        assert!(evaluator.evaluate_against(ws, 1, 10).await.unwrap().allowed);
    }
}
