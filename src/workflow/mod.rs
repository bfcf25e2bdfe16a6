// Outbound client to the external provisioning workflow runner

pub mod http;
pub mod recording;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::Result;

pub use http::HttpWorkflowRunner;
pub use recording::RecordingWorkflowRunner;

/// Payload of a provisioning trigger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    /// Deterministic per application, so a repeated trigger targets the same run.
    pub workflow_id: String,
    pub application_id: Uuid,
    pub application_slug: String,
    pub workspace_id: Uuid,
    pub workspace_slug: String,
}

/// The runner that performs multi-step provisioning against the cluster API.
///
/// Failures come back as `AppError::UpstreamFailure`; callers record them on
/// the application rather than propagating them.
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    /// Start (or re-attach to) the provisioning workflow, returning its id.
    async fn start_provisioning(&self, request: &ProvisioningRequest) -> Result<String>;

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()>;
}
