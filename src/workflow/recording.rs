// In-process runner that records calls; backs service and HTTP tests

use async_trait::async_trait;
use std::sync::Mutex;

use super::{ProvisioningRequest, WorkflowRunner};
use crate::errors::{AppError, Result};

#[derive(Default)]
pub struct RecordingWorkflowRunner {
    started: Mutex<Vec<ProvisioningRequest>>,
    cancelled: Mutex<Vec<String>>,
    failure: Mutex<Option<String>>,
}

impl RecordingWorkflowRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose triggers fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        let runner = Self::default();
        runner.fail_with(Some(message.into()));
        runner
    }

    pub fn fail_with(&self, message: Option<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = message;
        }
    }

    pub fn started(&self) -> Vec<ProvisioningRequest> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl WorkflowRunner for RecordingWorkflowRunner {
    async fn start_provisioning(&self, request: &ProvisioningRequest) -> Result<String> {
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Ok(mut started) = self.started.lock() {
            started.push(request.clone());
        }
        match failure {
            Some(message) => Err(AppError::UpstreamFailure(message)),
            None => Ok(request.workflow_id.clone()),
        }
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        if let Ok(mut cancelled) = self.cancelled.lock() {
            cancelled.push(workflow_id.to_string());
        }
        Ok(())
    }
}
