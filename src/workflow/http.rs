use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ProvisioningRequest, WorkflowRunner};
use crate::config::WorkflowConfig;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    workflow_id: Option<String>,
}

/// Failure of one HTTP attempt, split by whether another attempt may help.
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Permanent(String),
}

impl AttemptError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            AttemptError::Transient(err.to_string())
        } else {
            AttemptError::Permanent(err.to_string())
        }
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        let message = format!(
            "HTTP {} - {}",
            status,
            body.chars().take(200).collect::<String>()
        );
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            AttemptError::Transient(message)
        } else {
            AttemptError::Permanent(message)
        }
    }

    fn is_transient(&self) -> bool {
        matches!(self, AttemptError::Transient(_))
    }

    fn into_app_error(self, action: &str) -> AppError {
        match self {
            AttemptError::Transient(m) | AttemptError::Permanent(m) => {
                AppError::UpstreamFailure(format!("{} failed: {}", action, m))
            }
        }
    }
}

/// `WorkflowRunner` over the runner's HTTP API, retrying transient failures
/// with exponential backoff.
pub struct HttpWorkflowRunner {
    client: Client,
    base_url: String,
    max_retries: usize,
}

impl HttpWorkflowRunner {
    pub fn new(config: &WorkflowConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(AppError::Configuration(
                "workflow.base_url is not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(self.max_retries)
            .with_jitter()
    }

    async fn post_start(
        &self,
        request: &ProvisioningRequest,
    ) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(format!("{}/workflows/provisioning", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        // The runner answers 409 when a run with this id is already in flight.
        if status == StatusCode::CONFLICT {
            debug!(workflow_id = %request.workflow_id, "Provisioning workflow already running");
            return Ok(request.workflow_id.clone());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::from_status(status, body));
        }

        let body: StartResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Permanent(format!("invalid response body: {}", e)))?;
        Ok(body
            .workflow_id
            .unwrap_or_else(|| request.workflow_id.clone()))
    }

    async fn post_cancel(&self, workflow_id: &str) -> std::result::Result<(), AttemptError> {
        let response = self
            .client
            .post(format!("{}/workflows/{}/cancel", self.base_url, workflow_id))
            .send()
            .await
            .map_err(AttemptError::from_reqwest)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AttemptError::from_status(status, body))
    }
}

#[async_trait]
impl WorkflowRunner for HttpWorkflowRunner {
    async fn start_provisioning(&self, request: &ProvisioningRequest) -> Result<String> {
        (|| async { self.post_start(request).await })
            .retry(self.backoff())
            .when(AttemptError::is_transient)
            .notify(|err, delay| {
                warn!(
                    workflow_id = %request.workflow_id,
                    error = ?err,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying provisioning trigger"
                );
            })
            .await
            .map_err(|e| e.into_app_error("Provisioning trigger"))
    }

    async fn cancel_workflow(&self, workflow_id: &str) -> Result<()> {
        (|| async { self.post_cancel(workflow_id).await })
            .retry(self.backoff())
            .when(AttemptError::is_transient)
            .await
            .map_err(|e| e.into_app_error("Workflow cancellation"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> WorkflowConfig {
        WorkflowConfig {
            base_url: base_url.to_string(),
            timeout_seconds: 1,
            max_retries: 0,
        }
    }

    #[test]
    fn test_empty_base_url_is_configuration_error() {
        let result = HttpWorkflowRunner::new(&config("  "));
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(AttemptError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new())
            .is_transient());
        assert!(AttemptError::from_status(StatusCode::TOO_MANY_REQUESTS, String::new())
            .is_transient());
        assert!(!AttemptError::from_status(StatusCode::BAD_REQUEST, String::new())
            .is_transient());
        assert!(!AttemptError::from_status(StatusCode::UNAUTHORIZED, String::new())
            .is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_runner_is_upstream_failure() {
        // Nothing listens on the discard port
        let runner = HttpWorkflowRunner::new(&config("http://127.0.0.1:9")).unwrap();
        let request = ProvisioningRequest {
            workflow_id: "kafka-provision-test".into(),
            application_id: uuid::Uuid::new_v4(),
            application_slug: "orders".into(),
            workspace_id: uuid::Uuid::new_v4(),
            workspace_slug: "retail".into(),
        };
        let err = runner.start_provisioning(&request).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamFailure(_)));
    }
}
