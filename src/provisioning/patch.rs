// Inbound payloads from the workflow runner

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::domain::{
    Application, ApplicationStatus, EnvironmentDetail, EnvironmentOutcome, ProvisioningDetails,
    ProvisioningStatus,
};
use crate::errors::{AppError, Result};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Body of `PATCH /internal/applications/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ApplicationPatch {
    pub provisioning_status: Option<ProvisioningStatus>,
    #[serde(default, deserialize_with = "double_option")]
    pub provisioning_error: Option<Option<String>>,
    pub provisioning_details: Option<ProvisioningDetails>,
    #[serde(default, deserialize_with = "double_option")]
    pub provisioning_workflow_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub provisioning_completed_at: Option<Option<DateTime<Utc>>>,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationPatch {
    pub fn is_empty(&self) -> bool {
        self.provisioning_status.is_none()
            && self.provisioning_error.is_none()
            && self.provisioning_details.is_none()
            && self.provisioning_workflow_id.is_none()
            && self.provisioning_completed_at.is_none()
            && self.status.is_none()
    }

    /// Apply to `application`, rejecting a terminal status that contradicts
    /// the resulting environment details.
    pub fn apply_to(&self, application: &mut Application, now: DateTime<Utc>) -> Result<()> {
        if let Some(details) = &self.provisioning_details {
            application.provisioning_details = details.clone();
        }
        if let Some(error) = &self.provisioning_error {
            application.provisioning_error = error.clone();
        }
        if let Some(workflow_id) = &self.provisioning_workflow_id {
            application.provisioning_workflow_id = workflow_id.clone();
        }
        if let Some(status) = self.provisioning_status {
            application.provisioning_status = status;
            if status.is_terminal() && self.provisioning_completed_at.is_none() {
                application.provisioning_completed_at = Some(now);
            }
        }
        if let Some(completed_at) = self.provisioning_completed_at {
            application.provisioning_completed_at = completed_at;
        }
        if let Some(status) = self.status {
            application.status = status;
        }

        if !application
            .provisioning_status
            .consistent_with(&application.provisioning_details)
        {
            return Err(AppError::Validation(format!(
                "Provisioning status '{}' contradicts the environment details",
                application.provisioning_status
            )));
        }

        application.updated_at = now;
        Ok(())
    }
}

/// Body of `POST /internal/applications/{id}/environments/{env}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvironmentReport {
    pub status: EnvironmentOutcome,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub advertised_host: Option<String>,
    #[serde(default)]
    pub topic_prefix: Option<String>,
}

impl EnvironmentReport {
    pub fn detail(&self) -> EnvironmentDetail {
        EnvironmentDetail {
            status: self.status,
            error: self.error.clone(),
            message: self.message.clone(),
        }
    }
}
