// Application, virtual cluster and provisioning state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

// ============================================================================
// Environment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stage,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Environment::Dev, Environment::Stage, Environment::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "stage" => Ok(Environment::Stage),
            "prod" => Ok(Environment::Prod),
            other => Err(AppError::Validation(format!("Unknown environment '{}'", other))),
        }
    }
}

// ============================================================================
// Application
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Active,
    Decommissioning,
    Deleted,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Active => "active",
            ApplicationStatus::Decommissioning => "decommissioning",
            ApplicationStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ApplicationStatus::Active),
            "decommissioning" => Ok(ApplicationStatus::Decommissioning),
            "deleted" => Ok(ApplicationStatus::Deleted),
            other => Err(AppError::Validation(format!(
                "Unknown application status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Pending,
    InProgress,
    Completed,
    Partial,
    Failed,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisioningStatus::Pending => "pending",
            ProvisioningStatus::InProgress => "in_progress",
            ProvisioningStatus::Completed => "completed",
            ProvisioningStatus::Partial => "partial",
            ProvisioningStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningStatus::Completed | ProvisioningStatus::Partial | ProvisioningStatus::Failed
        )
    }

    /// Only failed and partial applications may be retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, ProvisioningStatus::Failed | ProvisioningStatus::Partial)
    }

    /// Aggregate status once every required environment has reported.
    ///
    /// Returns `None` while at least one required environment has no detail yet.
    pub fn aggregate(
        required: &[Environment],
        details: &ProvisioningDetails,
    ) -> Option<ProvisioningStatus> {
        let mut successes = 0;
        for env in required {
            match details.get(env) {
                Some(detail) if detail.status == EnvironmentOutcome::Success => successes += 1,
                Some(_) => {}
                None => return None,
            }
        }

        Some(if successes == required.len() {
            ProvisioningStatus::Completed
        } else if successes == 0 {
            ProvisioningStatus::Failed
        } else {
            ProvisioningStatus::Partial
        })
    }

    /// Whether a terminal status agrees with a set of environment details.
    /// Non-terminal statuses, and empty detail maps, are always consistent.
    pub fn consistent_with(&self, details: &ProvisioningDetails) -> bool {
        if details.is_empty() {
            return true;
        }
        let successes = details
            .values()
            .filter(|d| d.status == EnvironmentOutcome::Success)
            .count();
        match self {
            ProvisioningStatus::Completed => successes == details.len(),
            ProvisioningStatus::Partial => successes > 0 && successes < details.len(),
            ProvisioningStatus::Failed => successes == 0,
            ProvisioningStatus::Pending | ProvisioningStatus::InProgress => true,
        }
    }
}

impl fmt::Display for ProvisioningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProvisioningStatus::Pending),
            "in_progress" => Ok(ProvisioningStatus::InProgress),
            "completed" => Ok(ProvisioningStatus::Completed),
            "partial" => Ok(ProvisioningStatus::Partial),
            "failed" => Ok(ProvisioningStatus::Failed),
            other => Err(AppError::Validation(format!(
                "Unknown provisioning status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentOutcome {
    Success,
    Failed,
    Skipped,
}

/// Per-environment result reported by the workflow runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentDetail {
    pub status: EnvironmentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub type ProvisioningDetails = BTreeMap<Environment, EnvironmentDetail>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: ApplicationStatus,
    pub provisioning_status: ProvisioningStatus,
    pub provisioning_workflow_id: Option<String>,
    pub provisioning_details: ProvisioningDetails,
    pub provisioning_error: Option<String>,
    pub provisioning_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(workspace_id: Uuid, name: String, slug: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            name,
            slug,
            status: ApplicationStatus::Active,
            provisioning_status: ProvisioningStatus::Pending,
            provisioning_workflow_id: None,
            provisioning_details: ProvisioningDetails::new(),
            provisioning_error: None,
            provisioning_completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Workflow id used for every provisioning run of this application, so
    /// the runner can refuse a second in-flight run for the same id.
    pub fn provisioning_workflow_id(id: Uuid) -> String {
        format!("kafka-provision-{}", id)
    }

    /// Fully provisioned when every required environment has an active
    /// virtual cluster.
    pub fn is_fully_provisioned(
        &self,
        clusters: &[VirtualCluster],
        required: &[Environment],
    ) -> bool {
        required.iter().all(|env| {
            clusters.iter().any(|vc| {
                vc.application_id == self.id
                    && vc.environment == *env
                    && vc.status == VirtualClusterStatus::Active
            })
        })
    }
}

/// DNS-safe slug: lowercase alphanumerics and '-', 1..=63 chars, no '-' at either end.
pub fn validate_slug(slug: &str) -> Result<(), AppError> {
    let valid = !slug.is_empty()
        && slug.len() <= 63
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Slug '{}' must be 1-63 lowercase letters, digits or '-' and not start or end with '-'",
            slug
        )))
    }
}

// ============================================================================
// Virtual Cluster
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualClusterStatus {
    Pending,
    Provisioning,
    Active,
    Failed,
    Deleting,
}

impl VirtualClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtualClusterStatus::Pending => "pending",
            VirtualClusterStatus::Provisioning => "provisioning",
            VirtualClusterStatus::Active => "active",
            VirtualClusterStatus::Failed => "failed",
            VirtualClusterStatus::Deleting => "deleting",
        }
    }
}

impl FromStr for VirtualClusterStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(VirtualClusterStatus::Pending),
            "provisioning" => Ok(VirtualClusterStatus::Provisioning),
            "active" => Ok(VirtualClusterStatus::Active),
            "failed" => Ok(VirtualClusterStatus::Failed),
            "deleting" => Ok(VirtualClusterStatus::Deleting),
            other => Err(AppError::Validation(format!(
                "Unknown virtual cluster status '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCluster {
    pub id: Uuid,
    pub application_id: Uuid,
    pub environment: Environment,
    pub status: VirtualClusterStatus,
    pub advertised_host: Option<String>,
    pub topic_prefix: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VirtualCluster {
    pub fn new(application_id: Uuid, environment: Environment, status: VirtualClusterStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            application_id,
            environment,
            status,
            advertised_host: None,
            topic_prefix: None,
            created_at: now,
            updated_at: now,
        }
    }
}
