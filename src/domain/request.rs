// Approval request types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingWorkspace,
    PendingPlatform,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingWorkspace => "pending_workspace",
            RequestStatus::PendingPlatform => "pending_platform",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            RequestStatus::PendingWorkspace | RequestStatus::PendingPlatform
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_workspace" => Ok(RequestStatus::PendingWorkspace),
            "pending_platform" => Ok(RequestStatus::PendingPlatform),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(AppError::Validation(format!(
                "Unknown request status '{}'",
                other
            ))),
        }
    }
}

/// Request to create an application beyond the workspace quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRequest {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub slug: String,
    pub requested_by: String,
    pub status: RequestStatus,
    pub rejection_reason: Option<String>,
    /// Application created when the request was finally approved.
    pub application_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl ApplicationRequest {
    pub fn new(workspace_id: Uuid, name: String, slug: String, requested_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            name,
            slug,
            requested_by,
            status: RequestStatus::PendingWorkspace,
            rejection_reason: None,
            application_id: None,
            created_at: now,
            updated_at: now,
            decided_at: None,
        }
    }

    /// Rejected requests drop out of listings once the retention window passes.
    pub fn is_visible(&self, now: DateTime<Utc>, retention_days: i64) -> bool {
        visible(self.status, self.decided_at, now, retention_days)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    Read,
    Write,
    ReadWrite,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::ReadWrite => "read_write",
        }
    }
}

impl FromStr for AccessLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessLevel::Read),
            "write" => Ok(AccessLevel::Write),
            "read_write" => Ok(AccessLevel::ReadWrite),
            other => Err(AppError::Validation(format!(
                "Unknown access level '{}'",
                other
            ))),
        }
    }
}

/// Request by an application for access to another workspace's topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicAccessRequest {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub topic_workspace_id: Uuid,
    pub application_id: Uuid,
    pub requesting_workspace_id: Uuid,
    pub access_level: AccessLevel,
    pub requested_by: String,
    pub status: RequestStatus,
    pub auto_approved: bool,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TopicAccessRequest {
    pub fn is_visible(&self, now: DateTime<Utc>, retention_days: i64) -> bool {
        visible(self.status, self.decided_at, now, retention_days)
    }
}

/// Per-workspace policy that approves topic access without a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoApprovePolicy {
    pub workspace_id: Uuid,
    pub enabled: bool,
    pub allowed_levels: Vec<AccessLevel>,
}

impl AutoApprovePolicy {
    pub fn allows(&self, level: AccessLevel) -> bool {
        self.enabled && self.allowed_levels.contains(&level)
    }
}

fn visible(
    status: RequestStatus,
    decided_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    retention_days: i64,
) -> bool {
    match (status, decided_at) {
        (RequestStatus::Rejected, Some(at)) => at >= now - Duration::days(retention_days),
        _ => true,
    }
}
