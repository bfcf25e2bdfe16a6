// Database row types and their conversion into domain records

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::{
    AccessLevel, Application, ApplicationRequest, AutoApprovePolicy, LineageEdge, LineageSnapshot,
    ProvisioningDetails, SnapshotParticipant, Topic, TopicAccessRequest, UsageMetric,
    VirtualCluster, Workspace,
};
use crate::errors::{AppError, Result};

/// Counters are u64 in the domain and BIGINT in the database.
pub fn to_db_count(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::Validation(format!("Counter value {} is out of range", value)))
}

pub fn from_db_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn corrupt(table: &str, err: AppError) -> AppError {
    AppError::Internal(format!("Corrupt row in {}: {}", table, err))
}

// ============================================================================
// Workspace / Topic
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct WorkspaceRow {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub application_quota: Option<i32>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Workspace {
            id: row.id,
            name: row.name,
            slug: row.slug,
            application_quota: row.application_quota.map(|q| q.max(0) as u32),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TopicRow {
    pub id: Uuid,
    pub name: String,
    pub workspace_id: Uuid,
}

impl From<TopicRow> for Topic {
    fn from(row: TopicRow) -> Self {
        Topic {
            id: row.id,
            name: row.name,
            workspace_id: row.workspace_id,
        }
    }
}

// ============================================================================
// Application / Virtual Cluster
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub slug: String,
    pub status: String,
    pub provisioning_status: String,
    pub provisioning_workflow_id: Option<String>,
    pub provisioning_details: Json<ProvisioningDetails>,
    pub provisioning_error: Option<String>,
    pub provisioning_completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = AppError;

    fn try_from(row: ApplicationRow) -> Result<Self> {
        Ok(Application {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            slug: row.slug,
            status: row.status.parse().map_err(|e| corrupt("applications", e))?,
            provisioning_status: row
                .provisioning_status
                .parse()
                .map_err(|e| corrupt("applications", e))?,
            provisioning_workflow_id: row.provisioning_workflow_id,
            provisioning_details: row.provisioning_details.0,
            provisioning_error: row.provisioning_error,
            provisioning_completed_at: row.provisioning_completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct VirtualClusterRow {
    pub id: Uuid,
    pub application_id: Uuid,
    pub environment: String,
    pub status: String,
    pub advertised_host: Option<String>,
    pub topic_prefix: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<VirtualClusterRow> for VirtualCluster {
    type Error = AppError;

    fn try_from(row: VirtualClusterRow) -> Result<Self> {
        Ok(VirtualCluster {
            id: row.id,
            application_id: row.application_id,
            environment: row
                .environment
                .parse()
                .map_err(|e| corrupt("virtual_clusters", e))?,
            status: row.status.parse().map_err(|e| corrupt("virtual_clusters", e))?,
            advertised_host: row.advertised_host,
            topic_prefix: row.topic_prefix,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Lineage
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct LineageEdgeRow {
    pub id: Uuid,
    pub source_application_id: Option<Uuid>,
    pub source_service_account: Option<String>,
    pub source_workspace_id: Option<Uuid>,
    pub topic_id: Uuid,
    pub target_workspace_id: Uuid,
    pub direction: String,
    pub bytes_last_24h: i64,
    pub messages_last_24h: i64,
    pub bytes_all_time: i64,
    pub messages_all_time: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub is_cross_workspace: bool,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<LineageEdgeRow> for LineageEdge {
    type Error = AppError;

    fn try_from(row: LineageEdgeRow) -> Result<Self> {
        Ok(LineageEdge {
            id: row.id,
            source_application_id: row.source_application_id,
            source_service_account: row.source_service_account,
            source_workspace_id: row.source_workspace_id,
            topic_id: row.topic_id,
            target_workspace_id: row.target_workspace_id,
            direction: row.direction.parse().map_err(|e| corrupt("lineage_edges", e))?,
            bytes_last_24h: from_db_count(row.bytes_last_24h),
            messages_last_24h: from_db_count(row.messages_last_24h),
            bytes_all_time: from_db_count(row.bytes_all_time),
            messages_all_time: from_db_count(row.messages_all_time),
            first_seen: row.first_seen,
            last_seen: row.last_seen,
            is_active: row.is_active,
            is_cross_workspace: row.is_cross_workspace,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LineageSnapshotRow {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub day: NaiveDate,
    pub producers: Json<Vec<SnapshotParticipant>>,
    pub consumers: Json<Vec<SnapshotParticipant>>,
    pub total_bytes: i64,
    pub total_messages: i64,
    pub producer_count: i64,
    pub consumer_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<LineageSnapshotRow> for LineageSnapshot {
    fn from(row: LineageSnapshotRow) -> Self {
        LineageSnapshot {
            id: row.id,
            topic_id: row.topic_id,
            day: row.day,
            producers: row.producers.0,
            consumers: row.consumers.0,
            total_bytes: from_db_count(row.total_bytes),
            total_messages: from_db_count(row.total_messages),
            producer_count: from_db_count(row.producer_count),
            consumer_count: from_db_count(row.consumer_count),
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Approval requests
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ApplicationRequestRow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub slug: String,
    pub requested_by: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub application_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<ApplicationRequestRow> for ApplicationRequest {
    type Error = AppError;

    fn try_from(row: ApplicationRequestRow) -> Result<Self> {
        Ok(ApplicationRequest {
            id: row.id,
            workspace_id: row.workspace_id,
            name: row.name,
            slug: row.slug,
            requested_by: row.requested_by,
            status: row
                .status
                .parse()
                .map_err(|e| corrupt("application_requests", e))?,
            rejection_reason: row.rejection_reason,
            application_id: row.application_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            decided_at: row.decided_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TopicAccessRequestRow {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub topic_workspace_id: Uuid,
    pub application_id: Uuid,
    pub requesting_workspace_id: Uuid,
    pub access_level: String,
    pub requested_by: String,
    pub status: String,
    pub auto_approved: bool,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<TopicAccessRequestRow> for TopicAccessRequest {
    type Error = AppError;

    fn try_from(row: TopicAccessRequestRow) -> Result<Self> {
        Ok(TopicAccessRequest {
            id: row.id,
            topic_id: row.topic_id,
            topic_workspace_id: row.topic_workspace_id,
            application_id: row.application_id,
            requesting_workspace_id: row.requesting_workspace_id,
            access_level: row
                .access_level
                .parse()
                .map_err(|e| corrupt("topic_access_requests", e))?,
            requested_by: row.requested_by,
            status: row
                .status
                .parse()
                .map_err(|e| corrupt("topic_access_requests", e))?,
            auto_approved: row.auto_approved,
            rejection_reason: row.rejection_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            decided_at: row.decided_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AutoApprovePolicyRow {
    pub workspace_id: Uuid,
    pub enabled: bool,
    pub allowed_levels: Vec<String>,
}

impl TryFrom<AutoApprovePolicyRow> for AutoApprovePolicy {
    type Error = AppError;

    fn try_from(row: AutoApprovePolicyRow) -> Result<Self> {
        let allowed_levels = row
            .allowed_levels
            .iter()
            .map(|l| l.parse::<AccessLevel>())
            .collect::<Result<Vec<_>>>()
            .map_err(|e| corrupt("auto_approve_policies", e))?;
        Ok(AutoApprovePolicy {
            workspace_id: row.workspace_id,
            enabled: row.enabled,
            allowed_levels,
        })
    }
}

// ============================================================================
// Usage
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct UsageMetricRow {
    pub application_id: Uuid,
    pub application_name: String,
    pub workspace_id: Uuid,
    pub workspace_name: String,
    pub period_start: NaiveDate,
    pub bytes_in: i64,
    pub bytes_out: i64,
    pub messages_in: i64,
    pub messages_out: i64,
}

impl From<UsageMetricRow> for UsageMetric {
    fn from(row: UsageMetricRow) -> Self {
        UsageMetric {
            application_id: row.application_id,
            application_name: row.application_name,
            workspace_id: row.workspace_id,
            workspace_name: row.workspace_name,
            period_start: row.period_start,
            bytes_in: from_db_count(row.bytes_in),
            bytes_out: from_db_count(row.bytes_out),
            messages_in: from_db_count(row.messages_in),
            messages_out: from_db_count(row.messages_out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_conversion_bounds() {
        assert_eq!(to_db_count(42).unwrap(), 42);
        assert!(to_db_count(u64::MAX).is_err());
        assert_eq!(from_db_count(-5), 0);
    }

    #[test]
    fn test_corrupt_status_is_internal_error() {
        let row = VirtualClusterRow {
            id: Uuid::new_v4(),
            application_id: Uuid::new_v4(),
            environment: "qa".into(),
            status: "active".into(),
            advertised_host: None,
            topic_prefix: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let err = VirtualCluster::try_from(row).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
