// PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::db::repository::*;
use crate::db::schema::*;
use crate::domain::{
    Application, ApplicationRequest, AutoApprovePolicy, EdgeUpsert, LineageEdge, LineageSnapshot,
    Observation, ProvisioningStatus, RequestStatus, Topic, TopicAccessRequest, UsageMetric,
    VirtualCluster, Workspace, ACTIVE_WINDOW_HOURS,
};
use crate::errors::{AppError, Result};

const APPLICATION_COLUMNS: &str = "id, workspace_id, name, slug, status, provisioning_status, \
     provisioning_workflow_id, provisioning_details, provisioning_error, \
     provisioning_completed_at, created_at, updated_at";

const VIRTUAL_CLUSTER_COLUMNS: &str =
    "id, application_id, environment, status, advertised_host, topic_prefix, created_at, updated_at";

const EDGE_COLUMNS: &str = "id, source_application_id, source_service_account, \
     source_workspace_id, topic_id, target_workspace_id, direction, bytes_last_24h, \
     messages_last_24h, bytes_all_time, messages_all_time, first_seen, last_seen, is_active, \
     is_cross_workspace, updated_at";

const SNAPSHOT_COLUMNS: &str = "id, topic_id, day, producers, consumers, total_bytes, \
     total_messages, producer_count, consumer_count, created_at";

const REQUEST_COLUMNS: &str = "id, workspace_id, name, slug, requested_by, status, \
     rejection_reason, application_id, created_at, updated_at, decided_at";

const ACCESS_REQUEST_COLUMNS: &str = "id, topic_id, topic_workspace_id, application_id, \
     requesting_workspace_id, access_level, requested_by, status, auto_approved, \
     rejection_reason, created_at, updated_at, decided_at";

const USAGE_COLUMNS: &str = "application_id, application_name, workspace_id, workspace_name, \
     period_start, bytes_in, bytes_out, messages_in, messages_out";

/// Repository implementations over a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl WorkspaceRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Workspace>> {
        let row = sqlx::query_as::<_, WorkspaceRow>(
            "SELECT id, name, slug, application_quota FROM workspaces WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Workspace::from))
    }
}

#[async_trait]
impl TopicRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Topic>> {
        let row = sqlx::query_as::<_, TopicRow>(
            "SELECT id, name, workspace_id FROM topics WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Topic::from))
    }
}

// ============================================================================
// Applications
// ============================================================================

#[async_trait]
impl ApplicationRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {} FROM applications WHERE id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Application::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &ApplicationFilter) -> Result<Vec<Application>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM applications WHERE TRUE",
            APPLICATION_COLUMNS
        ));
        if let Some(workspace_id) = filter.workspace_id {
            query.push(" AND workspace_id = ").push_bind(workspace_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(status) = filter.provisioning_status {
            query
                .push(" AND provisioning_status = ")
                .push_bind(status.as_str());
        }
        if let Some(slug) = &filter.slug {
            query.push(" AND slug = ").push_bind(slug.clone());
        }
        query.push(" ORDER BY updated_at DESC");

        let rows = query
            .build_query_as::<ApplicationRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn count_active(&self, workspace_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM applications WHERE workspace_id = $1 AND status = 'active'",
        )
        .bind(workspace_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_db_count(count))
    }

    async fn insert(&self, application: &Application) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (
                id, workspace_id, name, slug, status, provisioning_status,
                provisioning_workflow_id, provisioning_details, provisioning_error,
                provisioning_completed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(application.id)
        .bind(application.workspace_id)
        .bind(&application.name)
        .bind(&application.slug)
        .bind(application.status.as_str())
        .bind(application.provisioning_status.as_str())
        .bind(&application.provisioning_workflow_id)
        .bind(Json(&application.provisioning_details))
        .bind(&application.provisioning_error)
        .bind(application.provisioning_completed_at)
        .bind(application.created_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_insert(e, &format!("Application with slug '{}'", application.slug))
        })?;

        tracing::debug!("Inserted application {}", application.id);
        Ok(())
    }

    async fn update(&self, application: &Application) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET name = $2, status = $3, provisioning_status = $4,
                provisioning_workflow_id = $5, provisioning_details = $6,
                provisioning_error = $7, provisioning_completed_at = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(application.id)
        .bind(&application.name)
        .bind(application.status.as_str())
        .bind(application.provisioning_status.as_str())
        .bind(&application.provisioning_workflow_id)
        .bind(Json(&application.provisioning_details))
        .bind(&application.provisioning_error)
        .bind(application.provisioning_completed_at)
        .bind(application.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Application"));
        }
        Ok(())
    }

    async fn update_if_unchanged(
        &self,
        application: &Application,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET name = $2, status = $3, provisioning_status = $4,
                provisioning_workflow_id = $5, provisioning_details = $6,
                provisioning_error = $7, provisioning_completed_at = $8, updated_at = $9
            WHERE id = $1 AND updated_at = $10
            "#,
        )
        .bind(application.id)
        .bind(&application.name)
        .bind(application.status.as_str())
        .bind(application.provisioning_status.as_str())
        .bind(&application.provisioning_workflow_id)
        .bind(Json(&application.provisioning_details))
        .bind(&application.provisioning_error)
        .bind(application.provisioning_completed_at)
        .bind(application.updated_at)
        .bind(expected_updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM applications WHERE id = $1")
            .bind(application.id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(AppError::not_found("Application")),
        }
    }

    async fn begin_provisioning(
        &self,
        id: Uuid,
        from: &[ProvisioningStatus],
        workflow_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Application>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            r#"
            UPDATE applications
            SET provisioning_status = 'in_progress',
                provisioning_workflow_id = $2,
                provisioning_details = '{{}}'::jsonb,
                provisioning_error = NULL,
                provisioning_completed_at = NULL,
                updated_at = $3
            WHERE id = $1 AND status = 'active' AND provisioning_status = ANY($4)
            RETURNING {}
            "#,
            APPLICATION_COLUMNS
        ))
        .bind(id)
        .bind(workflow_id)
        .bind(now)
        .bind(&from)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Application::try_from).transpose()
    }
}

// ============================================================================
// Virtual clusters
// ============================================================================

#[async_trait]
impl VirtualClusterRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<VirtualCluster>> {
        let row = sqlx::query_as::<_, VirtualClusterRow>(&format!(
            "SELECT {} FROM virtual_clusters WHERE id = $1",
            VIRTUAL_CLUSTER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VirtualCluster::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &VirtualClusterFilter) -> Result<Vec<VirtualCluster>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM virtual_clusters WHERE TRUE",
            VIRTUAL_CLUSTER_COLUMNS
        ));
        if let Some(application_id) = filter.application_id {
            query.push(" AND application_id = ").push_bind(application_id);
        }
        if let Some(environment) = filter.environment {
            query.push(" AND environment = ").push_bind(environment.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY application_id, environment");

        let rows = query
            .build_query_as::<VirtualClusterRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn insert(&self, cluster: &VirtualCluster) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO virtual_clusters ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            VIRTUAL_CLUSTER_COLUMNS
        ))
        .bind(cluster.id)
        .bind(cluster.application_id)
        .bind(cluster.environment.as_str())
        .bind(cluster.status.as_str())
        .bind(&cluster.advertised_host)
        .bind(&cluster.topic_prefix)
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_insert(
                e,
                &format!("Virtual cluster for environment '{}'", cluster.environment),
            )
        })?;

        Ok(())
    }

    async fn upsert(&self, cluster: &VirtualCluster) -> Result<VirtualCluster> {
        let row = sqlx::query_as::<_, VirtualClusterRow>(&format!(
            r#"
            INSERT INTO virtual_clusters ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (application_id, environment) DO UPDATE
            SET status = EXCLUDED.status,
                advertised_host = EXCLUDED.advertised_host,
                topic_prefix = EXCLUDED.topic_prefix,
                updated_at = EXCLUDED.updated_at
            RETURNING {columns}
            "#,
            columns = VIRTUAL_CLUSTER_COLUMNS
        ))
        .bind(cluster.id)
        .bind(cluster.application_id)
        .bind(cluster.environment.as_str())
        .bind(cluster.status.as_str())
        .bind(&cluster.advertised_host)
        .bind(&cluster.topic_prefix)
        .bind(cluster.created_at)
        .bind(cluster.updated_at)
        .fetch_one(&self.pool)
        .await?;

        VirtualCluster::try_from(row)
    }

    async fn update(&self, cluster: &VirtualCluster) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE virtual_clusters
            SET status = $2, advertised_host = $3, topic_prefix = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(cluster.id)
        .bind(cluster.status.as_str())
        .bind(&cluster.advertised_host)
        .bind(&cluster.topic_prefix)
        .bind(cluster.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Virtual cluster"));
        }
        Ok(())
    }
}

// ============================================================================
// Lineage
// ============================================================================

#[async_trait]
impl LineageRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<LineageEdge>> {
        let row = sqlx::query_as::<_, LineageEdgeRow>(&format!(
            "SELECT {} FROM lineage_edges WHERE id = $1",
            EDGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LineageEdge::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &EdgeFilter) -> Result<Vec<LineageEdge>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM lineage_edges WHERE TRUE",
            EDGE_COLUMNS
        ));
        if let Some(topic_id) = filter.topic_id {
            query.push(" AND topic_id = ").push_bind(topic_id);
        }
        if let Some(application_id) = filter.source_application_id {
            query
                .push(" AND source_application_id = ")
                .push_bind(application_id);
        }
        if let Some(workspace_id) = filter.source_workspace_id {
            query
                .push(" AND source_workspace_id = ")
                .push_bind(workspace_id);
        }
        if let Some(workspace_id) = filter.target_workspace_id {
            query
                .push(" AND target_workspace_id = ")
                .push_bind(workspace_id);
        }
        if let Some(direction) = filter.direction {
            query.push(" AND direction = ").push_bind(direction.as_str());
        }
        if filter.cross_workspace_only {
            query.push(" AND is_cross_workspace");
        }
        if !filter.include_inactive {
            query.push(" AND is_active");
        }
        query.push(" ORDER BY last_seen DESC, id");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = query
            .build_query_as::<LineageEdgeRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn upsert_with_increment(
        &self,
        seed: LineageEdge,
        observation: &Observation,
        now: DateTime<Utc>,
    ) -> Result<EdgeUpsert> {
        let natural_key = seed.key().natural_key();
        let mut tx = self.pool.begin().await?;

        if let Some(delivery_id) = &observation.delivery_id {
            let recorded = sqlx::query(
                r#"
                INSERT INTO lineage_deliveries (edge_key, delivery_id, received_at)
                VALUES ($1, $2, $3)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&natural_key)
            .bind(delivery_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if recorded.rows_affected() == 0 {
                // Deliveries cascade with their edge, so the edge is present
                let row = sqlx::query_as::<_, LineageEdgeRow>(&format!(
                    "SELECT {} FROM lineage_edges WHERE edge_key = $1",
                    EDGE_COLUMNS
                ))
                .bind(&natural_key)
                .fetch_one(&mut *tx)
                .await?;
                tx.rollback().await?;
                tracing::debug!(
                    edge_key = %natural_key,
                    delivery_id = %delivery_id,
                    "Skipping already applied delivery"
                );
                return Ok(EdgeUpsert {
                    edge: LineageEdge::try_from(row)?,
                    applied: false,
                });
            }
        }

        let active_cutoff = now - Duration::hours(ACTIVE_WINDOW_HOURS);
        let row = sqlx::query_as::<_, LineageEdgeRow>(&format!(
            r#"
            INSERT INTO lineage_edges (
                id, edge_key, source_application_id, source_service_account,
                source_workspace_id, topic_id, target_workspace_id, direction,
                bytes_last_24h, messages_last_24h, bytes_all_time, messages_all_time,
                first_seen, last_seen, is_active, is_cross_workspace, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (edge_key) DO UPDATE
            SET bytes_last_24h = lineage_edges.bytes_last_24h + $18,
                messages_last_24h = lineage_edges.messages_last_24h + $19,
                bytes_all_time = lineage_edges.bytes_all_time + $18,
                messages_all_time = lineage_edges.messages_all_time + $19,
                first_seen = LEAST(lineage_edges.first_seen, $20),
                last_seen = GREATEST(lineage_edges.last_seen, $20),
                is_active = GREATEST(lineage_edges.last_seen, $20) >= $21,
                source_workspace_id = COALESCE($5, lineage_edges.source_workspace_id),
                target_workspace_id = $7,
                is_cross_workspace = COALESCE(
                    COALESCE($5, lineage_edges.source_workspace_id) <> $7,
                    FALSE
                ),
                updated_at = $17
            RETURNING {}
            "#,
            EDGE_COLUMNS
        ))
        .bind(seed.id)
        .bind(&natural_key)
        .bind(seed.source_application_id)
        .bind(&seed.source_service_account)
        .bind(seed.source_workspace_id)
        .bind(seed.topic_id)
        .bind(seed.target_workspace_id)
        .bind(seed.direction.as_str())
        .bind(to_db_count(seed.bytes_last_24h)?)
        .bind(to_db_count(seed.messages_last_24h)?)
        .bind(to_db_count(seed.bytes_all_time)?)
        .bind(to_db_count(seed.messages_all_time)?)
        .bind(seed.first_seen)
        .bind(seed.last_seen)
        .bind(seed.is_active)
        .bind(seed.is_cross_workspace)
        .bind(now)
        .bind(to_db_count(observation.bytes)?)
        .bind(to_db_count(observation.messages)?)
        .bind(observation.observed_at)
        .bind(active_cutoff)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(EdgeUpsert {
            edge: LineageEdge::try_from(row)?,
            applied: true,
        })
    }

    async fn update(&self, edge: &LineageEdge) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE lineage_edges
            SET bytes_last_24h = $2, messages_last_24h = $3,
                bytes_all_time = $4, messages_all_time = $5,
                first_seen = $6, last_seen = $7,
                is_active = $8, is_cross_workspace = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(edge.id)
        .bind(to_db_count(edge.bytes_last_24h)?)
        .bind(to_db_count(edge.messages_last_24h)?)
        .bind(to_db_count(edge.bytes_all_time)?)
        .bind(to_db_count(edge.messages_all_time)?)
        .bind(edge.first_seen)
        .bind(edge.last_seen)
        .bind(edge.is_active)
        .bind(edge.is_cross_workspace)
        .bind(edge.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Lineage edge"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        // lineage_deliveries rows go with the edge (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM lineage_edges WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<LineageEdge>> {
        let rows = sqlx::query_as::<_, LineageEdgeRow>(&format!(
            r#"
            UPDATE lineage_edges
            SET is_active = FALSE, updated_at = NOW()
            WHERE is_active AND last_seen < $1
            RETURNING {}
            "#,
            EDGE_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    async fn prune_deliveries(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM lineage_deliveries WHERE received_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SnapshotRepository for PgStore {
    async fn append(&self, snapshot: &LineageSnapshot) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO lineage_snapshots ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            SNAPSHOT_COLUMNS
        ))
        .bind(snapshot.id)
        .bind(snapshot.topic_id)
        .bind(snapshot.day)
        .bind(Json(&snapshot.producers))
        .bind(Json(&snapshot.consumers))
        .bind(to_db_count(snapshot.total_bytes)?)
        .bind(to_db_count(snapshot.total_messages)?)
        .bind(to_db_count(snapshot.producer_count)?)
        .bind(to_db_count(snapshot.consumer_count)?)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_insert(
                e,
                &format!(
                    "Snapshot for topic {} on {}",
                    snapshot.topic_id, snapshot.day
                ),
            )
        })?;

        Ok(())
    }

    async fn find_by_filter(
        &self,
        topic_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<LineageSnapshot>> {
        let rows = sqlx::query_as::<_, LineageSnapshotRow>(&format!(
            r#"
            SELECT {} FROM lineage_snapshots
            WHERE topic_id = $1
              AND ($2::date IS NULL OR day >= $2)
              AND ($3::date IS NULL OR day <= $3)
            ORDER BY day
            "#,
            SNAPSHOT_COLUMNS
        ))
        .bind(topic_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LineageSnapshot::from).collect())
    }
}

// ============================================================================
// Approval requests
// ============================================================================

#[async_trait]
impl RequestRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ApplicationRequest>> {
        let row = sqlx::query_as::<_, ApplicationRequestRow>(&format!(
            "SELECT {} FROM application_requests WHERE id = $1",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApplicationRequest::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &RequestFilter) -> Result<Vec<ApplicationRequest>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM application_requests WHERE TRUE",
            REQUEST_COLUMNS
        ));
        if let Some(workspace_id) = filter.workspace_id {
            query.push(" AND workspace_id = ").push_bind(workspace_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(name) = &filter.name {
            query.push(" AND LOWER(name) = LOWER(").push_bind(name.clone()).push(")");
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query
            .build_query_as::<ApplicationRequestRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn insert(&self, request: &ApplicationRequest) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO application_requests ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            REQUEST_COLUMNS
        ))
        .bind(request.id)
        .bind(request.workspace_id)
        .bind(&request.name)
        .bind(&request.slug)
        .bind(&request.requested_by)
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(request.application_id)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_insert(
                e,
                &format!("A pending request for application '{}'", request.name),
            )
        })?;

        Ok(())
    }

    async fn update(&self, request: &ApplicationRequest, expected: RequestStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE application_requests
            SET status = $2, rejection_reason = $3, application_id = $4,
                updated_at = $5, decided_at = $6
            WHERE id = $1 AND status = $7
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(request.application_id)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match RequestRepository::find_by_id(self, request.id).await? {
                Some(stored) => Err(AppError::InvalidState(format!(
                    "Request is {}, expected {}",
                    stored.status, expected
                ))),
                None => Err(AppError::not_found("Application request")),
            };
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM application_requests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccessRequestRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<TopicAccessRequest>> {
        let row = sqlx::query_as::<_, TopicAccessRequestRow>(&format!(
            "SELECT {} FROM topic_access_requests WHERE id = $1",
            ACCESS_REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TopicAccessRequest::try_from).transpose()
    }

    async fn find_by_filter(&self, filter: &AccessRequestFilter) -> Result<Vec<TopicAccessRequest>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM topic_access_requests WHERE TRUE",
            ACCESS_REQUEST_COLUMNS
        ));
        if let Some(topic_id) = filter.topic_id {
            query.push(" AND topic_id = ").push_bind(topic_id);
        }
        if let Some(application_id) = filter.application_id {
            query.push(" AND application_id = ").push_bind(application_id);
        }
        if let Some(workspace_id) = filter.workspace_id {
            query
                .push(" AND (requesting_workspace_id = ")
                .push_bind(workspace_id)
                .push(" OR topic_workspace_id = ")
                .push_bind(workspace_id)
                .push(")");
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let rows = query
            .build_query_as::<TopicAccessRequestRow>()
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn insert(&self, request: &TopicAccessRequest) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO topic_access_requests ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            ACCESS_REQUEST_COLUMNS
        ))
        .bind(request.id)
        .bind(request.topic_id)
        .bind(request.topic_workspace_id)
        .bind(request.application_id)
        .bind(request.requesting_workspace_id)
        .bind(request.access_level.as_str())
        .bind(&request.requested_by)
        .bind(request.status.as_str())
        .bind(request.auto_approved)
        .bind(&request.rejection_reason)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::from_insert(
                e,
                "A pending access request for this application and topic",
            )
        })?;

        Ok(())
    }

    async fn update(&self, request: &TopicAccessRequest, expected: RequestStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE topic_access_requests
            SET status = $2, rejection_reason = $3, updated_at = $4, decided_at = $5
            WHERE id = $1 AND status = $6
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(&request.rejection_reason)
        .bind(request.updated_at)
        .bind(request.decided_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match AccessRequestRepository::find_by_id(self, request.id).await? {
                Some(stored) => Err(AppError::InvalidState(format!(
                    "Request is {}, expected {}",
                    stored.status, expected
                ))),
                None => Err(AppError::not_found("Topic access request")),
            };
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyRepository for PgStore {
    async fn find_by_workspace(&self, workspace_id: Uuid) -> Result<Option<AutoApprovePolicy>> {
        let row = sqlx::query_as::<_, AutoApprovePolicyRow>(
            "SELECT workspace_id, enabled, allowed_levels FROM auto_approve_policies WHERE workspace_id = $1",
        )
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AutoApprovePolicy::try_from).transpose()
    }

    async fn upsert(&self, policy: &AutoApprovePolicy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO auto_approve_policies (workspace_id, enabled, allowed_levels)
            VALUES ($1, $2, $3)
            ON CONFLICT (workspace_id) DO UPDATE
            SET enabled = EXCLUDED.enabled, allowed_levels = EXCLUDED.allowed_levels
            "#,
        )
        .bind(policy.workspace_id)
        .bind(policy.enabled)
        .bind(levels_to_strings(&policy.allowed_levels))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Usage
// ============================================================================

#[async_trait]
impl UsageRepository for PgStore {
    async fn upsert_batch(&self, metrics: &[UsageMetric]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        for metric in metrics {
            sqlx::query(&format!(
                r#"
                INSERT INTO usage_metrics ({})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (application_id, period_start) DO UPDATE
                SET application_name = EXCLUDED.application_name,
                    workspace_id = EXCLUDED.workspace_id,
                    workspace_name = EXCLUDED.workspace_name,
                    bytes_in = EXCLUDED.bytes_in,
                    bytes_out = EXCLUDED.bytes_out,
                    messages_in = EXCLUDED.messages_in,
                    messages_out = EXCLUDED.messages_out
                "#,
                USAGE_COLUMNS
            ))
            .bind(metric.application_id)
            .bind(&metric.application_name)
            .bind(metric.workspace_id)
            .bind(&metric.workspace_name)
            .bind(metric.period_start)
            .bind(to_db_count(metric.bytes_in)?)
            .bind(to_db_count(metric.bytes_out)?)
            .bind(to_db_count(metric.messages_in)?)
            .bind(to_db_count(metric.messages_out)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!("Stored {} usage records", metrics.len());
        Ok(metrics.len() as u64)
    }

    async fn find_for_period(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<UsageMetric>> {
        let rows = sqlx::query_as::<_, UsageMetricRow>(&format!(
            r#"
            SELECT {} FROM usage_metrics
            WHERE period_start >= $1 AND period_start <= $2
            ORDER BY period_start, application_id
            "#,
            USAGE_COLUMNS
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UsageMetric::from).collect())
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn ping(&self) -> Result<()> {
        crate::db::pool::health_check(&self.pool).await
    }
}
