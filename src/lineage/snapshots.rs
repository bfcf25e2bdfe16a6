// Daily lineage snapshots: append-only writes and history reads

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use super::engine::LineageEngine;
use crate::domain::{AccessScope, LineageSnapshot, SnapshotParticipant};
use crate::errors::{AppError, Result};

/// Rollup posted by the daily aggregation job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewSnapshot {
    pub topic_id: Uuid,
    pub day: NaiveDate,
    #[serde(default)]
    pub producers: Vec<SnapshotParticipant>,
    #[serde(default)]
    pub consumers: Vec<SnapshotParticipant>,
}

/// Inclusive day range; either bound may be open.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SnapshotRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl SnapshotRange {
    fn validate(&self) -> Result<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(AppError::Validation(format!(
                "Range start {} is after its end {}",
                from, to
            ))),
            _ => Ok(()),
        }
    }
}

impl LineageEngine {
    /// Store one immutable (topic, day) snapshot. A second one for the same
    /// pair is rejected.
    #[tracing::instrument(skip(self, snapshot), fields(topic_id = %snapshot.topic_id, day = %snapshot.day))]
    pub async fn append_snapshot(&self, snapshot: NewSnapshot) -> Result<LineageSnapshot> {
        self.repos()
            .topics
            .find_by_id(snapshot.topic_id)
            .await?
            .ok_or_else(|| AppError::not_found("Topic"))?;

        for participant in snapshot.producers.iter().chain(snapshot.consumers.iter()) {
            if participant.application_id.is_none() && participant.service_account.is_none() {
                return Err(AppError::Validation(
                    "Snapshot participants need an application id or a service account"
                        .to_string(),
                ));
            }
        }

        let record = LineageSnapshot::new(
            snapshot.topic_id,
            snapshot.day,
            snapshot.producers,
            snapshot.consumers,
        );
        self.repos().snapshots.append(&record).await?;
        tracing::info!(snapshot_id = %record.id, "Lineage snapshot stored");
        Ok(record)
    }

    /// Snapshots of a topic, oldest day first.
    #[tracing::instrument(skip(self, scope))]
    pub async fn snapshot_history(
        &self,
        scope: &AccessScope,
        topic_id: Uuid,
        range: SnapshotRange,
    ) -> Result<Vec<LineageSnapshot>> {
        range.validate()?;
        self.repos()
            .topics
            .find_by_id(topic_id)
            .await?
            .filter(|t| scope.can_view(t.workspace_id))
            .ok_or_else(|| AppError::not_found("Topic"))?;

        let mut snapshots = self
            .repos()
            .snapshots
            .find_by_filter(topic_id, range.from, range.to)
            .await?;
        snapshots.sort_by_key(|s| s.day);
        Ok(snapshots)
    }
}
