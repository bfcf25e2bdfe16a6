// Lineage graph types: live edges, observations, query views and daily snapshots

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

/// Window after which an edge with no traffic stops being active.
pub const ACTIVE_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Produce,
    Consume,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Produce => "produce",
            Direction::Consume => "consume",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "produce" => Ok(Direction::Produce),
            "consume" => Ok(Direction::Consume),
            other => Err(AppError::Validation(format!("Unknown direction '{}'", other))),
        }
    }
}

/// Uniqueness key of a lineage edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeKey {
    #[serde(default)]
    pub source_application_id: Option<Uuid>,
    #[serde(default)]
    pub source_service_account: Option<String>,
    pub topic_id: Uuid,
    pub direction: Direction,
}

impl EdgeKey {
    pub fn validate(&self) -> Result<(), AppError> {
        let has_account = self
            .source_service_account
            .as_deref()
            .map_or(false, |sa| !sa.trim().is_empty());
        if self.source_application_id.is_none() && !has_account {
            return Err(AppError::Validation(
                "An edge needs a source application or a service account".to_string(),
            ));
        }
        Ok(())
    }

    /// Flat string form of the key, stored with a unique constraint.
    pub fn natural_key(&self) -> String {
        format!(
            "app:{}|sa:{}|topic:{}|{}",
            self.source_application_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            self.source_service_account.as_deref().unwrap_or(""),
            self.topic_id,
            self.direction
        )
    }
}

/// One periodic produce/consume observation from the metrics collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(flatten)]
    pub key: EdgeKey,
    /// Source workspace for service-account sources. Ignored when the source
    /// application is known, whose own workspace wins.
    #[serde(default)]
    pub source_workspace_id: Option<Uuid>,
    pub bytes: u64,
    pub messages: u64,
    pub observed_at: DateTime<Utc>,
    /// Collector-assigned id of this delivery; a repeated id is not counted twice.
    #[serde(default)]
    pub delivery_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEdge {
    pub id: Uuid,
    pub source_application_id: Option<Uuid>,
    pub source_service_account: Option<String>,
    pub source_workspace_id: Option<Uuid>,
    pub topic_id: Uuid,
    pub target_workspace_id: Uuid,
    pub direction: Direction,
    pub bytes_last_24h: u64,
    pub messages_last_24h: u64,
    pub bytes_all_time: u64,
    pub messages_all_time: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub is_cross_workspace: bool,
    pub updated_at: DateTime<Utc>,
}

impl LineageEdge {
    /// Fresh edge for the first observation of a key.
    pub fn from_observation(
        observation: &Observation,
        source_workspace_id: Option<Uuid>,
        target_workspace_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let mut edge = Self {
            id: Uuid::new_v4(),
            source_application_id: observation.key.source_application_id,
            source_service_account: observation.key.source_service_account.clone(),
            source_workspace_id,
            topic_id: observation.key.topic_id,
            target_workspace_id,
            direction: observation.key.direction,
            bytes_last_24h: observation.bytes,
            messages_last_24h: observation.messages,
            bytes_all_time: observation.bytes,
            messages_all_time: observation.messages,
            first_seen: observation.observed_at,
            last_seen: observation.observed_at,
            is_active: false,
            is_cross_workspace: false,
            updated_at: now,
        };
        edge.refresh_derived(now);
        edge
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source_application_id: self.source_application_id,
            source_service_account: self.source_service_account.clone(),
            topic_id: self.topic_id,
            direction: self.direction,
        }
    }

    /// Additive aggregation of one observation. The workspaces resolved for
    /// this write replace the stored ones; an unknown source keeps the last
    /// known source workspace.
    pub fn apply_observation(
        &mut self,
        observation: &Observation,
        source_workspace_id: Option<Uuid>,
        target_workspace_id: Uuid,
        now: DateTime<Utc>,
    ) {
        if source_workspace_id.is_some() {
            self.source_workspace_id = source_workspace_id;
        }
        self.target_workspace_id = target_workspace_id;
        self.bytes_last_24h = self.bytes_last_24h.saturating_add(observation.bytes);
        self.messages_last_24h = self.messages_last_24h.saturating_add(observation.messages);
        self.bytes_all_time = self.bytes_all_time.saturating_add(observation.bytes);
        self.messages_all_time = self.messages_all_time.saturating_add(observation.messages);
        self.first_seen = self.first_seen.min(observation.observed_at);
        self.last_seen = self.last_seen.max(observation.observed_at);
        self.updated_at = now;
        self.refresh_derived(now);
    }

    /// Recompute the derived flags; called on every write.
    pub fn refresh_derived(&mut self, now: DateTime<Utc>) {
        self.is_active = self.last_seen >= now - Duration::hours(ACTIVE_WINDOW_HOURS);
        self.is_cross_workspace = self
            .source_workspace_id
            .map_or(false, |source| source != self.target_workspace_id);
    }

    pub fn touches_workspace(&self, workspace_id: Uuid) -> bool {
        self.target_workspace_id == workspace_id || self.source_workspace_id == Some(workspace_id)
    }
}

/// Result of an edge upsert.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeUpsert {
    pub edge: LineageEdge,
    /// False when the delivery id had already been applied.
    pub applied: bool,
}

/// Field update from the collector and cleanup jobs. `isCrossWorkspace` is
/// derived and cannot be set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EdgePatch {
    pub is_active: Option<bool>,
    pub bytes_last_24h: Option<u64>,
    pub messages_last_24h: Option<u64>,
    pub bytes_all_time: Option<u64>,
    pub messages_all_time: Option<u64>,
    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl EdgePatch {
    /// Apply to an edge, refusing to move all-time counters backwards.
    pub fn apply_to(&self, edge: &mut LineageEdge, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(bytes) = self.bytes_all_time {
            if bytes < edge.bytes_all_time {
                return Err(AppError::Validation(format!(
                    "bytesAllTime cannot decrease ({} < {})",
                    bytes, edge.bytes_all_time
                )));
            }
        }
        if let Some(messages) = self.messages_all_time {
            if messages < edge.messages_all_time {
                return Err(AppError::Validation(format!(
                    "messagesAllTime cannot decrease ({} < {})",
                    messages, edge.messages_all_time
                )));
            }
        }

        if let Some(v) = self.bytes_last_24h {
            edge.bytes_last_24h = v;
        }
        if let Some(v) = self.messages_last_24h {
            edge.messages_last_24h = v;
        }
        if let Some(v) = self.bytes_all_time {
            edge.bytes_all_time = v;
        }
        if let Some(v) = self.messages_all_time {
            edge.messages_all_time = v;
        }
        if let Some(v) = self.first_seen {
            edge.first_seen = v;
        }
        if let Some(v) = self.last_seen {
            edge.last_seen = v;
        }
        if edge.first_seen > edge.last_seen {
            return Err(AppError::Validation(
                "firstSeen cannot be after lastSeen".to_string(),
            ));
        }

        edge.updated_at = now;
        edge.refresh_derived(now);
        // An explicit flag from the cleanup job overrides the recency rule.
        if let Some(active) = self.is_active {
            edge.is_active = active;
        }
        Ok(())
    }
}

// ============================================================================
// Query views
// ============================================================================

/// Edge with names resolved for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeView {
    pub edge_id: Uuid,
    pub direction: Direction,
    pub application_id: Option<Uuid>,
    pub application_name: Option<String>,
    pub service_account: Option<String>,
    pub workspace_id: Option<Uuid>,
    pub workspace_name: Option<String>,
    pub topic_id: Uuid,
    pub topic_name: Option<String>,
    pub topic_workspace_id: Uuid,
    pub topic_workspace_name: Option<String>,
    pub bytes_last_24h: u64,
    pub messages_last_24h: u64,
    pub bytes_all_time: u64,
    pub messages_all_time: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub is_active: bool,
    pub is_cross_workspace: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicLineage {
    pub topic_id: Uuid,
    pub topic_name: String,
    pub workspace_id: Uuid,
    pub workspace_name: Option<String>,
    pub producers: Vec<EdgeView>,
    pub consumers: Vec<EdgeView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationLineage {
    pub application_id: Uuid,
    pub application_name: String,
    pub workspace_id: Uuid,
    pub workspace_name: Option<String>,
    pub produces_to: Vec<EdgeView>,
    pub consumes_from: Vec<EdgeView>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageSummary {
    pub producer_count: u64,
    pub consumer_count: u64,
    pub total_bytes: u64,
    pub total_messages: u64,
}

impl LineageSummary {
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = &'a LineageEdge>) -> Self {
        let mut summary = LineageSummary::default();
        for edge in edges {
            match edge.direction {
                Direction::Produce => summary.producer_count += 1,
                Direction::Consume => summary.consumer_count += 1,
            }
            summary.total_bytes = summary.total_bytes.saturating_add(edge.bytes_all_time);
            summary.total_messages = summary.total_messages.saturating_add(edge.messages_all_time);
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineageSubject {
    Topic(Uuid),
    Application(Uuid),
}

impl LineageSubject {
    pub fn cache_key(&self) -> String {
        match self {
            LineageSubject::Topic(id) => format!("lineage:summary:topic:{}", id),
            LineageSubject::Application(id) => format!("lineage:summary:app:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossWorkspaceDirection {
    Inbound,
    Outbound,
    #[default]
    Both,
}

// ============================================================================
// Snapshots
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotParticipant {
    #[serde(default)]
    pub application_id: Option<Uuid>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub service_account: Option<String>,
    pub bytes: u64,
    pub messages: u64,
}

impl SnapshotParticipant {
    fn identity(&self) -> (Option<Uuid>, Option<&str>) {
        (self.application_id, self.service_account.as_deref())
    }
}

/// Immutable per-(topic, day) rollup written by the daily aggregation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageSnapshot {
    pub id: Uuid,
    pub topic_id: Uuid,
    pub day: NaiveDate,
    pub producers: Vec<SnapshotParticipant>,
    pub consumers: Vec<SnapshotParticipant>,
    pub total_bytes: u64,
    pub total_messages: u64,
    pub producer_count: u64,
    pub consumer_count: u64,
    pub created_at: DateTime<Utc>,
}

impl LineageSnapshot {
    /// Build a snapshot, computing totals and distinct participant counts.
    pub fn new(
        topic_id: Uuid,
        day: NaiveDate,
        producers: Vec<SnapshotParticipant>,
        consumers: Vec<SnapshotParticipant>,
    ) -> Self {
        let total_bytes = producers
            .iter()
            .chain(consumers.iter())
            .fold(0u64, |acc, p| acc.saturating_add(p.bytes));
        let total_messages = producers
            .iter()
            .chain(consumers.iter())
            .fold(0u64, |acc, p| acc.saturating_add(p.messages));
        let producer_count = producers
            .iter()
            .map(SnapshotParticipant::identity)
            .collect::<HashSet<_>>()
            .len() as u64;
        let consumer_count = consumers
            .iter()
            .map(SnapshotParticipant::identity)
            .collect::<HashSet<_>>()
            .len() as u64;

        Self {
            id: Uuid::new_v4(),
            topic_id,
            day,
            producers,
            consumers,
            total_bytes,
            total_messages,
            producer_count,
            consumer_count,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(topic_id: Uuid, bytes: u64, at: DateTime<Utc>) -> Observation {
        Observation {
            key: EdgeKey {
                source_application_id: Some(Uuid::new_v4()),
                source_service_account: None,
                topic_id,
                direction: Direction::Produce,
            },
            source_workspace_id: None,
            bytes,
            messages: 1,
            observed_at: at,
            delivery_id: None,
        }
    }

    #[test]
    fn test_cross_workspace_is_derived() {
        let now = Utc::now();
        let target = Uuid::new_v4();
        let obs = observation(Uuid::new_v4(), 10, now);

        let same = LineageEdge::from_observation(&obs, Some(target), target, now);
        assert!(!same.is_cross_workspace);

        let other = LineageEdge::from_observation(&obs, Some(Uuid::new_v4()), target, now);
        assert!(other.is_cross_workspace);

        let unknown = LineageEdge::from_observation(&obs, None, target, now);
        assert!(!unknown.is_cross_workspace);
    }

    #[test]
    fn test_apply_observation_accumulates_and_tracks_window() {
        let now = Utc::now();
        let obs = observation(Uuid::new_v4(), 100, now - Duration::hours(2));
        let target = Uuid::new_v4();
        let mut edge = LineageEdge::from_observation(&obs, None, target, now);

        let mut later = obs.clone();
        later.observed_at = now - Duration::hours(1);
        edge.apply_observation(&later, None, target, now);

        assert_eq!(edge.bytes_all_time, 200);
        assert_eq!(edge.messages_all_time, 2);
        assert_eq!(edge.first_seen, now - Duration::hours(2));
        assert_eq!(edge.last_seen, now - Duration::hours(1));
        assert!(edge.is_active);
    }

    #[test]
    fn test_late_source_workspace_recomputes_cross_flag() {
        let now = Utc::now();
        let target = Uuid::new_v4();
        let obs = observation(Uuid::new_v4(), 10, now);
        let mut edge = LineageEdge::from_observation(&obs, None, target, now);
        assert!(!edge.is_cross_workspace);

        let source = Uuid::new_v4();
        edge.apply_observation(&obs, Some(source), target, now);
        assert_eq!(edge.source_workspace_id, Some(source));
        assert!(edge.is_cross_workspace);

        // A later write without a source keeps the known workspace
        edge.apply_observation(&obs, None, target, now);
        assert_eq!(edge.source_workspace_id, Some(source));
        assert!(edge.is_cross_workspace);
    }

    #[test]
    fn test_old_observation_is_inactive() {
        let now = Utc::now();
        let obs = observation(Uuid::new_v4(), 5, now - Duration::hours(30));
        let edge = LineageEdge::from_observation(&obs, None, Uuid::new_v4(), now);
        assert!(!edge.is_active);
    }

    #[test]
    fn test_patch_rejects_decreasing_all_time_counters() {
        let now = Utc::now();
        let obs = observation(Uuid::new_v4(), 500, now);
        let mut edge = LineageEdge::from_observation(&obs, None, Uuid::new_v4(), now);

        let patch = EdgePatch {
            bytes_all_time: Some(10),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut edge, now).is_err());
        assert_eq!(edge.bytes_all_time, 500);
    }

    #[test]
    fn test_patch_resets_rolling_window() {
        let now = Utc::now();
        let obs = observation(Uuid::new_v4(), 500, now);
        let mut edge = LineageEdge::from_observation(&obs, None, Uuid::new_v4(), now);

        let patch = EdgePatch {
            bytes_last_24h: Some(0),
            messages_last_24h: Some(0),
            is_active: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut edge, now).unwrap();
        assert_eq!(edge.bytes_last_24h, 0);
        assert_eq!(edge.bytes_all_time, 500);
        assert!(!edge.is_active);
    }

    #[test]
    fn test_edge_key_requires_a_source() {
        let key = EdgeKey {
            source_application_id: None,
            source_service_account: Some("  ".into()),
            topic_id: Uuid::new_v4(),
            direction: Direction::Consume,
        };
        assert!(key.validate().is_err());
    }

    #[test]
    fn test_natural_key_distinguishes_direction() {
        let mut key = EdgeKey {
            source_application_id: Some(Uuid::new_v4()),
            source_service_account: None,
            topic_id: Uuid::new_v4(),
            direction: Direction::Produce,
        };
        let produce = key.natural_key();
        key.direction = Direction::Consume;
        assert_ne!(produce, key.natural_key());
    }

    #[test]
    fn test_snapshot_counts_distinct_participants() {
        let app = Uuid::new_v4();
        let p = |bytes| SnapshotParticipant {
            application_id: Some(app),
            application_name: Some("orders".into()),
            service_account: None,
            bytes,
            messages: 1,
        };
        let snapshot = LineageSnapshot::new(
            Uuid::new_v4(),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            vec![p(10), p(20)],
            vec![],
        );
        assert_eq!(snapshot.producer_count, 1);
        assert_eq!(snapshot.consumer_count, 0);
        assert_eq!(snapshot.total_bytes, 30);
        assert_eq!(snapshot.total_messages, 2);
    }
}
