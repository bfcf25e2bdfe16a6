// Lineage graph read endpoints

use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{
        extract::{Enveloped, ValidatedQuery},
        routes::AppState,
    },
    domain::{AccessScope, CrossWorkspaceDirection, LineageSubject},
    errors::query_response,
    lineage::{LineageOptions, SnapshotRange},
};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossWorkspaceQuery {
    #[serde(default)]
    pub direction: CrossWorkspaceDirection,
}

/// GET /v1/topics/:id/lineage?includeInactive&limit
#[tracing::instrument(skip(state, scope))]
pub async fn topic_lineage(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(topic_id)): Enveloped<Path<Uuid>>,
    Enveloped(ValidatedQuery(options)): Enveloped<ValidatedQuery<LineageOptions>>,
) -> Response {
    query_response(state.lineage.topic_lineage(&scope, topic_id, options).await)
}

/// GET /v1/topics/:id/lineage/summary
#[tracing::instrument(skip(state, scope))]
pub async fn topic_summary(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(topic_id)): Enveloped<Path<Uuid>>,
) -> Response {
    query_response(
        state
            .lineage
            .summarize(&scope, LineageSubject::Topic(topic_id))
            .await,
    )
}

/// GET /v1/topics/:id/lineage/history?from&to
#[tracing::instrument(skip(state, scope))]
pub async fn topic_history(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(topic_id)): Enveloped<Path<Uuid>>,
    Enveloped(ValidatedQuery(range)): Enveloped<ValidatedQuery<SnapshotRange>>,
) -> Response {
    query_response(state.lineage.snapshot_history(&scope, topic_id, range).await)
}

/// GET /v1/applications/:id/lineage?includeInactive&limit
#[tracing::instrument(skip(state, scope))]
pub async fn application_lineage(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(application_id)): Enveloped<Path<Uuid>>,
    Enveloped(ValidatedQuery(options)): Enveloped<ValidatedQuery<LineageOptions>>,
) -> Response {
    query_response(
        state
            .lineage
            .application_lineage(&scope, application_id, options)
            .await,
    )
}

/// GET /v1/applications/:id/lineage/summary
#[tracing::instrument(skip(state, scope))]
pub async fn application_summary(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(application_id)): Enveloped<Path<Uuid>>,
) -> Response {
    query_response(
        state
            .lineage
            .summarize(&scope, LineageSubject::Application(application_id))
            .await,
    )
}

/// GET /v1/workspaces/:id/lineage/cross-workspace?direction=
#[tracing::instrument(skip(state, scope))]
pub async fn cross_workspace(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(workspace_id)): Enveloped<Path<Uuid>>,
    Enveloped(ValidatedQuery(query)): Enveloped<ValidatedQuery<CrossWorkspaceQuery>>,
) -> Response {
    query_response(
        state
            .lineage
            .cross_workspace_lineage(&scope, workspace_id, query.direction)
            .await,
    )
}
