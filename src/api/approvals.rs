// Approval workflow endpoints: application requests and topic access requests

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{
        extract::{Enveloped, ValidatedJson, ValidatedQuery},
        routes::AppState,
    },
    approval::{AccessRequestQuery, NewTopicAccessRequest, Rejection, RequestQuery},
    domain::{AccessScope, ApplicationRequest, TopicAccessRequest},
    errors::{query_response, Result},
};

/// GET /v1/application-requests?workspaceId&status
#[tracing::instrument(skip(state, scope))]
pub async fn list_requests(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(ValidatedQuery(query)): Enveloped<ValidatedQuery<RequestQuery>>,
) -> Response {
    query_response(state.approvals.list(&scope, query).await)
}

/// POST /v1/application-requests/:id/approve
#[tracing::instrument(skip(state, scope))]
pub async fn approve_request(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(request_id): Path<Uuid>,
) -> Result<Json<ApplicationRequest>> {
    Ok(Json(state.approvals.approve(&scope, request_id).await?))
}

/// POST /v1/application-requests/:id/reject
#[tracing::instrument(skip(state, scope, body))]
pub async fn reject_request(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(request_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<Rejection>,
) -> Result<Json<ApplicationRequest>> {
    Ok(Json(state.approvals.reject(&scope, request_id, body).await?))
}

/// DELETE /v1/application-requests/:id
#[tracing::instrument(skip(state, scope))]
pub async fn withdraw_request(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(request_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.approvals.withdraw(&scope, request_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/topic-access-requests
#[tracing::instrument(skip(state, scope, body))]
pub async fn request_topic_access(
    State(state): State<AppState>,
    scope: AccessScope,
    ValidatedJson(body): ValidatedJson<NewTopicAccessRequest>,
) -> Result<(StatusCode, Json<TopicAccessRequest>)> {
    let request = state.approvals.request_topic_access(&scope, body).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /v1/topic-access-requests?topicId&applicationId&workspaceId&status
#[tracing::instrument(skip(state, scope))]
pub async fn list_topic_access(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(ValidatedQuery(query)): Enveloped<ValidatedQuery<AccessRequestQuery>>,
) -> Response {
    query_response(state.approvals.list_topic_access(&scope, query).await)
}

/// POST /v1/topic-access-requests/:id/approve
#[tracing::instrument(skip(state, scope))]
pub async fn approve_topic_access(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(request_id): Path<Uuid>,
) -> Result<Json<TopicAccessRequest>> {
    Ok(Json(
        state
            .approvals
            .approve_topic_access(&scope, request_id)
            .await?,
    ))
}

/// POST /v1/topic-access-requests/:id/reject
#[tracing::instrument(skip(state, scope, body))]
pub async fn reject_topic_access(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(request_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<Rejection>,
) -> Result<Json<TopicAccessRequest>> {
    Ok(Json(
        state
            .approvals
            .reject_topic_access(&scope, request_id, body)
            .await?,
    ))
}
