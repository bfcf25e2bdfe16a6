// Application creation, quota and provisioning endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{
        extract::{Enveloped, ValidatedJson, ValidatedQuery},
        routes::AppState,
    },
    applications::{CreateOutcome, NewApplication},
    domain::{AccessScope, Application},
    errors::{query_response, AppError, Result},
    provisioning::IssueFilter,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaQuery {
    pub count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssuesQuery {
    #[serde(default)]
    pub filter: IssueFilter,
}

/// POST /v1/workspaces/:id/applications
///
/// 201 with the new application, or 202 with the approval request filed
/// because the workspace is at its quota.
#[tracing::instrument(skip(state, scope, body), fields(user_id = %scope.user_id))]
pub async fn create_application(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(workspace_id): Path<Uuid>,
    ValidatedJson(body): ValidatedJson<NewApplication>,
) -> Result<Response> {
    let outcome = state.applications.create(&scope, workspace_id, body).await?;
    let status = match outcome {
        CreateOutcome::Created(_) => StatusCode::CREATED,
        CreateOutcome::PendingApproval(_) => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)).into_response())
}

/// GET /v1/workspaces/:id/quota?count=
#[tracing::instrument(skip(state, scope))]
pub async fn get_quota(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(Path(workspace_id)): Enveloped<Path<Uuid>>,
    Enveloped(ValidatedQuery(query)): Enveloped<ValidatedQuery<QuotaQuery>>,
) -> Response {
    let result = async {
        if !scope.can_view(workspace_id) {
            return Err(AppError::not_found("Workspace"));
        }
        state
            .quota
            .evaluate(workspace_id, query.count.unwrap_or(1))
            .await
    }
    .await;
    query_response(result)
}

/// POST /v1/applications/:id/provisioning/trigger
#[tracing::instrument(skip(state, scope))]
pub async fn trigger_provisioning(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Application>> {
    ensure_admin_of_application(&state, &scope, application_id).await?;
    Ok(Json(state.tracker.trigger(application_id).await?))
}

/// POST /v1/applications/:id/provisioning/retry
#[tracing::instrument(skip(state, scope))]
pub async fn retry_provisioning(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Application>> {
    ensure_admin_of_application(&state, &scope, application_id).await?;
    Ok(Json(state.tracker.retry(application_id).await?))
}

/// POST /v1/applications/:id/decommission
#[tracing::instrument(skip(state, scope))]
pub async fn decommission_application(
    State(state): State<AppState>,
    scope: AccessScope,
    Path(application_id): Path<Uuid>,
) -> Result<Json<Application>> {
    Ok(Json(
        state.applications.decommission(&scope, application_id).await?,
    ))
}

/// GET /v1/provisioning/issues?filter=
///
/// Operations dashboard; platform admins only.
#[tracing::instrument(skip(state, scope))]
pub async fn list_issues(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(ValidatedQuery(query)): Enveloped<ValidatedQuery<IssuesQuery>>,
) -> Response {
    let result = async {
        if !scope.platform_admin {
            return Err(AppError::Forbidden(
                "Provisioning dashboard is restricted to platform admins".to_string(),
            ));
        }
        state.tracker.list_with_issues(query.filter).await
    }
    .await;
    query_response(result)
}

/// Provisioning actions need an admin of the owning workspace.
async fn ensure_admin_of_application(
    state: &AppState,
    scope: &AccessScope,
    application_id: Uuid,
) -> Result<()> {
    let application = state
        .repos
        .applications
        .find_by_id(application_id)
        .await?
        .filter(|a| scope.can_view(a.workspace_id))
        .ok_or_else(|| AppError::not_found("Application"))?;
    if !scope.is_workspace_admin(application.workspace_id) {
        return Err(AppError::Forbidden(
            "Only workspace admins may start provisioning".to_string(),
        ));
    }
    Ok(())
}
