// Chargeback report endpoints (platform admins only)

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::{
    api::{
        extract::{Enveloped, ValidatedQuery},
        routes::AppState,
    },
    chargeback::{export_filename, to_csv, BillingPeriod},
    domain::AccessScope,
    errors::{query_response, AppError, Result},
};

fn require_platform_admin(scope: &AccessScope) -> Result<()> {
    if scope.platform_admin {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Chargeback reports are restricted to platform admins".to_string(),
        ))
    }
}

/// GET /v1/chargeback?from&to
#[tracing::instrument(skip(state, scope))]
pub async fn report(
    State(state): State<AppState>,
    Enveloped(scope): Enveloped<AccessScope>,
    Enveloped(ValidatedQuery(period)): Enveloped<ValidatedQuery<BillingPeriod>>,
) -> Response {
    let result = async {
        require_platform_admin(&scope)?;
        state.chargeback.report(period).await
    }
    .await;
    query_response(result)
}

/// GET /v1/chargeback/export?from&to
///
/// CSV attachment named after the billing period.
#[tracing::instrument(skip(state, scope))]
pub async fn export(
    State(state): State<AppState>,
    scope: AccessScope,
    ValidatedQuery(period): ValidatedQuery<BillingPeriod>,
) -> Result<Response> {
    require_platform_admin(&scope)?;
    let report = state.chargeback.report(period).await?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(&report));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        to_csv(&report),
    )
        .into_response())
}
