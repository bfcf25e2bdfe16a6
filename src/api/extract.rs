// Request extractors: caller scope from gateway headers, validated bodies and queries

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Query, Request,
    },
    http::{request::Parts, HeaderMap},
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::AccessScope;
use crate::errors::{query_response, AppError};

pub const USER_ID_HEADER: &str = "x-portal-user-id";
pub const WORKSPACES_HEADER: &str = "x-portal-workspaces";
pub const ADMIN_WORKSPACES_HEADER: &str = "x-portal-admin-workspaces";
pub const PLATFORM_ADMIN_HEADER: &str = "x-portal-platform-admin";

#[async_trait]
impl<S> FromRequestParts<S> for AccessScope
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        scope_from_headers(&parts.headers)
    }
}

/// Build the caller scope forwarded by the portal gateway. A missing user id
/// is `Unauthorized`; a malformed workspace list is `Validation`.
pub fn scope_from_headers(headers: &HeaderMap) -> Result<AccessScope, AppError> {
    let user_id = header_str(headers, USER_ID_HEADER)?
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(AppError::Unauthorized)?
        .to_string();

    let admin_workspaces = uuid_list(headers, ADMIN_WORKSPACES_HEADER)?;
    let mut workspaces = uuid_list(headers, WORKSPACES_HEADER)?;
    workspaces.extend(admin_workspaces.iter().copied());

    let platform_admin = header_str(headers, PLATFORM_ADMIN_HEADER)?
        .map_or(false, |v| v.trim().eq_ignore_ascii_case("true"));

    Ok(AccessScope {
        user_id,
        workspaces,
        admin_workspaces,
        platform_admin,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, AppError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| AppError::Validation(format!("Header {} is not valid text", name)))
        })
        .transpose()
}

fn uuid_list(headers: &HeaderMap, name: &str) -> Result<HashSet<Uuid>, AppError> {
    let Some(raw) = header_str(headers, name)? else {
        return Ok(HashSet::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s)
                .map_err(|_| AppError::Validation(format!("Header {} has invalid id '{}'", name, s)))
        })
        .collect()
}

/// JSON body whose rejections (bad syntax, unknown fields, bad enum values)
/// come back as `Validation` errors.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| AppError::Validation(e.body_text()))?;
        Ok(Self(value))
    }
}

/// Query string with the same error mapping as [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e: QueryRejection| AppError::Validation(e.body_text()))?;
        Ok(Self(value))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Runs another extractor and renders its rejection as a failed query
/// envelope (`{"success": false, "error": ...}`) with the mapped status.
pub struct Enveloped<E>(pub E);

#[async_trait]
impl<E, S> FromRequestParts<S> for Enveloped<E>
where
    E: FromRequestParts<S>,
    E::Rejection: Into<AppError>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        E::from_request_parts(parts, state)
            .await
            .map(Self)
            .map_err(|rejection| query_response::<()>(Err(rejection.into())))
    }
}
