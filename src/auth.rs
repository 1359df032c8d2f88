use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::ErrorResponse;
use crate::config::Config;

pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const MEMBER_HEADER: &str = "x-member-id";

/// The caller's tenant, as vouched for by the upstream gateway.
///
/// The gateway authenticates with the shared API key and forwards the
/// organization and member the request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantIdentity {
    pub organization_id: Uuid,
    pub member_id: Uuid,
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse::new(message, "unauthorized")),
    )
        .into_response()
}

fn uuid_header(headers: &HeaderMap, name: &str) -> Option<Uuid> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
}

impl<S> FromRequestParts<S> for TenantIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("Missing or malformed authorization header"))?;

        let config = parts.extensions.get::<Arc<Config>>().ok_or_else(|| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Config not found", "internal")),
            )
                .into_response()
        })?;

        if token.len() < 32 || token != config.api_key {
            return Err(unauthorized("Invalid API key"));
        }

        let organization_id = uuid_header(&parts.headers, ORGANIZATION_HEADER)
            .ok_or_else(|| unauthorized("Missing or invalid X-Organization-Id header"))?;
        let member_id = uuid_header(&parts.headers, MEMBER_HEADER)
            .ok_or_else(|| unauthorized("Missing or invalid X-Member-Id header"))?;

        Ok(TenantIdentity {
            organization_id,
            member_id,
        })
    }
}
