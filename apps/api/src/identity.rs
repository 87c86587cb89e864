//! Identity-provider boundary: request identity extraction and the
//! out-of-band signup notification payload.
//!
//! Token/session verification happens upstream; by the time a request
//! reaches this service the authenticated identity is carried as an opaque
//! key in the `x-identity-id` header. Absence of the header means the
//! request is unauthenticated.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use serde::Deserialize;

use crate::errors::AppError;

pub const IDENTITY_HEADER: &str = "x-identity-id";
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// Extracts the identity key from request headers, if present.
pub fn identity_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The authenticated identity for the current request.
/// Rejects with 401 when the identity header is absent.
#[derive(Debug, Clone)]
pub struct RequestIdentity(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers)
            .map(RequestIdentity)
            .ok_or(AppError::Unauthorized)
    }
}

/// Identity-provider webhook event. Only `user.created` is acted on; other
/// event kinds are acknowledged and ignored.
#[derive(Debug, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: IdentityEventData,
}

#[derive(Debug, Deserialize)]
pub struct IdentityEventData {
    pub id: String,
}

pub const USER_CREATED_EVENT: &str = "user.created";
