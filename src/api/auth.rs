//! Identity extraction
//!
//! The identity provider is an external collaborator: requests arrive with an
//! opaque authenticated user id in the `X-User-Id` header, placed there by
//! the fronting auth layer, and the core trusts it as-is. Operator endpoints
//! additionally gate on the shared admin key from config.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::error::AppError;
use crate::AppState;

/// Authenticated caller identity.
///
/// Use this in route handlers to require a user id:
/// ```ignore
/// async fn my_handler(identity: Identity) -> impl IntoResponse {
///     let user_id = identity.user_id;
///     // ...
/// }
/// ```
pub struct Identity {
    pub user_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::MissingIdentity)?;

        Ok(Identity {
            user_id: user_id.to_string(),
        })
    }
}

/// Gate for operator endpoints: the `X-Admin-Key` header must match the
/// configured admin key. With no key configured, operator endpoints are
/// disabled entirely.
pub struct AdminGate;

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminGate
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app = AppState::from_ref(state);
        let expected = app.config.admin_key.as_deref().ok_or(AppError::AdminRequired)?;

        let presented = parts
            .headers
            .get("X-Admin-Key")
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::AdminRequired)?;

        if presented != expected {
            return Err(AppError::AdminRequired);
        }

        Ok(AdminGate)
    }
}
