//! Route protection: the `CurrentUser` extractor.
//!
//! Handlers opt into authentication by taking a [`CurrentUser`] argument;
//! extraction fails with 401 when the bearer token is missing, malformed or
//! does not verify against the shared secret.

use crate::{AppState, auth::session, errors::Error};
use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use serde::{Deserialize, Serialize};

/// The authenticated caller, as carried in the session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub email: String,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Missing bearer token in Authorization header".to_string()),
            })?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Unauthenticated {
                message: Some("Missing bearer token in Authorization header".to_string()),
            })?;

        session::verify_session_token(token, &state.config)
    }
}
