//! Minimal JWT termination boundary.
//!
//! Authentication *proper* (issuing tokens, password/2FA flows) is out
//! of scope for this spec (spec.md §1) — the teacher's own auth module
//! fills that role ambiently in the pack, but this crate only needs to
//! know which user a request is for. `AuthUser` verifies a bearer token
//! and extracts `sub` as the caller's user id; nothing else.

use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| ApiError::AuthMissing)?;

        let claims = verify_token(bearer.token(), &state.config.jwt_secret)?;
        Ok(AuthUser { user_id: claims.sub })
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "jwt verification failed");
        ApiError::AuthInvalid
    })?;
    Ok(data.claims)
}
