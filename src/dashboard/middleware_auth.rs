//! JWT auth for the product API, and the shared-secret check for the cron
//! trigger.
//!
//! Product routes read the Supabase JWT from `Authorization: Bearer <token>`,
//! verify it (HS256, audience `authenticated`) against `SUPABASE_JWT_SECRET`,
//! and take the owner id from the `sub` claim. The [`CurrentUser`] extractor
//! never rejects: a missing or invalid token yields `None`, and the product
//! actions turn that into their own `Unauthorized` failure. Without a
//! configured JWT secret every token is treated as invalid.
//!
//! The cron trigger compares its bearer credential against `CRON_SECRET`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::AppState;

/// JWT claims from a Supabase-issued token.
#[derive(Debug, Deserialize)]
struct SupabaseClaims {
    /// Subject: the Supabase auth user ID (UUID).
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Authenticated user info.
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Verify a Supabase JWT and return the user it names.
pub fn decode_jwt(token: &str, secret: &str) -> Result<AuthUser, String> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);
    let data = decode::<SupabaseClaims>(token, &key, &validation)
        .map_err(|e| format!("JWT verification failed: {}", e))?;
    let user_id = Uuid::parse_str(&data.claims.sub)
        .map_err(|e| format!("JWT subject is not a UUID: {}", e))?;
    Ok(AuthUser {
        user_id,
        email: data.claims.email,
    })
}

pub fn extract_auth_user(state: &AppState, parts: &Parts) -> Option<AuthUser> {
    let secret = state.secrets.jwt_secret.as_deref()?;
    let token = bearer_token(&parts.headers)?;
    match decode_jwt(token, secret) {
        Ok(user) => Some(user),
        Err(e) => {
            debug!(error = %e, "rejected bearer token");
            None
        }
    }
}

/// Axum extractor for the optional signed-in user.
pub struct CurrentUser(pub Option<AuthUser>);

impl CurrentUser {
    pub fn owner(&self) -> Option<Uuid> {
        self.0.as_ref().map(|u| u.user_id)
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(CurrentUser(extract_auth_user(state, parts)))
    }
}

/// True iff the request carries `Bearer <expected>`. Always false when no
/// secret is configured.
pub fn verify_cron_secret(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let (Some(expected), Some(provided)) = (expected, bearer_token(headers)) else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }
    // Compare digests, never the raw secrets.
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}
