//! Bearer-token authentication and role model.
//!
//! Token issuance and verification mechanics live behind [`TokenService`] so
//! the hosting binary can plug in whatever credential backend it runs against.

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Account roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Member,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

/// The identity claim decoded from a verified bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
}

/// A freshly issued credential handed back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
}

/// Credential backend seam. Implementations own signing/storage and expiry.
pub trait TokenService: Send + Sync {
    fn issue(&self, email: &str) -> Result<IssuedToken, AuthError>;
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
    fn revoke(&self, token: &str) -> Result<(), AuthError>;
}

/// Authentication and authorization failures surfaced to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("unauthorized access")]
    Unauthorized,
    #[error("forbidden access")]
    Forbidden,
    #[error("credential backend unavailable: {0}")]
    Backend(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(json!({ "message": self.to_string() }));
        (status, body).into_response()
    }
}

/// Pull the bearer token out of the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::Unauthorized)?;

    raw.strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::Unauthorized)
}
