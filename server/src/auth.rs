//! Bearer-token authentication.
//!
//! Identity is minted by the marketplace API as an HS256 JWT whose `sub` is
//! the user id; this service only verifies. Tokens arrive in the
//! `Authorization` header, or as a `token` query parameter for browser
//! WebSocket clients which cannot set headers on the upgrade request.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::models::UserId;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,

    #[error("Invalid authorization header format")]
    InvalidAuthFormat,

    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    TokenExpired,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::InvalidAuthFormat => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            AuthError::Internal(e) => {
                tracing::error!("Internal auth error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal error: {}", e),
                )
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(status = %status, error = %error_message, "Auth failure");
        }

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

static KEYS: Lazy<Keys> = Lazy::new(|| {
    let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set, using development default");
        "dev-secret-change-me".to_string()
    });
    Keys::new(secret.as_bytes())
});

/// Access-token claims. `sub` is the marketplace user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub iat: i64,
    pub exp: i64,
}

/// Mint an access token for `user_id`. The marketplace API issues these at
/// login; tests use this directly.
pub fn issue_token(user_id: UserId, ttl: Duration) -> Result<String, AuthError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    encode(&Header::default(), &claims, &KEYS.encoding)
        .map_err(|e| AuthError::Internal(e.to_string()))
}

/// Verify a token and return its claims.
pub fn verify_token(token: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(token, &KEYS.decoding, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
}

/// Authenticated user extractor. Handlers taking this argument only run for
/// requests carrying a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(axum::http::header::AUTHORIZATION) {
            Some(value) => {
                let value = value.to_str().map_err(|_| AuthError::InvalidAuthFormat)?;
                value
                    .strip_prefix("Bearer ")
                    .ok_or(AuthError::InvalidAuthFormat)?
                    .to_string()
            }
            None => token_from_query(parts.uri.query()).ok_or(AuthError::MissingToken)?,
        };

        let claims = verify_token(&token)?;
        tracing::debug!(user_id = claims.sub, "Authenticated request");

        Ok(AuthUser {
            user_id: claims.sub,
        })
    }
}

/// Pull `token=` out of a raw query string. JWTs are base64url so no
/// percent-decoding is needed.
fn token_from_query(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}
