//! JWT Authentication Middleware
//!
//! Validates bearer tokens and stores the caller's user id in request
//! extensions for the billing handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthClaims {
    /// User id
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
}

/// Authenticated caller, inserted by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

/// Authentication error
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidTokenFormat,
    ValidationFailed(String),
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let err = match self {
            AuthError::MissingToken => ApiError::unauthenticated("Authorization header is required"),
            AuthError::InvalidTokenFormat => {
                ApiError::unauthenticated("Invalid authorization header format. Expected: Bearer <token>")
            }
            AuthError::ValidationFailed(msg) => {
                tracing::debug!(error = %msg, "Token validation failed");
                ApiError::unauthenticated("Invalid token")
            }
            AuthError::TokenExpired => ApiError::new(
                axum::http::StatusCode::UNAUTHORIZED,
                "TOKEN_EXPIRED",
                "Token has expired",
            ),
        };
        err.into_response()
    }
}

/// Shared JWT verification state
#[derive(Clone)]
pub struct AuthState {
    key: Arc<DecodingKey>,
}

impl AuthState {
    pub fn new(secret: &str) -> Self {
        Self {
            key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
        }
    }

    /// Validate an HS256 token and return its claims
    pub fn validate(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<AuthClaims>(token, &self.key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::ValidationFailed(e.to_string()),
            })
    }
}

/// Extract the token from a `Bearer <token>` header value
pub fn extract_token(auth_header: &str) -> Result<&str, AuthError> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::InvalidTokenFormat)
}

/// Require authentication middleware
pub async fn require_auth(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = extract_token(auth_header)?;
    let claims = auth.validate(token)?;

    request.extensions_mut().insert(AuthUser(claims.sub));

    Ok(next.run(request).await)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    pub const SECRET: &str = "test-secret-for-unit-testing-only-0123456789";

    pub fn token_for(user_id: &str, ttl_secs: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = AuthClaims {
            sub: user_id.to_string(),
            exp: u64::try_from(now + ttl_secs).unwrap(),
            iat: u64::try_from(now).unwrap(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token("Bearer abc123").unwrap(), "abc123");
        assert!(extract_token("Basic abc123").is_err());
        assert!(extract_token("Bearer ").is_err());
    }

    #[test]
    fn test_validate_token() {
        let auth = AuthState::new(SECRET);
        let claims = auth.validate(&token_for("user-1", 3600)).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn test_expired_token() {
        let auth = AuthState::new(SECRET);
        assert!(matches!(auth.validate(&token_for("user-1", -3600)), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret() {
        let auth = AuthState::new("another-secret-that-is-long-enough-000000");
        assert!(matches!(auth.validate(&token_for("user-1", 3600)), Err(AuthError::ValidationFailed(_))));
    }
}
