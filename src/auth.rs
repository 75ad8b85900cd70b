use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};

use crate::errors::AppError;
use crate::storage::session_key;

/// The assistant-service token carried by the caller.
///
/// Rejects with `Unauthorized` (401 + login redirect) when absent.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Hash of the token; sessions, caches and the owner lookup are keyed on it.
    pub fn session_key(&self) -> String {
        session_key(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

        Ok(BearerToken(token.to_string()))
    }
}

/// Caller IP as reported by the proxy in front of the console.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|v| v.to_str().ok()))
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}
