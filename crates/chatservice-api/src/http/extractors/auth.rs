//! Static token authentication extractor.
//!
//! Extracts the token from:
//! - `Authorization: Bearer <token>` header
//! - `X-API-Key: <token>` header
//!
//! The presented token is SHA-256 hashed and compared against the hash of the
//! configured token. With no token configured every request is accepted.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use crate::http::error::AppError;
use crate::state::{AppState, hash_token};

/// Authenticated request marker. Extracting this validates the token.
pub struct Authenticated;

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.auth_token_hash.as_deref() {
            None => Ok(Authenticated),
            Some(expected) => verify(&parts.headers, expected).map(|()| Authenticated),
        }
    }
}

/// Check the request headers against the expected token hash.
fn verify(headers: &HeaderMap, expected_hash: &str) -> Result<(), AppError> {
    let token = extract_token(headers)?;
    if hash_token(&token) == expected_hash {
        Ok(())
    } else {
        Err(AppError::Unauthorized(
            "Invalid token. Provide a valid token via 'Authorization: Bearer <token>' or 'X-API-Key: <token>' header.".to_string(),
        ))
    }
}

/// Extract the token from request headers.
fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    // Try Authorization: Bearer <token>
    if let Some(auth) = headers.get("authorization") {
        let auth_str = auth.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".to_string())
        })?;
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Ok(token.trim().to_string());
        }
    }

    // Try X-API-Key header
    if let Some(key) = headers.get("x-api-key") {
        let key_str = key.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid X-API-Key header encoding".to_string())
        })?;
        return Ok(key_str.trim().to_string());
    }

    Err(AppError::Unauthorized(
        "Missing token. Provide via 'Authorization: Bearer <token>' or 'X-API-Key: <token>' header.".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn bearer_token_accepted() {
        let expected = hash_token("s3cret");
        assert!(verify(&headers("authorization", "Bearer s3cret"), &expected).is_ok());
    }

    #[test]
    fn api_key_header_accepted() {
        let expected = hash_token("s3cret");
        assert!(verify(&headers("x-api-key", " s3cret "), &expected).is_ok());
    }

    #[test]
    fn wrong_token_rejected() {
        let expected = hash_token("s3cret");
        let err = verify(&headers("authorization", "Bearer guess"), &expected).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[test]
    fn missing_token_rejected() {
        let expected = hash_token("s3cret");
        let err = verify(&HeaderMap::new(), &expected).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(msg) if msg.starts_with("Missing")));
    }

    #[test]
    fn non_bearer_authorization_falls_through() {
        let expected = hash_token("s3cret");
        let err = verify(&headers("authorization", "Basic abc"), &expected).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
