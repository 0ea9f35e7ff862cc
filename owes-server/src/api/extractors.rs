//! Custom Axum extractors for request authentication.
//!
//! Provides `AdminAuth`, which verifies the `Owes-Admin-Authorization`
//! header against the argon2 hash of the admin secret.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Header carrying the plaintext admin secret.
pub const ADMIN_AUTH_HEADER: &str = "Owes-Admin-Authorization";

/// An Axum extractor that verifies the admin secret.
///
/// The header value is the plaintext secret; it is verified against the
/// argon2 hash held in [`AppState`]. Implements `FromRequestParts` so it
/// can be combined with `Json<T>`, `Path<T>`, etc.
pub struct AdminAuth;

/// Errors returned by the [`AdminAuth`] extractor.
#[derive(Debug, thiserror::Error)]
pub enum AdminAuthError {
    #[error("missing Owes-Admin-Authorization header")]
    MissingHeader,
    #[error("invalid Owes-Admin-Authorization header")]
    InvalidHeader,
    #[error("admin secret verification failed")]
    VerificationFailed,
    #[error("stored admin secret hash is malformed")]
    MalformedHash,
}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AdminAuthError::MissingHeader => (
                StatusCode::UNAUTHORIZED,
                "missing Owes-Admin-Authorization header",
            ),
            AdminAuthError::InvalidHeader => (
                StatusCode::BAD_REQUEST,
                "invalid Owes-Admin-Authorization header",
            ),
            AdminAuthError::VerificationFailed => {
                (StatusCode::UNAUTHORIZED, "admin secret verification failed")
            }
            AdminAuthError::MalformedHash => {
                tracing::error!("Stored admin secret hash failed to parse");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        (status, message).into_response()
    }
}

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminAuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        use argon2::{Argon2, PasswordHash, PasswordVerifier};

        let provided = parts
            .headers
            .get(ADMIN_AUTH_HEADER)
            .ok_or(AdminAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AdminAuthError::InvalidHeader)?
            .to_owned();

        let stored = state.admin_secret_hash.read().await.clone();
        let hash = PasswordHash::new(&stored).map_err(|_| AdminAuthError::MalformedHash)?;

        Argon2::default()
            .verify_password(provided.as_bytes(), &hash)
            .map_err(|_| AdminAuthError::VerificationFailed)?;

        Ok(AdminAuth)
    }
}
