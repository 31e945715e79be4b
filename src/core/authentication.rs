//! Maps the `Authorization` header of a request to an [`Identity`].
//!
//! A missing (or empty) header is not a failure: it resolves to the
//! anonymous identity. A header that is present but malformed, and a
//! well-formed token that does not resolve to a user, both surface as
//! [`AppError::InvalidCredential`] so that callers cannot probe which tokens
//! exist.
use http::HeaderValue;

use crate::core::{
    error::{AppError, AppResult, StoreError},
    identity::Identity,
    models::Models,
    token::{Scope, validate_token_plaintext},
    validator::Validator,
};

/// A bearer token that has passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCredential(String);

impl AuthCredential {
    /// Parse an `Authorization` header value.
    ///
    /// Returns `Ok(None)` when no credential was presented.
    pub fn from_header(value: Option<&HeaderValue>) -> AppResult<Option<Self>> {
        let Some(value) = value else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }

        let value = value.to_str().map_err(|_| AppError::InvalidCredential)?;
        let mut parts = value.split(' ');
        let token = match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(token), None) => token,
            _ => return Err(AppError::InvalidCredential),
        };

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, token);
        if !v.valid() {
            return Err(AppError::InvalidCredential);
        }

        Ok(Some(Self(token.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolve the identity behind an optional `Authorization` header.
pub async fn resolve(header: Option<&HeaderValue>, models: &Models) -> AppResult<Identity> {
    let Some(credential) = AuthCredential::from_header(header)? else {
        return Ok(Identity::Anonymous);
    };

    match models
        .bounded(
            models
                .users
                .get_for_token(Scope::Authentication, credential.as_str()),
        )
        .await
    {
        Ok(user) => Ok(Identity::from(user)),
        Err(StoreError::NotFound) => Err(AppError::InvalidCredential),
        Err(e) => Err(AppError::internal(e)),
    }
}
