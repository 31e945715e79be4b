//! Error taxonomy shared by the request pipeline and the handlers.
//!
//! Pipeline stages (limiter, authentication, authorization gates) produce the
//! access variants from locally held state. `NotFound` and `EditConflict`
//! originate from the persistence collaborator as [`StoreError`] and are
//! translated at the handler boundary. Everything unexpected collapses into
//! `Internal`, whose detail is logged but never shown to the caller.
use std::collections::BTreeMap;

use thiserror::Error;

/// Field name → human readable problem, as reported by a failed validation.
pub type FieldErrors = BTreeMap<String, String>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    #[error("rate limit exceeded")]
    Denied,
    #[error("invalid or missing authentication token")]
    InvalidCredential,
    #[error("invalid authentication credentials")]
    InvalidLogin,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("failed validation")]
    FailedValidation(FieldErrors),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn internal(err: impl std::fmt::Display) -> Self {
        AppError::Internal(err.to_string())
    }

    /// Single-field validation failure.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.to_string());
        AppError::FailedValidation(errors)
    }
}

/// Outcome of a call into the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("store call exceeded its {0:?} deadline")]
    Timeout(std::time::Duration),
    #[error("store failure: {0}")]
    Backend(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            StoreError::DuplicateEmail => {
                AppError::invalid_field("email", "a user with this email address already exists")
            }
            other => AppError::internal(other),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
