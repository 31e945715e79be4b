//! Principals: user accounts and the per-request [`Identity`].
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{
    error::{AppError, AppResult},
    validator::{Validator, matches_email},
    versioning::Versioned,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn draft(name: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name,
            email,
            password_hash,
            activated: false,
            version: 0,
        }
    }
}

impl Versioned for User {
    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

/// Who is making the current request.
///
/// The authentication stage attaches exactly one of these to every request
/// that makes it past the limiter; requests without a credential get
/// [`Identity::Anonymous`].
#[derive(Debug, Clone)]
pub enum Identity {
    Anonymous,
    User(Arc<User>),
}

impl Identity {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Identity::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::User(user) => Some(user),
        }
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity::User(Arc::new(user))
    }
}

/// Hash a plaintext password off the async executor.
pub async fn hash_password(plaintext: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(AppError::internal)
    })
    .await
    .map_err(AppError::internal)?
}

/// Check `plaintext` against a stored PHC hash string.
pub async fn password_matches(password_hash: String, plaintext: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash).map_err(AppError::internal)?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AppError::internal(e)),
        }
    })
    .await
    .map_err(AppError::internal)?
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(
        password.len() <= 72,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_user(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
    validate_password_plaintext(v, password);
}
