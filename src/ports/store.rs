use async_trait::async_trait;

use crate::core::{
    authorization::Permissions,
    error::StoreError,
    filters::{Filters, Metadata},
    identity::User,
    movie::Movie,
    token::{Scope, Token},
};

/// Result type alias for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Movie listing criteria.
#[derive(Debug, Clone, Default)]
pub struct MovieQuery {
    /// Case-insensitive substring match on the title; empty matches all
    pub title: String,
    /// Every listed genre must be present on the movie
    pub genres: Vec<String>,
    pub filters: Filters,
}

/// MovieStore defines the port for persisting catalog entries
#[async_trait]
pub trait MovieStore: Send + Sync + 'static {
    /// Persist a new movie, filling in `id`, `created_at` and `version` (starting at 1)
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn get(&self, id: i64) -> StoreResult<Movie>;

    /// Conditionally replace the stored row whose id and version match `movie`.
    ///
    /// On success `movie.version` holds the new version. A stale version, or a
    /// row that no longer exists, yields [`StoreError::EditConflict`].
    async fn update(&self, movie: &mut Movie) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;

    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)>;
}

/// UserStore defines the port for user accounts
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Persist a new user; an existing email yields [`StoreError::DuplicateEmail`]
    async fn insert(&self, user: &mut User) -> StoreResult<()>;

    async fn get_by_email(&self, email: &str) -> StoreResult<User>;

    /// Same conditional semantics as [`MovieStore::update`]
    async fn update(&self, user: &mut User) -> StoreResult<()>;

    /// Resolve an unexpired token of `scope` to the user it belongs to
    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User>;
}

/// TokenStore defines the port for issued bearer tokens
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn insert(&self, token: &Token) -> StoreResult<()>;

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()>;
}

/// PermissionStore defines the port for per-user permission codes
#[async_trait]
pub trait PermissionStore: Send + Sync + 'static {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions>;

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()>;
}
