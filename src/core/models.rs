//! Handle on the persistence collaborator with a per-call deadline.
use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    core::{
        error::StoreError,
        token::{Scope, Token},
    },
    ports::{MovieStore, PermissionStore, StoreResult, TokenStore, UserStore},
};

/// Bundles the store ports. Cheap to clone.
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    query_timeout: Duration,
}

impl Models {
    /// Use one backend for every port.
    pub fn from_store<S>(store: Arc<S>, query_timeout: Duration) -> Self
    where
        S: MovieStore + UserStore + TokenStore + PermissionStore,
    {
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
            query_timeout,
        }
    }

    /// Run a store call, failing with [`StoreError::Timeout`] once the deadline passes.
    pub async fn bounded<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.query_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(deadline = ?self.query_timeout, "Store call timed out");
                Err(StoreError::Timeout(self.query_timeout))
            }
        }
    }

    /// Mint a token of `scope` for `user_id` and persist its hash.
    pub async fn new_token(&self, user_id: i64, scope: Scope) -> StoreResult<Token> {
        let token = Token::generate(user_id, scope.ttl(), scope);
        self.bounded(self.tokens.insert(&token)).await?;
        tracing::debug!(user_id, scope = scope.as_str(), expiry = %token.expiry, "Issued token");
        Ok(token)
    }
}
