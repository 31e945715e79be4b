//! Process-local implementation of the store ports.
//!
//! Rows live in `BTreeMap`s behind `tokio::sync::RwLock`s so that a
//! conditional update can compare and bump the version while holding the
//! write lock. Secondary indexes (email → user, token hash → token,
//! user → permissions) are `scc::HashMap`s.
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    core::{
        authorization::Permissions,
        error::StoreError,
        filters::Metadata,
        identity::User,
        movie::Movie,
        token::{Scope, Token, TokenHash, hash_plaintext},
        versioning::apply_conditional,
    },
    ports::{MovieQuery, MovieStore, PermissionStore, StoreResult, TokenStore, UserStore},
};

#[derive(Debug)]
pub struct InMemoryStore {
    next_movie_id: AtomicI64,
    next_user_id: AtomicI64,
    movies: RwLock<BTreeMap<i64, Movie>>,
    users: RwLock<BTreeMap<i64, User>>,
    emails: scc::HashMap<String, i64>,
    tokens: scc::HashMap<TokenHash, Token>,
    permissions: scc::HashMap<i64, Vec<String>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            next_movie_id: AtomicI64::new(1),
            next_user_id: AtomicI64::new(1),
            movies: RwLock::new(BTreeMap::new()),
            users: RwLock::new(BTreeMap::new()),
            emails: scc::HashMap::new(),
            tokens: scc::HashMap::new(),
            permissions: scc::HashMap::new(),
        }
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

fn matches_query(movie: &Movie, title: &str, genres: &[String]) -> bool {
    let title_ok =
        title.is_empty() || movie.title.to_lowercase().contains(&title.to_lowercase());
    let genres_ok = genres.iter().all(|wanted| movie.genres.contains(wanted));
    title_ok && genres_ok
}

#[async_trait]
impl MovieStore for InMemoryStore {
    async fn insert(&self, movie: &mut Movie) -> StoreResult<()> {
        movie.id = self.next_movie_id.fetch_add(1, Ordering::Relaxed);
        movie.created_at = Utc::now();
        movie.version = 1;
        self.movies.write().await.insert(movie.id, movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> StoreResult<Movie> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.movies
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &mut Movie) -> StoreResult<()> {
        let mut movies = self.movies.write().await;
        let row = movies.get_mut(&movie.id);
        movie.version = apply_conditional(row, movie.clone())?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.movies
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn list(&self, query: &MovieQuery) -> StoreResult<(Vec<Movie>, Metadata)> {
        let movies = self.movies.read().await;
        let mut matching: Vec<&Movie> = movies
            .values()
            .filter(|movie| matches_query(movie, &query.title, &query.genres))
            .collect();
        matching.sort_by(|a, b| query.filters.compare_movies(a, b));

        let total = i64::try_from(matching.len())
            .map_err(|e| StoreError::Backend(format!("record count overflow: {e}")))?;
        let page = matching
            .into_iter()
            .skip(query.filters.offset())
            .take(query.filters.limit())
            .cloned()
            .collect();

        Ok((
            page,
            Metadata::calculate(total, query.filters.page, query.filters.page_size),
        ))
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn insert(&self, user: &mut User) -> StoreResult<()> {
        let id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        self.emails
            .insert_async(user.email.clone(), id)
            .await
            .map_err(|_| StoreError::DuplicateEmail)?;

        user.id = id;
        user.created_at = Utc::now();
        user.version = 1;
        self.users.write().await.insert(id, user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let id = self
            .emails
            .get_async(email)
            .await
            .map(|entry| *entry.get())
            .ok_or(StoreError::NotFound)?;
        self.user_by_id(id).await
    }

    async fn update(&self, user: &mut User) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let previous_email = users.get(&user.id).map(|stored| stored.email.clone());

        let email_changed = previous_email
            .as_deref()
            .is_some_and(|previous| previous != user.email);
        if email_changed {
            self.emails
                .insert_async(user.email.clone(), user.id)
                .await
                .map_err(|_| StoreError::DuplicateEmail)?;
        }

        match apply_conditional(users.get_mut(&user.id), user.clone()) {
            Ok(version) => {
                user.version = version;
                if let (true, Some(previous)) = (email_changed, previous_email) {
                    self.emails.remove_async(&previous).await;
                }
                Ok(())
            }
            Err(e) => {
                if email_changed {
                    self.emails.remove_async(&user.email).await;
                }
                Err(e)
            }
        }
    }

    async fn get_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User> {
        let hash = hash_plaintext(plaintext);
        let now = Utc::now();
        let user_id = self
            .tokens
            .get_async(&hash)
            .await
            .and_then(|entry| {
                let token = entry.get();
                (token.scope == scope && !token.is_expired_at(now)).then_some(token.user_id)
            })
            .ok_or(StoreError::NotFound)?;
        self.user_by_id(user_id).await
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert(&self, token: &Token) -> StoreResult<()> {
        self.tokens
            .insert_async(token.hash, token.clone())
            .await
            .map_err(|_| StoreError::Backend("token hash collision".to_string()))
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()> {
        self.tokens
            .retain_async(|_, token| !(token.scope == scope && token.user_id == user_id))
            .await;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for InMemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        Ok(self
            .permissions
            .get_async(&user_id)
            .await
            .map(|entry| Permissions(entry.get().clone()))
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> StoreResult<()> {
        let codes: Vec<String> = codes.iter().map(|code| code.to_string()).collect();
        self.permissions
            .entry_async(user_id)
            .await
            .and_modify(|held| {
                for code in &codes {
                    if !held.contains(code) {
                        held.push(code.clone());
                    }
                }
            })
            .or_insert_with(|| codes.clone());
        Ok(())
    }
}
