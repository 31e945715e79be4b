//! Marquee - a JSON API backend for a movie catalog.
//!
//! Marquee serves a versioned REST API over a movie catalog and its user
//! accounts. Every request passes through a fixed pipeline before it reaches a
//! handler, and every mutation of a stored record is guarded by optimistic
//! concurrency control. This library exposes the building blocks so the server
//! can be embedded in tests or composed inside another application.
//!
//! # Features
//! - Movie CRUD with filtering, sorting and pagination metadata
//! - User registration, activation by emailed token and bearer-token login
//! - Three-tier authorization gates (authenticated, activated, permission code)
//! - Per-client token-bucket rate limiting with idle-client sweeping
//! - Panic containment that still answers with a well-formed 500
//! - Exact-origin CORS, including preflight handling
//! - Request metrics exposed on `/debug/vars` and structured tracing via `tracing`
//! - Graceful shutdown that drains in-flight requests and background tasks
//!
//! # Quick Example
//! ```no_run
//! use std::net::SocketAddr;
//!
//! use marquee::{AppState, config::ServerConfig, router};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: ServerConfig = marquee::config::load_config("marquee.toml").await?;
//! let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
//! let app = router(AppState::from_config(cfg)?);
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Persistence and notification delivery are **ports** (traits in [`ports`])
//! with implementations in [`adapters`]. Validation, identity, authorization
//! and the versioning rule live in [`core`] and never touch HTTP types.
//!
//! # Error Handling
//! Startup and wiring return `eyre::Result<T>` with context attached through
//! `WrapErr`. Request handling uses [`core::AppError`], which maps one-to-one
//! onto the JSON error envelope sent to callers.
//!
//! # Concurrency & Data Structures
//! Shared maps use `scc::HashMap`. Rows that need a read-compare-write under
//! one critical section sit behind a `tokio::sync::RwLock`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{AppState, InMemoryStore, router},
    core::{AppError, Models},
    utils::{BackgroundTasks, GracefulShutdown},
};
