use std::{
    future::{Future, IntoFuture},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use eyre::{Result, WrapErr, eyre};
use tokio::{signal, sync::broadcast, task::JoinError, time::timeout};

use crate::utils::background::BackgroundTasks;

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Graceful shutdown requested (SIGTERM, SIGINT)
    Graceful,
    /// Triggered from code rather than a signal
    Manual,
    /// The listener stopped on its own or the channel went away
    Force,
}

/// Lifecycle of the process as seen by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownPhase {
    Running = 0,
    Draining = 1,
    Stopped = 2,
}

impl ShutdownPhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ShutdownPhase::Running,
            1 => ShutdownPhase::Draining,
            _ => ShutdownPhase::Stopped,
        }
    }
}

/// Coordinates the single shutdown sequence of the process
pub struct GracefulShutdown {
    /// Broadcast sender for shutdown signals
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    /// Flag indicating if shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    phase: Arc<AtomicU8>,
    /// Maximum time to wait for the listener to drain
    shutdown_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new GracefulShutdown manager with default 5-second listener deadline
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    /// Create a new GracefulShutdown manager with custom timeout
    pub fn with_timeout(shutdown_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            phase: Arc::new(AtomicU8::new(ShutdownPhase::Running as u8)),
            shutdown_timeout,
        }
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Manually trigger shutdown (embedding, tests)
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> Result<()> {
        if self.begin_draining() {
            tracing::info!("Shutdown manually triggered: {:?}", reason);
            let _ = self.shutdown_tx.send(reason);
        }
        Ok(())
    }

    /// Listen for SIGINT and SIGTERM and start the shutdown sequence on the first one
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        #[cfg(unix)]
        {
            use tokio::signal::unix::SignalKind;
            let mut sigterm = signal::unix::signal(SignalKind::terminate())
                .wrap_err("Failed to register SIGTERM handler")?;

            tokio::select! {
                result = signal::ctrl_c() => {
                    result.wrap_err("Failed to listen for SIGINT")?;
                    tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c()
                .await
                .wrap_err("Failed to listen for Ctrl+C")?;
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }

        self.initiate_shutdown(ShutdownReason::Graceful);
        tracing::info!("Signal handler shutting down");
        Ok(())
    }

    /// Move Running → Draining. Only the first caller wins.
    fn begin_draining(&self) -> bool {
        let first = self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            self.phase
                .store(ShutdownPhase::Draining as u8, Ordering::Release);
        }
        first
    }

    fn initiate_shutdown(&self, reason: ShutdownReason) {
        if self.begin_draining() {
            tracing::info!("Processing shutdown signal: {:?}", reason);
            if let Err(e) = self.shutdown_tx.send(reason) {
                tracing::debug!("No shutdown subscribers: {}", e);
            }
        } else {
            tracing::warn!("Shutdown already initiated, ignoring signal");
        }
    }

    /// Wait indefinitely for the shutdown signal; returns at once if it already fired
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        self.shutdown_token().wait_for_shutdown().await
    }

    /// Create a shutdown token that can be used to cancel operations
    pub fn shutdown_token(&self) -> ShutdownToken {
        ShutdownToken {
            receiver: self.subscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }

    /// Owned future for `axum::serve(..).with_graceful_shutdown(..)`.
    pub fn shutdown_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut token = self.shutdown_token();
        async move {
            token.wait_for_shutdown().await;
        }
    }

    /// Drive `server` until shutdown, then drain it and the background tasks.
    ///
    /// The listener gets `shutdown_timeout` to finish in-flight requests; past
    /// that it is aborted and an error is returned, but only after every
    /// background task has completed. The phase is `Stopped` on return.
    pub async fn serve_until_drained<S>(&self, server: S, tasks: &BackgroundTasks) -> Result<()>
    where
        S: IntoFuture<Output = std::io::Result<()>>,
        S::IntoFuture: Send + 'static,
    {
        let mut server = tokio::spawn(server.into_future());

        let early_exit = tokio::select! {
            joined = &mut server => Some(joined),
            reason = self.wait_for_shutdown_signal() => {
                tracing::info!(
                    ?reason,
                    deadline = ?self.shutdown_timeout,
                    "Draining in-flight requests"
                );
                None
            }
        };

        let listener_result = match early_exit {
            Some(joined) => {
                tracing::warn!("Listener stopped before a shutdown signal");
                self.initiate_shutdown(ShutdownReason::Force);
                flatten_server_exit(joined)
            }
            None => match timeout(self.shutdown_timeout, &mut server).await {
                Ok(joined) => flatten_server_exit(joined),
                Err(_) => {
                    server.abort();
                    Err(eyre!(
                        "listener did not drain within {:?}",
                        self.shutdown_timeout
                    ))
                }
            },
        };

        if let Err(e) = &listener_result {
            tracing::error!("Listener shutdown failed: {:#}", e);
        }

        tracing::info!(
            outstanding = tasks.outstanding(),
            "Waiting for background tasks to finish"
        );
        tasks.wait().await;

        self.phase
            .store(ShutdownPhase::Stopped as u8, Ordering::Release);
        tracing::info!("Graceful shutdown completed");
        listener_result
    }
}

fn flatten_server_exit(joined: std::result::Result<std::io::Result<()>, JoinError>) -> Result<()> {
    joined
        .wrap_err("Server task failed")?
        .wrap_err("Server error")
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// A token that can be used to check for shutdown signals
pub struct ShutdownToken {
    receiver: broadcast::Receiver<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.resubscribe(),
            shutdown_initiated: self.shutdown_initiated.clone(),
        }
    }
}

impl ShutdownToken {
    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Wait for shutdown signal (non-blocking check)
    pub fn try_shutdown(&mut self) -> Option<ShutdownReason> {
        match self.receiver.try_recv() {
            Ok(reason) => Some(reason),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => Some(ShutdownReason::Force),
            Err(broadcast::error::TryRecvError::Lagged(_)) => Some(ShutdownReason::Force),
        }
    }

    /// Wait for shutdown signal
    pub async fn wait_for_shutdown(&mut self) -> ShutdownReason {
        if let Some(reason) = self.try_shutdown() {
            return reason;
        }
        // Flag is set before the broadcast, so a token created after the send still returns.
        if self.is_shutdown_initiated() {
            return ShutdownReason::Force;
        }
        match self.receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => ShutdownReason::Force,
        }
    }
}
