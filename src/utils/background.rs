//! Detached work that the process still waits for on shutdown.
use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures_util::FutureExt;
use tokio::sync::Notify;

use crate::utils::panic::describe_panic;

#[derive(Debug, Default)]
struct Inner {
    outstanding: AtomicUsize,
    drained: Notify,
}

/// Launches fire-and-forget tasks while counting how many are still running.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    inner: Arc<Inner>,
}

/// Decrements the outstanding count when the task ends, however it ends.
struct Registration(Arc<Inner>);

impl Drop for Registration {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.drained.notify_waiters();
        }
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the runtime and return immediately.
    ///
    /// The task is counted before this call returns. Errors and panics are
    /// logged under `name` and go no further.
    pub fn launch<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        let registration = Registration(self.inner.clone());

        tokio::spawn(async move {
            let _registration = registration;
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => tracing::debug!(task = name, "Background task completed"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task failed"),
                Err(payload) => tracing::error!(
                    task = name,
                    panic = %describe_panic(payload.as_ref()),
                    "Background task panicked"
                ),
            }
        });
    }

    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Resolve once no launched task is still running.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register interest before reading the count so a completion in between is not missed.
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;

    #[tokio::test]
    async fn test_wait_returns_immediately_when_idle() {
        let tasks = BackgroundTasks::new();
        tokio::time::timeout(Duration::from_millis(100), tasks.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_blocks_until_tasks_finish() {
        let tasks = BackgroundTasks::new();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        tasks.launch("blocked", async move {
            let _ = release_rx.await;
            Ok(())
        });
        assert_eq!(tasks.outstanding(), 1);

        let waiter = tokio::spawn({
            let tasks = tasks.clone();
            async move { tasks.wait().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        release_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tasks.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_failures_and_panics_are_contained() {
        let tasks = BackgroundTasks::new();
        tasks.launch("fails", async { Err(eyre::eyre!("smtp unreachable")) });
        tasks.launch("panics", async {
            let template: Option<&str> = None;
            let _ = template.expect("template missing");
            Ok(())
        });

        tokio::time::timeout(Duration::from_secs(1), tasks.wait())
            .await
            .unwrap();
        assert_eq!(tasks.outstanding(), 0);
    }
}
