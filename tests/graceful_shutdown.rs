// Shutdown drains the listener and then every background task
#[cfg(test)]
mod test {
    use std::{
        net::SocketAddr,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use marquee::{
        AppState, InMemoryStore, Models,
        adapters::LogMailer,
        config::ServerConfig,
        router,
        utils::{GracefulShutdown, ShutdownPhase, ShutdownReason},
    };

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_waits_for_background_work() {
        let models = Models::from_store(Arc::new(InMemoryStore::new()), Duration::from_secs(1));
        let state = AppState::new(
            ServerConfig::default(),
            models,
            Arc::new(LogMailer::new("test@marquee.local")),
        )
        .unwrap();
        let tasks = state.tasks.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = Arc::new(GracefulShutdown::with_timeout(Duration::from_secs(2)));
        let server = axum::serve(
            listener,
            router(state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.shutdown_signal());

        let serving = {
            let shutdown = shutdown.clone();
            let tasks = tasks.clone();
            tokio::spawn(async move { shutdown.serve_until_drained(server, &tasks).await })
        };

        let response = reqwest::get(format!("http://{addr}/v1/healthcheck"))
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        tasks.launch("slow_delivery", async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });

        shutdown.trigger_shutdown(ShutdownReason::Manual).unwrap();
        assert_eq!(shutdown.phase(), ShutdownPhase::Draining);

        serving.await.unwrap().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(tasks.outstanding(), 0);
        assert_eq!(shutdown.phase(), ShutdownPhase::Stopped);

        assert!(
            reqwest::get(format!("http://{addr}/v1/healthcheck"))
                .await
                .is_err()
        );
    }
}
