// Registration, activation and login through the HTTP surface
#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use marquee::{
        AppState, BackgroundTasks, InMemoryStore, Models,
        config::{LimiterConfig, ServerConfig},
        ports::{Mailer, MailerError},
        router,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, recipient: &str, template: &str, data: Value) -> Result<(), MailerError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), template.to_string(), data));
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _: &str, _: &str, _: Value) -> Result<(), MailerError> {
            Err(MailerError::ConnectionError("relay unreachable".to_string()))
        }
    }

    fn app(mailer: Arc<dyn Mailer>) -> (Router, BackgroundTasks) {
        let models = Models::from_store(Arc::new(InMemoryStore::new()), Duration::from_secs(1));
        let config = ServerConfig::builder()
            .limiter(LimiterConfig {
                enabled: false,
                ..LimiterConfig::default()
            })
            .build();
        let state = AppState::new(config, models, mailer).unwrap();
        let tasks = state.tasks.clone();
        (router(state), tasks)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Value, bearer: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        app.clone()
            .oneshot(builder.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn registration() -> Value {
        json!({"name": "Bob", "email": "bob@example.com", "password": "pa55word1234"})
    }

    #[tokio::test]
    async fn test_register_activate_login_and_read() {
        let mailer = Arc::new(RecordingMailer::default());
        let (app, tasks) = app(mailer.clone());

        let response = send(&app, Method::POST, "/v1/users", registration(), None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["user"]["activated"], false);
        assert!(body["user"].get("password").is_none());

        tasks.wait().await;
        let (recipient, template, data) = mailer.sent.lock().unwrap()[0].clone();
        assert_eq!(recipient, "bob@example.com");
        assert_eq!(template, "user_welcome");
        assert_eq!(data["userID"], 1);
        let activation_token = data["activationToken"].as_str().unwrap().to_string();

        // Logging in works before activation, but the catalog stays closed.
        let response = send(
            &app,
            Method::POST,
            "/v1/tokens/authentication",
            json!({"email": "bob@example.com", "password": "pa55word1234"}),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let bearer = body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(bearer.len(), 26);

        let response = send(&app, Method::GET, "/v1/movies", Value::Null, Some(&bearer)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await["error"],
            "your user account must be activated to access this resource"
        );

        // The activation token is not a login credential.
        let response = send(
            &app,
            Method::GET,
            "/v1/movies",
            Value::Null,
            Some(&activation_token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");

        let response = send(
            &app,
            Method::PUT,
            "/v1/users/activated",
            json!({"token": activation_token}),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["user"]["activated"], true);

        let response = send(&app, Method::GET, "/v1/movies", Value::Null, Some(&bearer)).await;
        assert_eq!(response.status(), StatusCode::OK);

        // movies:read only
        let response = send(
            &app,
            Method::POST,
            "/v1/movies",
            json!({"title": "Heat", "year": 1995, "runtime": "170 mins", "genres": ["crime"]}),
            Some(&bearer),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Activation tokens are single use.
        let response = send(
            &app,
            Method::PUT,
            "/v1/users/activated",
            json!({"token": activation_token}),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await["error"]["token"],
            "invalid or expired activation token"
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_field_error() {
        let (app, _) = app(Arc::new(RecordingMailer::default()));

        let response = send(&app, Method::POST, "/v1/users", registration(), None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = send(&app, Method::POST, "/v1/users", registration(), None).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json_body(response).await["error"]["email"],
            "a user with this email address already exists"
        );
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_the_same() {
        let (app, _) = app(Arc::new(RecordingMailer::default()));
        send(&app, Method::POST, "/v1/users", registration(), None).await;

        for credentials in [
            json!({"email": "bob@example.com", "password": "not-the-password"}),
            json!({"email": "carol@example.com", "password": "pa55word1234"}),
        ] {
            let response = send(
                &app,
                Method::POST,
                "/v1/tokens/authentication",
                credentials,
                None,
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(
                json_body(response).await["error"],
                "invalid authentication credentials"
            );
        }
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_affect_the_response() {
        let (app, tasks) = app(Arc::new(FailingMailer));

        let response = send(&app, Method::POST, "/v1/users", registration(), None).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        tasks.wait().await;
        assert_eq!(tasks.outstanding(), 0);
    }
}
