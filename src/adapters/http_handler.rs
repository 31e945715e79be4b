//! Routes, handlers and the assembled middleware stack.
use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
};
use eyre::{Result, WrapErr};
use serde::Deserialize;
use serde_json::json;

use crate::{
    adapters::{
        InMemoryStore,
        json_body::JsonBody,
        mailer,
        middleware::{
            authenticate, cors_middleware, create_gate_middleware, rate_limit, recover_panic,
            trace_requests,
        },
    },
    config::models::ServerConfig,
    core::{
        ClientRegistry, LimiterPolicy, Models,
        authorization::Gate,
        error::{AppError, AppResult, StoreError},
        filters::{Filters, MOVIE_SORT_SAFELIST, validate_filters},
        identity::{
            User, hash_password, password_matches, validate_email, validate_password_plaintext,
            validate_user,
        },
        movie::{Movie, Runtime, validate_movie},
        token::{Scope, validate_token_plaintext},
        validator::Validator,
    },
    metrics::AppMetrics,
    ports::{Mailer, MovieQuery},
    utils::BackgroundTasks,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const MOVIES_READ: &str = "movies:read";
const MOVIES_WRITE: &str = "movies:write";
const WELCOME_TEMPLATE: &str = "user_welcome";

/// Everything a handler or pipeline stage may need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub models: Models,
    pub registry: Arc<ClientRegistry>,
    pub tasks: BackgroundTasks,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Arc<AppMetrics>,
}

impl AppState {
    pub fn new(config: ServerConfig, models: Models, mailer: Arc<dyn Mailer>) -> Result<Self> {
        let policy =
            LimiterPolicy::from_config(&config.limiter).wrap_err("Invalid limiter settings")?;
        Ok(Self {
            config: Arc::new(config),
            models,
            registry: Arc::new(ClientRegistry::new(policy)),
            tasks: BackgroundTasks::new(),
            mailer,
            metrics: Arc::new(AppMetrics::new()),
        })
    }

    /// Wire the in-memory store and the configured mailer.
    pub fn from_config(config: ServerConfig) -> Result<Self> {
        let query_timeout = config.store.query_timeout()?;
        let models = Models::from_store(Arc::new(InMemoryStore::new()), query_timeout);
        let mailer = mailer::from_config(&config.mailer)?;
        Self::new(config, models, mailer)
    }
}

/// The application routes, without the outer pipeline.
pub fn routes(state: &AppState) -> Router<AppState> {
    let models = &state.models;

    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .route(
            "/v1/movies",
            get(list_movies)
                .route_layer(middleware::from_fn(create_gate_middleware(
                    Gate::Permitted(MOVIES_READ),
                    models.clone(),
                )))
                .merge(post(create_movie).route_layer(middleware::from_fn(
                    create_gate_middleware(Gate::Permitted(MOVIES_WRITE), models.clone()),
                ))),
        )
        .route(
            "/v1/movies/{id}",
            get(show_movie)
                .route_layer(middleware::from_fn(create_gate_middleware(
                    Gate::Permitted(MOVIES_READ),
                    models.clone(),
                )))
                .merge(patch(update_movie).delete(delete_movie).route_layer(
                    middleware::from_fn(create_gate_middleware(
                        Gate::Permitted(MOVIES_WRITE),
                        models.clone(),
                    )),
                )),
        )
        .route("/v1/users", post(register_user))
        .route("/v1/users/activated", put(activate_user))
        .route("/v1/tokens/authentication", post(create_authentication_token))
        .route("/debug/vars", get(debug_vars))
}

/// Wrap `routes` in the request pipeline and bind the state.
pub fn pipeline(routes: Router<AppState>, state: AppState) -> Router {
    let trusted_origins = Arc::new(state.config.cors.trusted_origins.clone());

    routes
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(middleware::from_fn_with_state(
            state.models.clone(),
            authenticate,
        ))
        .layer(middleware::from_fn_with_state(
            state.registry.clone(),
            rate_limit,
        ))
        .layer(middleware::from_fn_with_state(
            trusted_origins,
            cors_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            trace_requests,
        ))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            recover_panic,
        ))
        .with_state(state)
}

pub fn router(state: AppState) -> Router {
    pipeline(routes(&state), state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn method_not_allowed(method: Method) -> AppError {
    AppError::MethodNotAllowed(method.to_string())
}

async fn healthcheck(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.config.env,
            "version": VERSION,
        }
    }))
}

async fn debug_vars(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot().await;
    Json(json!({
        "version": VERSION,
        "metrics": snapshot,
        "background_tasks": state.tasks.outstanding(),
        "limiter_clients": state.registry.tracked_clients(),
    }))
}

/// Ids are positive integers; anything else names no resource.
fn parse_id(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::NotFound),
    }
}

fn read_int(params: &HashMap<String, String>, key: &str, default: i64, v: &mut Validator) -> i64 {
    match params.get(key).map(String::as_str) {
        None | Some("") => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

fn read_csv(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    match params.get(key).map(String::as_str) {
        None | Some("") => Vec::new(),
        Some(raw) => raw.split(',').map(str::to_string).collect(),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct MovieInput {
    title: String,
    year: i32,
    runtime: Runtime,
    genres: Vec<String>,
}

async fn create_movie(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<MovieInput>,
) -> AppResult<Response> {
    let mut movie = Movie::draft(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    let models = &state.models;
    models.bounded(models.movies.insert(&mut movie)).await?;

    let mut response = (StatusCode::CREATED, Json(json!({ "movie": movie }))).into_response();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let models = &state.models;
    let movie = models.bounded(models.movies.get(id)).await?;
    Ok(Json(json!({ "movie": movie })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct MovieUpdateInput {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    genres: Option<Vec<String>>,
}

/// Version the caller expects to overwrite, if it named one.
fn expected_version(headers: &HeaderMap) -> AppResult<Option<i32>> {
    let Some(raw) = headers.get("X-Expected-Version") else {
        return Ok(None);
    };
    raw.to_str()
        .ok()
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .map(Some)
        .ok_or_else(|| AppError::BadRequest("X-Expected-Version must be an integer".to_string()))
}

async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<MovieUpdateInput>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let expected = expected_version(&headers)?;
    let models = &state.models;

    let mut movie = models.bounded(models.movies.get(id)).await?;
    if let Some(version) = expected {
        movie.version = version;
    }

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    models.bounded(models.movies.update(&mut movie)).await?;
    Ok(Json(json!({ "movie": movie })))
}

async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    let models = &state.models;
    models.bounded(models.movies.delete(id)).await?;
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<serde_json::Value>> {
    let mut v = Validator::new();
    let defaults = Filters::default();
    let query = MovieQuery {
        title: params.get("title").cloned().unwrap_or_default(),
        genres: read_csv(&params, "genres"),
        filters: Filters {
            page: read_int(&params, "page", defaults.page, &mut v),
            page_size: read_int(&params, "page_size", defaults.page_size, &mut v),
            sort: params
                .get("sort")
                .filter(|sort| !sort.is_empty())
                .cloned()
                .unwrap_or(defaults.sort),
        },
    };
    validate_filters(&mut v, &query.filters, MOVIE_SORT_SAFELIST);
    v.finish()?;

    let models = &state.models;
    let (movies, metadata) = models.bounded(models.movies.list(&query)).await?;
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct RegistrationInput {
    name: String,
    email: String,
    password: String,
}

async fn register_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<RegistrationInput>,
) -> AppResult<Response> {
    let mut v = Validator::new();
    validate_user(&mut v, &input.name, &input.email, &input.password);
    v.finish()?;

    let password_hash = hash_password(input.password).await?;
    let mut user = User::draft(input.name, input.email, password_hash);

    let models = &state.models;
    models.bounded(models.users.insert(&mut user)).await?;
    models
        .bounded(models.permissions.add_for_user(user.id, &[MOVIES_READ]))
        .await?;
    let token = models.new_token(user.id, Scope::Activation).await?;

    let mailer = state.mailer.clone();
    let recipient = user.email.clone();
    let data = json!({
        "activationToken": token.plaintext,
        "userID": user.id,
    });
    state.tasks.launch("send_welcome_email", async move {
        mailer
            .send(&recipient, WELCOME_TEMPLATE, data)
            .await
            .wrap_err("Failed to deliver welcome email")
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "user": user }))).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct ActivationInput {
    token: String,
}

async fn activate_user(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<ActivationInput>,
) -> AppResult<Json<serde_json::Value>> {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &input.token);
    v.finish()?;

    let models = &state.models;
    let mut user = match models
        .bounded(models.users.get_for_token(Scope::Activation, &input.token))
        .await
    {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            return Err(AppError::invalid_field(
                "token",
                "invalid or expired activation token",
            ));
        }
        Err(e) => return Err(e.into()),
    };

    user.activated = true;
    models.bounded(models.users.update(&mut user)).await?;
    models
        .bounded(models.tokens.delete_all_for_user(Scope::Activation, user.id))
        .await?;

    Ok(Json(json!({ "user": user })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
struct CredentialsInput {
    email: String,
    password: String,
}

async fn create_authentication_token(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CredentialsInput>,
) -> AppResult<Response> {
    let mut v = Validator::new();
    validate_email(&mut v, &input.email);
    validate_password_plaintext(&mut v, &input.password);
    v.finish()?;

    let models = &state.models;
    let user = match models.bounded(models.users.get_by_email(&input.email)).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => return Err(AppError::InvalidLogin),
        Err(e) => return Err(e.into()),
    };

    if !password_matches(user.password_hash.clone(), input.password).await? {
        return Err(AppError::InvalidLogin);
    }

    let token = models.new_token(user.id, Scope::Authentication).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "authentication_token": token })),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12").unwrap(), 12);
        assert!(matches!(parse_id("0"), Err(AppError::NotFound)));
        assert!(matches!(parse_id("-3"), Err(AppError::NotFound)));
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound)));
    }

    #[test]
    fn test_expected_version_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(expected_version(&headers).unwrap(), None);
        headers.insert("X-Expected-Version", HeaderValue::from_static("3"));
        assert_eq!(expected_version(&headers).unwrap(), Some(3));
        headers.insert("X-Expected-Version", HeaderValue::from_static("three"));
        assert!(matches!(
            expected_version(&headers),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_query_helpers() {
        let mut params = HashMap::new();
        params.insert("page".to_string(), "x".to_string());
        params.insert("genres".to_string(), "drama,comedy".to_string());

        let mut v = Validator::new();
        assert_eq!(read_int(&params, "page", 1, &mut v), 1);
        assert_eq!(read_int(&params, "page_size", 20, &mut v), 20);
        assert_eq!(v.errors()["page"], "must be an integer value");
        assert_eq!(read_csv(&params, "genres"), ["drama", "comedy"]);
        assert!(read_csv(&params, "missing").is_empty());
    }
}
