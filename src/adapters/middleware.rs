//! The request pipeline, as Axum middleware.
//!
//! From the outside in: [`recover_panic`], [`trace_requests`],
//! [`cors_middleware`], [`rate_limit`], [`authenticate`], then routing and the
//! per-route gates built by [`create_gate_middleware`]. Each stage either
//! passes the request on or answers it without touching later stages.
use std::{
    future::Future,
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    time::Instant,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use tracing::Instrument;

use crate::{
    adapters::http_errors::internal_response,
    core::{
        Admission, ClientRegistry, Models, authentication, authorization::Gate, error::AppError,
        identity::Identity,
    },
    metrics::AppMetrics,
    tracing_setup::create_request_span,
    utils::describe_panic,
};

/// Contain a panic raised anywhere further down the pipeline.
///
/// The caller gets the generic 500 envelope and the connection is marked for closing.
/// The unwind skips [`trace_requests`] on its way out, so the 500 is counted here.
pub async fn recover_panic(
    State(metrics): State<Arc<AppMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            let elapsed = start.elapsed();
            tracing::error!(
                request_method = %method,
                request_url = %uri,
                panic = %describe_panic(payload.as_ref()),
                "Recovered from panic while handling request"
            );
            let mut response = internal_response();
            let status = response.status().as_u16();
            tracing::info!(
                request_method = %method,
                request_url = %uri,
                status,
                latency = ?elapsed,
                "Request completed"
            );
            metrics.record_response(status, elapsed).await;
            response
                .headers_mut()
                .insert(header::CONNECTION, HeaderValue::from_static("close"));
            response
        }
    }
}

/// Run the request inside a `request` span, count it and tag it with `X-Request-ID`.
pub async fn trace_requests(
    State(metrics): State<Arc<AppMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);

    metrics.record_request();
    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;
    let elapsed = start.elapsed();

    let status = response.status().as_u16();
    span.record("http.status_code", status);
    span.record("duration_ms", u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    tracing::info!(parent: &span, status, latency = ?elapsed, "Request completed");
    metrics.record_response(status, elapsed).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", header_value);
    }
    response
}

/// Reflect trusted origins and answer their preflight requests directly.
pub async fn cors_middleware(
    State(trusted_origins): State<Arc<Vec<String>>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .filter(|origin| {
            origin
                .to_str()
                .is_ok_and(|origin| trusted_origins.iter().any(|trusted| trusted == origin))
        })
        .cloned();
    let preflight = req.method() == Method::OPTIONS
        && req
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);

    let mut response = match (&origin, preflight) {
        (Some(_), true) => StatusCode::OK.into_response(),
        _ => next.run(req).await,
    };

    let headers = response.headers_mut();
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    headers.append(
        header::VARY,
        HeaderValue::from_static("Access-Control-Request-Method"),
    );
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        if preflight {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static("OPTIONS, PUT, PATCH, DELETE"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static("Authorization, Content-Type"),
            );
        }
    }
    response
}

/// Address the limiter keys on.
///
/// The peer IP, unless the peer is one of `trusted_proxies`; then the first
/// `X-Forwarded-For` hop or `X-Real-IP` names the client. Forwarded values that
/// are not IP addresses are ignored.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<String> {
    let peer = peer?.ip();
    if !trusted_proxies.contains(&peer) {
        return Some(peer.to_string());
    }

    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next());
    let real_ip = headers
        .get("X-Real-IP")
        .and_then(|value| value.to_str().ok());

    let client = [forwarded, real_ip]
        .into_iter()
        .flatten()
        .find_map(|value| value.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer);
    Some(client.to_string())
}

/// Per-client admission control.
pub async fn rate_limit(
    State(registry): State<Arc<ClientRegistry>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !registry.policy().enabled {
        return Ok(next.run(req).await);
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_address(req.headers(), peer, &registry.policy().trusted_proxies)
        .ok_or_else(|| AppError::internal("client address unavailable"))?;

    match registry.admit(&client) {
        Admission::Allow => Ok(next.run(req).await),
        Admission::Deny => {
            tracing::debug!(client = %client, "Rate limit exceeded");
            Err(AppError::Denied)
        }
    }
}

/// Resolve the bearer credential and attach the [`Identity`] to the request.
pub async fn authenticate(State(models): State<Models>, mut req: Request, next: Next) -> Response {
    let resolved = authentication::resolve(req.headers().get(header::AUTHORIZATION), &models).await;

    let mut response = match resolved {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    };
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// The identity attached by [`authenticate`].
///
/// # Panics
///
/// When called on a request that did not pass through [`authenticate`]; that
/// is a wiring mistake, not a client error.
pub fn current_identity(req: &Request) -> Identity {
    req.extensions()
        .get::<Identity>()
        .cloned()
        .expect("authenticate middleware attaches an identity to every request")
}

/// Reject the request unless `gate` admits the current identity.
pub async fn require_gate(req: Request, next: Next, gate: Gate, models: Models) -> Response {
    let identity = current_identity(&req);
    if let Err(e) = gate.check(&identity, &models).await {
        return e.into_response();
    }
    next.run(req).await
}

/// Create a cloneable closure wrapping [`require_gate`], for `route_layer`.
pub fn create_gate_middleware(
    gate: Gate,
    models: Models,
) -> impl Fn(Request, Next) -> Pin<Box<dyn Future<Output = Response> + Send>> + Clone {
    move |req, next| {
        let models = models.clone();
        Box::pin(async move { require_gate(req, next, gate, models).await })
    }
}
