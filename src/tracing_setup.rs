use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::models::LoggingConfig;

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}")),
    }
}

/// Initialize tracing from the `[logging]` section
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    init_tracing_with_config(&config.level, config.json)
}

/// Initialize tracing with an explicit level and output format
pub fn init_tracing_with_config(level: &str, json_format: bool) -> Result<()> {
    let env_filter = build_filter(level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json_format {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.json().with_current_span(true).with_span_list(false))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
            .wrap_err("Failed to install tracing subscriber")?;
    }

    tracing::info!(level, json = json_format, "Marquee logging initialized");
    Ok(())
}

/// Create a request-scoped tracing span
pub fn create_request_span(method: &str, path: &str, request_id: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        http.method = method,
        http.path = path,
        request.id = request_id,
        http.status_code = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_rejected() {
        // SAFETY: no other test in this module reads RUST_LOG concurrently.
        unsafe { std::env::remove_var("RUST_LOG") };
        assert!(build_filter("marquee=loud").is_err());
        assert!(build_filter("marquee=debug,axum=info").is_ok());
    }

    #[test]
    fn test_request_span_records_later_fields() {
        let span = create_request_span("GET", "/v1/healthcheck", "abc");
        span.record("http.status_code", 200);
        span.record("duration_ms", 3);
    }
}
