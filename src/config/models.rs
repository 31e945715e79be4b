//! Configuration data structures for marquee.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that a minimal config only needs a listen
//! address. Durations are humantime strings (`"1m"`, `"250ms"`) parsed on demand.
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .wrap_err_with(|| format!("Invalid duration for '{field}': '{value}'"))
}

/// Slowest accepted refill rate: one token every 1000 seconds.
pub const MIN_LIMITER_RPS: f64 = 0.001;
/// Fastest accepted refill rate.
pub const MAX_LIMITER_RPS: f64 = 1_000_000.0;

/// Per-client admission policy applied by the client registry.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LimiterConfig {
    /// When disabled every request is admitted and no client state is kept
    pub enabled: bool,
    /// Average requests per second refilled into each client's bucket
    pub rps: f64,
    /// Bucket capacity (maximum burst)
    pub burst: u32,
    /// How often idle clients are swept from the registry
    pub sweep_interval: String,
    /// Clients not seen for longer than this are removed by the sweep
    pub idle_retention: String,
    /// Peer IPs whose `X-Forwarded-For` / `X-Real-IP` headers name the real client
    pub trusted_proxies: Vec<String>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rps: 2.0,
            burst: 4,
            sweep_interval: "1m".to_string(),
            idle_retention: "3m".to_string(),
            trusted_proxies: Vec::new(),
        }
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Result<Duration> {
        parse_duration("limiter.sweep_interval", &self.sweep_interval)
    }

    pub fn idle_retention(&self) -> Result<Duration> {
        parse_duration("limiter.idle_retention", &self.idle_retention)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for in-flight requests to finish once draining starts
    pub timeout: String,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout: "5s".to_string(),
        }
    }
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("shutdown.timeout", &self.timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// Deadline applied to every call into the persistence collaborator
    pub query_timeout: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            query_timeout: "3s".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn query_timeout(&self) -> Result<Duration> {
        parse_duration("store.query_timeout", &self.query_timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins (scheme://host[:port]) allowed to make cross-origin calls
    pub trusted_origins: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MailerKind {
    /// Write outgoing messages to the log only
    #[default]
    Log,
    /// POST outgoing messages as JSON to `url`
    Webhook,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MailerConfig {
    pub kind: MailerKind,
    pub url: Option<String>,
    pub sender: String,
    pub timeout: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            kind: MailerKind::Log,
            url: None,
            sender: "Marquee <no-reply@marquee.local>".to_string(),
            timeout: "5s".to_string(),
        }
    }
}

impl MailerConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("mailer.timeout", &self.timeout)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub level: String,
    /// JSON lines when true, pretty console output otherwise
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Deployment environment label reported by the healthcheck
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_env() -> String {
    "development".to_string()
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4000".to_string(),
            env: default_env(),
            limiter: LimiterConfig::default(),
            shutdown: ShutdownConfig::default(),
            store: StoreConfig::default(),
            cors: CorsConfig::default(),
            mailer: MailerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.config.env = env.into();
        self
    }

    pub fn limiter(mut self, limiter: LimiterConfig) -> Self {
        self.config.limiter = limiter;
        self
    }

    pub fn trusted_origins(mut self, origins: Vec<String>) -> Self {
        self.config.cors.trusted_origins = origins;
        self
    }

    pub fn mailer(mut self, mailer: MailerConfig) -> Self {
        self.config.mailer = mailer;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.shutdown.timeout = timeout.into();
        self
    }

    pub fn query_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.store.query_timeout = timeout.into();
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
