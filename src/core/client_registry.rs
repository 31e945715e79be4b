//! Per-client admission control built atop `governor`.
//!
//! Every client address gets its own token bucket, created with full burst
//! capacity on first contact. The registry owns all client state behind one
//! mutex that is shared by [`ClientRegistry::admit`] and the periodic sweep;
//! the lock is only held for the map lookup/mutation, never across I/O.
use std::{
    collections::HashMap,
    net::IpAddr,
    num::NonZeroU32,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use eyre::WrapErr;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use tokio::task::JoinHandle;

use crate::config::models::LimiterConfig;

pub type DirectRateLimiterImpl = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Decision returned by [`ClientRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny,
}

/// Immutable global policy shared by all client buckets.
#[derive(Debug, Clone)]
pub struct LimiterPolicy {
    pub enabled: bool,
    pub quota: Quota,
    pub sweep_interval: Duration,
    pub idle_retention: Duration,
    /// Peers allowed to name the client through forwarding headers
    pub trusted_proxies: Vec<IpAddr>,
}

impl LimiterPolicy {
    /// Build a policy from an average rate (requests per second) and a burst size.
    pub fn new(rps: f64, burst: u32) -> Result<Self, String> {
        if !(rps.is_finite() && rps > 0.0) {
            return Err(format!("Rate limit 'rps' must be positive, got {rps}"));
        }
        let burst = NonZeroU32::new(burst)
            .ok_or_else(|| "Rate limit 'burst' must be greater than 0".to_string())?;

        // One token is replenished every 1/rps seconds, up to `burst` tokens.
        let replenish = Duration::try_from_secs_f64(1.0 / rps)
            .map_err(|e| format!("Rate limit 'rps' of {rps} has no usable refill period: {e}"))?;
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| format!("Invalid replenish period: {replenish:?}"))?
            .allow_burst(burst);

        Ok(Self {
            enabled: true,
            quota,
            sweep_interval: Duration::from_secs(60),
            idle_retention: Duration::from_secs(180),
            trusted_proxies: Vec::new(),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            quota: Quota::per_second(NonZeroU32::MIN),
            sweep_interval: Duration::from_secs(60),
            idle_retention: Duration::from_secs(180),
            trusted_proxies: Vec::new(),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> eyre::Result<Self> {
        let mut policy = Self::new(config.rps, config.burst).map_err(|e| eyre::eyre!(e))?;
        policy.enabled = config.enabled;
        policy.sweep_interval = config.sweep_interval()?;
        policy.idle_retention = config.idle_retention()?;
        policy.trusted_proxies = config
            .trusted_proxies
            .iter()
            .map(|proxy| {
                proxy
                    .parse::<IpAddr>()
                    .wrap_err_with(|| format!("Invalid trusted proxy address: '{proxy}'"))
            })
            .collect::<eyre::Result<_>>()?;
        Ok(policy)
    }
}

struct ClientState {
    limiter: DirectRateLimiterImpl,
    last_seen: Instant,
}

/// Owns every tracked client's bucket and last-seen timestamp.
pub struct ClientRegistry {
    policy: LimiterPolicy,
    clients: Mutex<HashMap<String, ClientState>>,
}

impl ClientRegistry {
    pub fn new(policy: LimiterPolicy) -> Self {
        tracing::info!(
            enabled = policy.enabled,
            quota = ?policy.quota,
            sweep_interval = ?policy.sweep_interval,
            idle_retention = ?policy.idle_retention,
            "Creating client registry"
        );
        Self {
            policy,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &LimiterPolicy {
        &self.policy
    }

    // A poisoned lock only means another request panicked mid-update; the map
    // itself is still structurally sound.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientState>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether a request from `client` may proceed, consuming one token on allow.
    pub fn admit(&self, client: &str) -> Admission {
        if !self.policy.enabled {
            return Admission::Allow;
        }

        let mut clients = self.lock();
        let state = clients
            .entry(client.to_string())
            .or_insert_with(|| ClientState {
                limiter: RateLimiter::direct(self.policy.quota),
                last_seen: Instant::now(),
            });
        state.last_seen = Instant::now();

        if state.limiter.check().is_ok() {
            Admission::Allow
        } else {
            Admission::Deny
        }
    }

    /// Remove clients idle for longer than the retention window, returning how many went.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Sweep as if the current time were `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let retention = self.policy.idle_retention;
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, state| now.saturating_duration_since(state.last_seen) <= retention);
        before - clients.len()
    }

    /// Number of clients currently holding state.
    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    pub fn is_tracked(&self, client: &str) -> bool {
        self.lock().contains_key(client)
    }

    /// Launch the periodic sweep. It runs for the lifetime of the process.
    pub fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.policy.enabled {
            return None;
        }

        let registry = Arc::clone(self);
        let period = self.policy.sweep_interval;
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let removed = registry.sweep();
                if removed > 0 {
                    tracing::debug!(
                        removed,
                        remaining = registry.tracked_clients(),
                        "Swept idle clients from registry"
                    );
                }
            }
        }))
    }
}
