//! In-process request counters exposed on `GET /debug/vars`.
//!
//! Counters are plain atomics; the per-status breakdown lives in an
//! `scc::HashMap` so concurrent responses with different status codes do not
//! contend on one lock.
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct AppMetrics {
    requests_received: AtomicU64,
    responses_sent: AtomicU64,
    processing_time_us: AtomicU64,
    responses_by_status: scc::HashMap<u16, u64>,
}

/// Point-in-time copy of [`AppMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    #[serde(rename = "total_processing_time_μs")]
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl AppMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_response(&self, status: u16, elapsed: Duration) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us.fetch_add(micros, Ordering::Relaxed);
        self.responses_by_status
            .entry_async(status)
            .await
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let mut by_status = BTreeMap::new();
        self.responses_by_status
            .retain_async(|status, count| {
                by_status.insert(status.to_string(), *count);
                true
            })
            .await;

        MetricsSnapshot {
            total_requests_received: self.requests_received.load(Ordering::Relaxed),
            total_responses_sent: self.responses_sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_time_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: by_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_by_status() {
        let metrics = AppMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_request();
        metrics.record_response(200, Duration::from_micros(40)).await;
        metrics.record_response(200, Duration::from_micros(60)).await;
        metrics.record_response(429, Duration::from_micros(5)).await;

        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.total_requests_received, 3);
        assert_eq!(snapshot.total_responses_sent, 3);
        assert_eq!(snapshot.total_processing_time_us, 105);
        assert_eq!(snapshot.total_responses_sent_by_status["200"], 2);
        assert_eq!(snapshot.total_responses_sent_by_status["429"], 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["total_processing_time_μs"], 105);
    }
}
