//! Metrics collection for observability.
//!
//! Tracks dispatch latency, failures, connection churn and callback traffic.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Point-in-time snapshot of all metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    // Dispatch counters
    pub requests_total: usize,
    pub requests_success: usize,
    pub requests_failed: usize,
    pub undefined_functions: usize,

    // Latency (milliseconds)
    pub latency_avg_ms: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub latency_min_ms: f64,
    pub latency_max_ms: f64,

    // Connections
    pub connections_total: usize,
    pub connections_active: usize,
    pub connections_max_active: usize,
    pub connection_errors: usize,

    // Callbacks
    pub callbacks_delivered: usize,
    pub callbacks_dropped: usize,

    // Timestamp
    pub timestamp: f64,
}

/// Thread-safe metrics collector shared by every connection of a [`Node`](crate::Node).
///
/// # Example
///
/// ```rust,no_run
/// # async fn demo() {
/// use netfn::Metrics;
///
/// let metrics = Metrics::new();
///
/// let start = metrics.start_request().await;
/// // ... invoke the function ...
/// metrics.end_request(start, true).await;
///
/// let snapshot = metrics.snapshot().await;
/// println!("Avg latency: {}ms", snapshot.latency_avg_ms);
/// # }
/// ```
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    enabled: bool,
    max_latency_samples: usize,

    requests_total: usize,
    requests_success: usize,
    requests_failed: usize,
    undefined_functions: usize,

    connections_total: usize,
    connections_active: usize,
    connections_max_active: usize,
    connection_errors: usize,

    callbacks_delivered: usize,
    callbacks_dropped: usize,

    // Latency samples (circular buffer)
    latencies: VecDeque<f64>,
}

impl Metrics {
    /// Create a new Metrics collector.
    pub fn new() -> Self {
        Self::with_options(1000, true)
    }

    /// Collector that records nothing.
    pub fn disabled() -> Self {
        Self::with_options(0, false)
    }

    /// Create a new Metrics collector with custom options.
    pub fn with_options(max_latency_samples: usize, enabled: bool) -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                enabled,
                max_latency_samples,
                requests_total: 0,
                requests_success: 0,
                requests_failed: 0,
                undefined_functions: 0,
                connections_total: 0,
                connections_active: 0,
                connections_max_active: 0,
                connection_errors: 0,
                callbacks_delivered: 0,
                callbacks_dropped: 0,
                latencies: VecDeque::with_capacity(max_latency_samples),
            })),
        }
    }

    async fn update(&self, f: impl FnOnce(&mut MetricsInner)) {
        let mut inner = self.inner.write().await;
        if inner.enabled {
            f(&mut *inner);
        }
    }

    /// Start tracking a dispatched call.
    ///
    /// Returns start timestamp for later end_request() call.
    pub async fn start_request(&self) -> Instant {
        self.update(|inner| inner.requests_total += 1).await;
        Instant::now()
    }

    /// End tracking a dispatched call.
    ///
    /// Returns latency in milliseconds.
    pub async fn end_request(&self, start_time: Instant, success: bool) -> f64 {
        let latency_ms = start_time.elapsed().as_secs_f64() * 1000.0;

        self.update(|inner| {
            if success {
                inner.requests_success += 1;
            } else {
                inner.requests_failed += 1;
            }

            inner.latencies.push_back(latency_ms);
            if inner.latencies.len() > inner.max_latency_samples {
                inner.latencies.pop_front();
            }
        })
        .await;

        latency_ms
    }

    pub async fn record_undefined_function(&self) {
        self.update(|inner| inner.undefined_functions += 1).await;
    }

    pub async fn record_connection_open(&self) {
        self.update(|inner| {
            inner.connections_total += 1;
            inner.connections_active += 1;
            inner.connections_max_active =
                inner.connections_max_active.max(inner.connections_active);
        })
        .await;
    }

    pub async fn record_connection_close(&self) {
        self.update(|inner| inner.connections_active = inner.connections_active.saturating_sub(1))
            .await;
    }

    pub async fn record_connection_error(&self) {
        self.update(|inner| inner.connection_errors += 1).await;
    }

    pub async fn record_callback_delivered(&self) {
        self.update(|inner| inner.callbacks_delivered += 1).await;
    }

    pub async fn record_callback_dropped(&self) {
        self.update(|inner| inner.callbacks_dropped += 1).await;
    }

    /// Get a point-in-time snapshot of all metrics.
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;

        // Calculate percentiles
        let mut latencies: Vec<f64> = inner.latencies.iter().cloned().collect();
        let (latency_avg, latency_p50, latency_p95, latency_p99, latency_min, latency_max) =
            if !latencies.is_empty() {
                latencies.sort_by(|a, b| a.total_cmp(b));
                let n = latencies.len();
                let p50_idx = (n as f64 * 0.50) as usize;
                let p95_idx = (n as f64 * 0.95) as usize;
                let p99_idx = (n as f64 * 0.99) as usize;

                let latency_avg = latencies.iter().sum::<f64>() / n as f64;
                let latency_p50 = latencies[p50_idx.min(n - 1)];
                let latency_p95 = latencies[p95_idx.min(n - 1)];
                let latency_p99 = latencies[p99_idx.min(n - 1)];
                let latency_min = latencies[0];
                let latency_max = latencies[n - 1];

                (latency_avg, latency_p50, latency_p95, latency_p99, latency_min, latency_max)
            } else {
                (0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
            };

        MetricsSnapshot {
            requests_total: inner.requests_total,
            requests_success: inner.requests_success,
            requests_failed: inner.requests_failed,
            undefined_functions: inner.undefined_functions,
            latency_avg_ms: latency_avg,
            latency_p50_ms: latency_p50,
            latency_p95_ms: latency_p95,
            latency_p99_ms: latency_p99,
            latency_min_ms: latency_min,
            latency_max_ms: latency_max,
            connections_total: inner.connections_total,
            connections_active: inner.connections_active,
            connections_max_active: inner.connections_max_active,
            connection_errors: inner.connection_errors,
            callbacks_delivered: inner.callbacks_delivered,
            callbacks_dropped: inner.callbacks_dropped,
            timestamp: current_timestamp(),
        }
    }

    /// Reset all metrics.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        inner.requests_total = 0;
        inner.requests_success = 0;
        inner.requests_failed = 0;
        inner.undefined_functions = 0;
        inner.connections_total = 0;
        inner.connections_active = 0;
        inner.connections_max_active = 0;
        inner.connection_errors = 0;
        inner.callbacks_delivered = 0;
        inner.callbacks_dropped = 0;
        inner.latencies.clear();
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_request_counters() {
        let metrics = Metrics::new();

        let start = metrics.start_request().await;
        metrics.end_request(start, true).await;
        let start = metrics.start_request().await;
        metrics.end_request(start, false).await;
        metrics.record_undefined_function().await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.requests_total, 2);
        assert_eq!(snap.requests_success, 1);
        assert_eq!(snap.requests_failed, 1);
        assert_eq!(snap.undefined_functions, 1);
    }

    #[tokio::test]
    async fn test_latency_percentiles() {
        let metrics = Metrics::new();
        let start = metrics.start_request().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let latency = metrics.end_request(start, true).await;

        assert!(latency >= 15.0);
        let snap = metrics.snapshot().await;
        assert_eq!(snap.latency_min_ms, snap.latency_max_ms);
        assert!(snap.latency_p99_ms >= 15.0);
    }

    #[tokio::test]
    async fn test_latency_window_is_bounded() {
        let metrics = Metrics::with_options(3, true);
        for _ in 0..10 {
            let start = metrics.start_request().await;
            metrics.end_request(start, true).await;
        }
        assert_eq!(metrics.inner.read().await.latencies.len(), 3);
    }

    #[tokio::test]
    async fn test_connection_tracking() {
        let metrics = Metrics::new();
        metrics.record_connection_open().await;
        metrics.record_connection_open().await;
        metrics.record_connection_close().await;
        metrics.record_connection_close().await;
        metrics.record_connection_close().await;
        metrics.record_connection_error().await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 0);
        assert_eq!(snap.connections_max_active, 2);
        assert_eq!(snap.connection_errors, 1);
    }

    #[tokio::test]
    async fn test_callback_counters_and_reset() {
        let metrics = Metrics::new();
        metrics.record_callback_delivered().await;
        metrics.record_callback_dropped().await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.callbacks_delivered, 1);
        assert_eq!(snap.callbacks_dropped, 1);

        metrics.reset().await;
        let snap = metrics.snapshot().await;
        assert_eq!(snap.callbacks_delivered, 0);
        assert_eq!(snap.latency_avg_ms, 0.0);
    }

    #[tokio::test]
    async fn test_disabled_records_nothing() {
        let metrics = Metrics::disabled();
        let start = metrics.start_request().await;
        metrics.end_request(start, true).await;
        metrics.record_connection_open().await;

        let snap = metrics.snapshot().await;
        assert_eq!(snap.requests_total, 0);
        assert_eq!(snap.connections_total, 0);
    }
}
