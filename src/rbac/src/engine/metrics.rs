//! Decision metrics with Prometheus text export
//!
//! Recording is lock-free: counters and a fixed-bucket latency histogram are
//! plain atomics. Percentiles are derived from the histogram only when a
//! snapshot is taken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::engine::decision::DecisionPath;

/// Upper bounds of the latency histogram buckets, in microseconds.
/// Samples above the last bound land in an overflow bucket.
const LATENCY_BUCKETS_US: [u64; 16] = [
    1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 100_000, 1_000_000,
];

/// Engine counters snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Total number of authorization requests
    pub total_requests: u64,

    /// Requests allowed by embedded credential permissions
    pub fast_path_allows: u64,

    /// Requests that consulted the permission store
    pub slow_path_checks: u64,

    /// Number of allowed decisions
    pub allowed_decisions: u64,

    /// Number of denied decisions
    pub denied_decisions: u64,

    /// Permission store failures, including timeouts
    pub store_errors: u64,

    /// Permission cache hits
    pub cache_hits: u64,

    /// Permission cache misses
    pub cache_misses: u64,

    /// Latency percentiles (bucket upper bounds)
    pub latency_p50_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        ratio(self.cache_hits, self.cache_hits + self.cache_misses)
    }

    /// Calculate allow rate
    pub fn allow_rate(&self) -> f64 {
        ratio(self.allowed_decisions, self.allowed_decisions + self.denied_decisions)
    }

    /// Share of requests settled without touching the store
    pub fn fast_path_rate(&self) -> f64 {
        ratio(self.fast_path_allows, self.total_requests)
    }

    /// Render in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        format!(
            r#"# HELP rbac_requests_total Total number of authorization requests
# TYPE rbac_requests_total counter
rbac_requests_total {}

# HELP rbac_fast_path_allows_total Requests allowed from credential claims
# TYPE rbac_fast_path_allows_total counter
rbac_fast_path_allows_total {}

# HELP rbac_slow_path_checks_total Requests checked against the permission store
# TYPE rbac_slow_path_checks_total counter
rbac_slow_path_checks_total {}

# HELP rbac_allowed_total Number of allowed decisions
# TYPE rbac_allowed_total counter
rbac_allowed_total {}

# HELP rbac_denied_total Number of denied decisions
# TYPE rbac_denied_total counter
rbac_denied_total {}

# HELP rbac_store_errors_total Permission store failures
# TYPE rbac_store_errors_total counter
rbac_store_errors_total {}

# HELP rbac_cache_hits_total Permission cache hits
# TYPE rbac_cache_hits_total counter
rbac_cache_hits_total {}

# HELP rbac_cache_misses_total Permission cache misses
# TYPE rbac_cache_misses_total counter
rbac_cache_misses_total {}

# HELP rbac_latency_seconds Decision latency percentiles
# TYPE rbac_latency_seconds summary
rbac_latency_seconds{{quantile="0.5"}} {}
rbac_latency_seconds{{quantile="0.99"}} {}
"#,
            self.total_requests,
            self.fast_path_allows,
            self.slow_path_checks,
            self.allowed_decisions,
            self.denied_decisions,
            self.store_errors,
            self.cache_hits,
            self.cache_misses,
            self.latency_p50_ms / 1000.0,
            self.latency_p99_ms / 1000.0,
        )
    }
}

fn ratio(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Metrics collector
pub struct MetricsCollector {
    total_requests: AtomicU64,
    fast_path_allows: AtomicU64,
    slow_path_checks: AtomicU64,
    allowed_decisions: AtomicU64,
    denied_decisions: AtomicU64,
    store_errors: AtomicU64,

    latency_count: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_buckets: [AtomicU64; LATENCY_BUCKETS_US.len() + 1],
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            fast_path_allows: AtomicU64::new(0),
            slow_path_checks: AtomicU64::new(0),
            allowed_decisions: AtomicU64::new(0),
            denied_decisions: AtomicU64::new(0),
            store_errors: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            latency_sum_ns: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Record a finished decision and the stage that made it
    pub fn record_decision(&self, allowed: bool, path: DecisionPath) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        match path {
            DecisionPath::Token if allowed => {
                self.fast_path_allows.fetch_add(1, Ordering::Relaxed);
            }
            DecisionPath::Store => {
                self.slow_path_checks.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        if allowed {
            self.allowed_decisions.fetch_add(1, Ordering::Relaxed);
        } else {
            self.denied_decisions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a store failure; the request counts as a denied slow-path check
    pub fn record_store_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.slow_path_checks.fetch_add(1, Ordering::Relaxed);
        self.denied_decisions.fetch_add(1, Ordering::Relaxed);
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record decision latency
    pub fn record_latency(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);

        let bucket = LATENCY_BUCKETS_US
            .iter()
            .position(|&bound| micros <= bound)
            .unwrap_or(LATENCY_BUCKETS_US.len());

        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ns.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_metrics(&self) -> EngineMetrics {
        let counts: Vec<u64> = self
            .latency_buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let samples = self.latency_count.load(Ordering::Relaxed);
        let sum_ns = self.latency_sum_ns.load(Ordering::Relaxed);

        EngineMetrics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            fast_path_allows: self.fast_path_allows.load(Ordering::Relaxed),
            slow_path_checks: self.slow_path_checks.load(Ordering::Relaxed),
            allowed_decisions: self.allowed_decisions.load(Ordering::Relaxed),
            denied_decisions: self.denied_decisions.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            cache_hits: 0,
            cache_misses: 0,
            latency_p50_ms: Self::percentile(&counts, 0.50),
            latency_p99_ms: Self::percentile(&counts, 0.99),
            avg_latency_ms: if samples == 0 {
                0.0
            } else {
                sum_ns as f64 / samples as f64 / 1_000_000.0
            },
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        for counter in [
            &self.total_requests,
            &self.fast_path_allows,
            &self.slow_path_checks,
            &self.allowed_decisions,
            &self.denied_decisions,
            &self.store_errors,
            &self.latency_count,
            &self.latency_sum_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        for bucket in &self.latency_buckets {
            bucket.store(0, Ordering::Relaxed);
        }
    }

    /// Upper bound (ms) of the bucket holding the `p` quantile
    fn percentile(counts: &[u64], p: f64) -> f64 {
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return 0.0;
        }

        let target = ((total as f64) * p).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (idx, count) in counts.iter().enumerate() {
            seen += count;
            if seen >= target {
                let bound_us = LATENCY_BUCKETS_US
                    .get(idx)
                    .copied()
                    .unwrap_or(LATENCY_BUCKETS_US[LATENCY_BUCKETS_US.len() - 1]);
                return bound_us as f64 / 1000.0;
            }
        }
        0.0
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
