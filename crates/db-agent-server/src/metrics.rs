// crates/db-agent-server/src/metrics.rs
// ============================================================================
// Module: Server Metrics
// Description: Dependency-light counters and latency buckets.
// Purpose: Back /v1/ops/metrics without a hard observability dependency.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! A thin metrics seam: request counters keyed by route and outcome, plus
//! fixed-boundary latency histograms. Deployments can plug Prometheus or
//! OpenTelemetry behind the same trait without redesign.
//!
//! Security posture: labels are fixed route names, never caller input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Latency bucket boundaries in milliseconds.
pub const LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Request outcome classification for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricOutcome {
    /// Request allowed.
    Allow,
    /// Request denied or failed.
    Deny,
}

impl MetricOutcome {
    /// Returns the stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for request counters and latencies.
pub trait Metrics: Send + Sync {
    /// Records one handled request.
    fn record_request(&self, route: &'static str, outcome: MetricOutcome, elapsed: Duration);

    /// Returns a snapshot payload for the ops endpoint.
    fn snapshot(&self) -> Value {
        Value::Null
    }
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn record_request(&self, _route: &'static str, _outcome: MetricOutcome, _elapsed: Duration) {}
}

// ============================================================================
// SECTION: In-Memory Implementation
// ============================================================================

/// Per-route counter and histogram state.
#[derive(Debug, Default, Clone)]
struct RouteStats {
    /// Allowed request count.
    allow: u64,
    /// Denied request count.
    deny: u64,
    /// Cumulative duration in milliseconds.
    total_duration_ms: u64,
    /// Latency histogram (`LATENCY_BUCKETS_MS.len() + 1` slots).
    histogram: Vec<u64>,
}

/// Mutex-guarded in-memory metrics backing the ops endpoint.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    /// Stats keyed by route label.
    routes: Mutex<BTreeMap<&'static str, RouteStats>>,
}

impl InMemoryMetrics {
    /// Creates an empty metrics store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Metrics for InMemoryMetrics {
    fn record_request(&self, route: &'static str, outcome: MetricOutcome, elapsed: Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let Ok(mut routes) = self.routes.lock() else {
            return;
        };
        let stats = routes.entry(route).or_insert_with(|| RouteStats {
            histogram: vec![0; LATENCY_BUCKETS_MS.len() + 1],
            ..RouteStats::default()
        });
        match outcome {
            MetricOutcome::Allow => stats.allow += 1,
            MetricOutcome::Deny => stats.deny += 1,
        }
        stats.total_duration_ms = stats.total_duration_ms.saturating_add(elapsed_ms);
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| elapsed_ms <= *bound)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        if let Some(count) = stats.histogram.get_mut(slot) {
            *count += 1;
        }
    }

    fn snapshot(&self) -> Value {
        let Ok(routes) = self.routes.lock() else {
            return Value::Null;
        };
        let mut payload = serde_json::Map::new();
        for (route, stats) in routes.iter() {
            payload.insert(
                (*route).to_string(),
                json!({
                    "allow": stats.allow,
                    "deny": stats.deny,
                    "totalDurationMs": stats.total_duration_ms,
                    "latencyBucketsMs": LATENCY_BUCKETS_MS,
                    "latencyHistogram": stats.histogram,
                }),
            );
        }
        Value::Object(payload)
    }
}
