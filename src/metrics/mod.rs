//! Metrics surface for the embedding store and its collaborators
//!
//! Counters and gauges are plain atomics, rendered on demand in
//! Prometheus text format v0.0.4 by [`StoreMetrics::export_prometheus`].
//! The HTTP endpoint that serves the rendered text is an external
//! collaborator; this module only produces the payload.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::store::Namespace;

/// Circuit breaker state encoded for the state gauge
/// (0 = Closed, 1 = Open, 2 = HalfOpen)
pub const STATE_CLOSED: u8 = 0;
pub const STATE_OPEN: u8 = 1;
pub const STATE_HALF_OPEN: u8 = 2;

/// Per-breaker metrics, shared between a breaker and the exporter
#[derive(Debug)]
pub struct BreakerMetrics {
    /// Breaker name, e.g. "chimera-store_publish"
    name: String,
    /// Operation class being protected (publish, request)
    operation: String,
    state: AtomicU8,
    opens_total: AtomicU64,
    rejected_total: AtomicU64,
    successes_total: AtomicU64,
    failures_total: AtomicU64,
    state_changes_total: AtomicU64,
}

impl BreakerMetrics {
    pub fn new(name: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operation: operation.into(),
            state: AtomicU8::new(STATE_CLOSED),
            opens_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            successes_total: AtomicU64::new(0),
            failures_total: AtomicU64::new(0),
            state_changes_total: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a state transition; `to_state` is one of the STATE_* constants
    pub fn record_state_change(&self, to_state: u8) {
        self.state.store(to_state, Ordering::Relaxed);
        self.state_changes_total.fetch_add(1, Ordering::Relaxed);
        if to_state == STATE_OPEN {
            self.opens_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a call rejected because the circuit was open
    pub fn record_rejection(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.successes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn current_state(&self) -> u8 {
        self.state.load(Ordering::Relaxed)
    }

    pub fn opens(&self) -> u64 {
        self.opens_total.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }
}

/// Crate-wide metrics registry
///
/// Metric names mirror the store's historical dashboard queries
/// (`vector_store_*`, `nats_circuit_breaker_*`), so exported series stay
/// compatible across the rewrite.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    backup_success_total: AtomicU64,
    backup_failure_total: AtomicU64,
    backup_duration_ms_sum: AtomicU64,
    backup_duration_count: AtomicU64,
    backup_size_bytes: AtomicU64,
    last_backup_timestamp: AtomicU64,
    restore_success_total: AtomicU64,
    restore_failure_total: AtomicU64,
    vector_count_content: AtomicU64,
    vector_count_user: AtomicU64,
    operation_errors_total: AtomicU64,
    breakers: RwLock<Vec<Arc<BreakerMetrics>>>,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a breaker's metrics so they appear in the export
    pub fn register_breaker(&self, breaker: Arc<BreakerMetrics>) {
        self.breakers.write().push(breaker);
    }

    pub fn record_backup_success(&self, duration: Duration, size_bytes: u64, now: DateTime<Utc>) {
        self.backup_success_total.fetch_add(1, Ordering::Relaxed);
        self.backup_duration_ms_sum
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
        self.backup_duration_count.fetch_add(1, Ordering::Relaxed);
        self.backup_size_bytes.store(size_bytes, Ordering::Relaxed);
        self.last_backup_timestamp
            .store(now.timestamp().max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_backup_failure(&self) {
        self.backup_failure_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore_success(&self) {
        self.restore_success_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_restore_failure(&self) {
        self.restore_failure_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation_error(&self) {
        self.operation_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_vector_count(&self, namespace: Namespace, count: u64) {
        match namespace {
            Namespace::Content => self.vector_count_content.store(count, Ordering::Relaxed),
            Namespace::User => self.vector_count_user.store(count, Ordering::Relaxed),
        }
    }

    pub fn vector_count(&self, namespace: Namespace) -> u64 {
        match namespace {
            Namespace::Content => self.vector_count_content.load(Ordering::Relaxed),
            Namespace::User => self.vector_count_user.load(Ordering::Relaxed),
        }
    }

    pub fn backup_successes(&self) -> u64 {
        self.backup_success_total.load(Ordering::Relaxed)
    }

    pub fn backup_failures(&self) -> u64 {
        self.backup_failure_total.load(Ordering::Relaxed)
    }

    /// Seconds since the last successful backup, if any
    pub fn backup_age_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        let last = self.last_backup_timestamp.load(Ordering::Relaxed);
        if last == 0 {
            return None;
        }
        Some((now.timestamp().max(0) as u64).saturating_sub(last))
    }

    /// Render all metrics in Prometheus text format v0.0.4
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        // === Backup metrics ===
        out.push_str("# HELP vector_store_backup_success_total Number of successful backup operations\n");
        out.push_str("# TYPE vector_store_backup_success_total counter\n");
        out.push_str(&format!(
            "vector_store_backup_success_total {}\n",
            self.backup_success_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_backup_failure_total Number of failed backup operations\n");
        out.push_str("# TYPE vector_store_backup_failure_total counter\n");
        out.push_str(&format!(
            "vector_store_backup_failure_total {}\n",
            self.backup_failure_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_backup_duration_seconds Time spent performing backup operations\n");
        out.push_str("# TYPE vector_store_backup_duration_seconds summary\n");
        out.push_str(&format!(
            "vector_store_backup_duration_seconds_sum {:.3}\n",
            self.backup_duration_ms_sum.load(Ordering::Relaxed) as f64 / 1000.0
        ));
        out.push_str(&format!(
            "vector_store_backup_duration_seconds_count {}\n",
            self.backup_duration_count.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_backup_size_bytes Size of the latest backup\n");
        out.push_str("# TYPE vector_store_backup_size_bytes gauge\n");
        out.push_str(&format!(
            "vector_store_backup_size_bytes {}\n",
            self.backup_size_bytes.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_last_backup_timestamp Timestamp of the last successful backup\n");
        out.push_str("# TYPE vector_store_last_backup_timestamp gauge\n");
        out.push_str(&format!(
            "vector_store_last_backup_timestamp {}\n",
            self.last_backup_timestamp.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_restore_success_total Number of successful restore operations\n");
        out.push_str("# TYPE vector_store_restore_success_total counter\n");
        out.push_str(&format!(
            "vector_store_restore_success_total {}\n",
            self.restore_success_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_restore_failure_total Number of failed restore operations\n");
        out.push_str("# TYPE vector_store_restore_failure_total counter\n");
        out.push_str(&format!(
            "vector_store_restore_failure_total {}\n",
            self.restore_failure_total.load(Ordering::Relaxed)
        ));

        out.push_str("# HELP vector_store_operation_errors_total Number of vector operation errors\n");
        out.push_str("# TYPE vector_store_operation_errors_total counter\n");
        out.push_str(&format!(
            "vector_store_operation_errors_total {}\n",
            self.operation_errors_total.load(Ordering::Relaxed)
        ));

        // === Vector counts ===
        out.push_str("# HELP vector_store_vector_count Number of vectors in store\n");
        out.push_str("# TYPE vector_store_vector_count gauge\n");
        out.push_str(&format!(
            "vector_store_vector_count{{index_type=\"content\"}} {}\n",
            self.vector_count_content.load(Ordering::Relaxed)
        ));
        out.push_str(&format!(
            "vector_store_vector_count{{index_type=\"user\"}} {}\n",
            self.vector_count_user.load(Ordering::Relaxed)
        ));

        // === Circuit breakers ===
        let breakers = self.breakers.read();
        if !breakers.is_empty() {
            out.push_str("# HELP nats_circuit_breaker_state Current state of the circuit breaker (0=Closed, 1=Open, 2=HalfOpen)\n");
            out.push_str("# TYPE nats_circuit_breaker_state gauge\n");
            for b in breakers.iter() {
                out.push_str(&format!(
                    "nats_circuit_breaker_state{{name=\"{}\",operation=\"{}\"}} {}\n",
                    b.name,
                    b.operation,
                    b.state.load(Ordering::Relaxed)
                ));
            }

            out.push_str("# HELP nats_circuit_breaker_opens_total Number of transitions to the open state\n");
            out.push_str("# TYPE nats_circuit_breaker_opens_total counter\n");
            for b in breakers.iter() {
                out.push_str(&format!(
                    "nats_circuit_breaker_opens_total{{name=\"{}\",operation=\"{}\"}} {}\n",
                    b.name,
                    b.operation,
                    b.opens_total.load(Ordering::Relaxed)
                ));
            }

            out.push_str("# HELP nats_circuit_breaker_rejected_total Calls rejected while the circuit was open\n");
            out.push_str("# TYPE nats_circuit_breaker_rejected_total counter\n");
            for b in breakers.iter() {
                out.push_str(&format!(
                    "nats_circuit_breaker_rejected_total{{name=\"{}\",operation=\"{}\"}} {}\n",
                    b.name,
                    b.operation,
                    b.rejected_total.load(Ordering::Relaxed)
                ));
            }

            out.push_str("# HELP nats_circuit_breaker_failures_total Total number of circuit breaker failures\n");
            out.push_str("# TYPE nats_circuit_breaker_failures_total counter\n");
            for b in breakers.iter() {
                out.push_str(&format!(
                    "nats_circuit_breaker_failures_total{{name=\"{}\",operation=\"{}\"}} {}\n",
                    b.name,
                    b.operation,
                    b.failures_total.load(Ordering::Relaxed)
                ));
            }

            out.push_str("# HELP nats_circuit_breaker_successes_total Total number of circuit breaker successes\n");
            out.push_str("# TYPE nats_circuit_breaker_successes_total counter\n");
            for b in breakers.iter() {
                out.push_str(&format!(
                    "nats_circuit_breaker_successes_total{{name=\"{}\",operation=\"{}\"}} {}\n",
                    b.name,
                    b.operation,
                    b.successes_total.load(Ordering::Relaxed)
                ));
            }
        }

        out
    }
}
