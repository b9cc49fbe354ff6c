//! # Metrics
//!
//! Prometheus metrics for monitoring the engine.
//!
//! ## Metrics Exposed
//!
//! - `k8s_secrets_issued_total` - Total number of token Secrets issued
//! - `k8s_secrets_issue_failures_total{reason}` - Failed issuance attempts by error reason
//! - `k8s_secrets_issue_duration_seconds` - Duration of successful issuance, poll wait included
//! - `k8s_secrets_poll_attempts_total` - Reads of freshly created Secrets
//! - `k8s_secrets_revoked_total` - Total number of token Secrets revoked
//! - `k8s_secrets_renewed_total` - Total number of lease renewals
//! - `k8s_secrets_wal_replayed_total{outcome}` - Recovery records replayed, by outcome

use anyhow::Result;
use prometheus::core::Collector;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SECRETS_ISSUED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "k8s_secrets_issued_total",
        "Total number of service account token secrets issued",
    )
    .expect("Failed to create SECRETS_ISSUED_TOTAL metric - this should never happen")
});

static ISSUE_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "k8s_secrets_issue_failures_total",
            "Total number of failed issuance attempts",
        ),
        &["reason"],
    )
    .expect("Failed to create ISSUE_FAILURES_TOTAL metric - this should never happen")
});

static ISSUE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "k8s_secrets_issue_duration_seconds",
            "Duration of successful issuance in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create ISSUE_DURATION metric - this should never happen")
});

static POLL_ATTEMPTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "k8s_secrets_poll_attempts_total",
        "Total number of reads of freshly created secrets",
    )
    .expect("Failed to create POLL_ATTEMPTS_TOTAL metric - this should never happen")
});

static SECRETS_REVOKED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "k8s_secrets_revoked_total",
        "Total number of token secrets revoked",
    )
    .expect("Failed to create SECRETS_REVOKED_TOTAL metric - this should never happen")
});

static LEASES_RENEWED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("k8s_secrets_renewed_total", "Total number of lease renewals")
        .expect("Failed to create LEASES_RENEWED_TOTAL metric - this should never happen")
});

static WAL_REPLAYED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "k8s_secrets_wal_replayed_total",
            "Total number of recovery records replayed",
        ),
        &["outcome"],
    )
    .expect("Failed to create WAL_REPLAYED_TOTAL metric - this should never happen")
});

fn register<C: Collector + Clone + 'static>(collector: &C) -> Result<()> {
    match REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Register every metric with [`REGISTRY`]; calling it again is a no-op
pub fn register_metrics() -> Result<()> {
    register(&*SECRETS_ISSUED_TOTAL)?;
    register(&*ISSUE_FAILURES_TOTAL)?;
    register(&*ISSUE_DURATION)?;
    register(&*POLL_ATTEMPTS_TOTAL)?;
    register(&*SECRETS_REVOKED_TOTAL)?;
    register(&*LEASES_RENEWED_TOTAL)?;
    register(&*WAL_REPLAYED_TOTAL)?;

    Ok(())
}

/// Text exposition of everything registered
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_secrets_issued() {
    SECRETS_ISSUED_TOTAL.inc();
}

pub fn increment_issue_failures(reason: &str) {
    ISSUE_FAILURES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_issue_duration(duration: f64) {
    ISSUE_DURATION.observe(duration);
}

pub fn increment_poll_attempts() {
    POLL_ATTEMPTS_TOTAL.inc();
}

pub fn increment_secrets_revoked() {
    SECRETS_REVOKED_TOTAL.inc();
}

pub fn increment_leases_renewed() {
    LEASES_RENEWED_TOTAL.inc();
}

pub fn increment_wal_replayed(outcome: &str) {
    WAL_REPLAYED_TOTAL.with_label_values(&[outcome]).inc();
}
