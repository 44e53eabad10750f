//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `buxx_calls_total{operation}` - Committed calls
//! - `buxx_call_failures_total{kind}` - Aborted calls by error kind
//! - `buxx_sponsored_calls_total` - Calls whose fee a paymaster covered
//! - `buxx_sponsorship_rejections_total{reason}` - Sponsorship refusals
//! - `buxx_sponsored_fees_total` - Native units paid by paymasters
//! - `buxx_paymaster_reserve{paymaster}` - Funds available per paymaster
//! - `buxx_gas_used` - Histogram of gas per committed call

use prometheus::{
    Counter, Encoder, GaugeVec, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use ledger_core::{AccountId, NativeAmount};

use crate::error::ErrorKind;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    calls_total: IntCounterVec,
    call_failures: IntCounterVec,
    sponsored_calls: IntCounter,
    sponsorship_rejections: IntCounterVec,
    sponsored_fees: Counter,
    paymaster_reserve: GaugeVec,
    gas_used: Histogram,
    registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create a collector on its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let calls_total = IntCounterVec::new(
            Opts::new("buxx_calls_total", "Committed calls by operation"),
            &["operation"],
        )?;
        registry.register(Box::new(calls_total.clone()))?;

        let call_failures = IntCounterVec::new(
            Opts::new("buxx_call_failures_total", "Aborted calls by error kind"),
            &["kind"],
        )?;
        registry.register(Box::new(call_failures.clone()))?;

        let sponsored_calls = IntCounter::new(
            "buxx_sponsored_calls_total",
            "Calls whose fee a paymaster covered",
        )?;
        registry.register(Box::new(sponsored_calls.clone()))?;

        let sponsorship_rejections = IntCounterVec::new(
            Opts::new(
                "buxx_sponsorship_rejections_total",
                "Sponsorship refusals by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(sponsorship_rejections.clone()))?;

        let sponsored_fees = Counter::new(
            "buxx_sponsored_fees_total",
            "Native units paid by paymasters",
        )?;
        registry.register(Box::new(sponsored_fees.clone()))?;

        let paymaster_reserve = GaugeVec::new(
            Opts::new("buxx_paymaster_reserve", "Funds available per paymaster"),
            &["paymaster"],
        )?;
        registry.register(Box::new(paymaster_reserve.clone()))?;

        let gas_used = Histogram::with_opts(
            HistogramOpts::new("buxx_gas_used", "Gas per committed call").buckets(vec![
                25_000.0, 50_000.0, 75_000.0, 100_000.0, 150_000.0, 250_000.0,
            ]),
        )?;
        registry.register(Box::new(gas_used.clone()))?;

        Ok(Self {
            calls_total,
            call_failures,
            sponsored_calls,
            sponsorship_rejections,
            sponsored_fees,
            paymaster_reserve,
            gas_used,
            registry,
        })
    }

    /// Record a committed call
    pub fn record_call(&self, operation: &str, gas_used: u64) {
        self.calls_total.with_label_values(&[operation]).inc();
        self.gas_used.observe(gas_used as f64);
    }

    /// Record an aborted call
    pub fn record_failure(&self, kind: ErrorKind) {
        self.call_failures.with_label_values(&[kind.as_str()]).inc();
    }

    /// Record a settled sponsorship
    pub fn record_sponsored(&self, fee: NativeAmount) {
        self.sponsored_calls.inc();
        self.sponsored_fees.inc_by(fee as f64);
    }

    /// Record a sponsorship refusal
    pub fn record_rejection(&self, reason: &str) {
        self.sponsorship_rejections.with_label_values(&[reason]).inc();
    }

    /// Update a paymaster's available funds
    pub fn set_paymaster_reserve(&self, paymaster: &AccountId, funds: NativeAmount) {
        let label = paymaster.to_string();
        self.paymaster_reserve
            .with_label_values(&[label.as_str()])
            .set(funds as f64);
    }

    /// Committed calls for `operation`
    pub fn calls(&self, operation: &str) -> u64 {
        self.calls_total.with_label_values(&[operation]).get()
    }

    /// Aborted calls of `kind`
    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.call_failures.with_label_values(&[kind.as_str()]).get()
    }

    /// Settled sponsorships
    pub fn sponsored_calls(&self) -> u64 {
        self.sponsored_calls.get()
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
