//! Prometheus metrics for the resolution engine

use fedns_core::{CoreError, Result};
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics recorded by lookups, registrations and the event relay
#[derive(Clone)]
pub struct EngineMetrics {
    /// Storage lookups by scope kind
    pub lookups_total: CounterVec,
    /// Failed storage lookups by scope kind
    pub lookup_failures_total: CounterVec,
    /// End-to-end resolution latency in seconds
    pub resolve_duration_seconds: Histogram,
    /// Asset registrations by outcome
    pub registrations_total: CounterVec,
    /// Asset events relayed to a result channel
    pub events_relayed_total: Counter,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl EngineMetrics {
    pub fn new() -> std::result::Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let lookups_total = CounterVec::new(
            Opts::new("fedns_lookups_total", "Registry storage lookups"),
            &["scope"],
        )?;

        let lookup_failures_total = CounterVec::new(
            Opts::new("fedns_lookup_failures_total", "Failed registry storage lookups"),
            &["scope"],
        )?;

        let resolve_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "fedns_resolve_duration_seconds",
            "Domain resolution latency in seconds",
        ))?;

        let registrations_total = CounterVec::new(
            Opts::new("fedns_registrations_total", "Asset registrations by outcome"),
            &["outcome"],
        )?;

        let events_relayed_total = Counter::new(
            "fedns_events_relayed_total",
            "Asset registration events relayed to callers",
        )?;

        registry.register(Box::new(lookups_total.clone()))?;
        registry.register(Box::new(lookup_failures_total.clone()))?;
        registry.register(Box::new(resolve_duration_seconds.clone()))?;
        registry.register(Box::new(registrations_total.clone()))?;
        registry.register(Box::new(events_relayed_total.clone()))?;

        Ok(Self {
            lookups_total,
            lookup_failures_total,
            resolve_duration_seconds,
            registrations_total,
            events_relayed_total,
            registry,
        })
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| CoreError::Internal(format!("failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer)
            .map_err(|e| CoreError::Internal(format!("metrics are not utf-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = EngineMetrics::new().expect("Failed to create metrics");
        assert!(metrics.gather().is_ok());
    }

    #[test]
    fn test_metrics_text_format_structure() {
        let metrics = EngineMetrics::new().expect("Failed to create metrics");
        metrics.lookups_total.with_label_values(&["root"]).inc();
        metrics.registrations_total.with_label_values(&["ok"]).inc();

        let text = metrics.gather().expect("Failed to gather metrics");
        assert!(text.contains("# HELP"));
        assert!(text.contains("# TYPE"));
        assert!(text.contains("fedns_lookups_total{scope=\"root\"} 1"));
        assert!(text.contains("fedns_registrations_total{outcome=\"ok\"} 1"));
    }

    #[test]
    fn test_clones_share_registry() {
        let first = EngineMetrics::new().expect("Failed to create metrics");
        let second = first.clone();
        second.events_relayed_total.inc();
        assert!(first.gather().unwrap().contains("fedns_events_relayed_total 1"));
    }
}
