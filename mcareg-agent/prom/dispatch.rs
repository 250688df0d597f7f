use prometheus::{Encoder, IntCounterVec, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::transport::Endpoint;
use crate::error::Result;
use crate::metrics::dispatch::DispatchMetric;

/// Transfer direction as seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Out,
    In,
}

impl Flow {
    pub fn name(&self) -> &'static str {
        match self {
            Flow::Out => "out",
            Flow::In => "in",
        }
    }
}

/// Counters for dispatched commands and transport traffic
pub struct DispatchMetrics {
    registry: Arc<Registry>,
    counters: HashMap<DispatchMetric, IntCounterVec>,
}

impl DispatchMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        let mut counters = HashMap::new();

        for metric in DispatchMetric::all() {
            let opts = prometheus::Opts::new(metric.name(), metric.help());
            let counter = IntCounterVec::new(opts, metric.labels())?;
            registry.register(Box::new(counter.clone()))?;
            counters.insert(metric, counter);
        }

        Ok(Self { registry, counters })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    fn inc_by(&self, metric: DispatchMetric, labels: &[&str], value: u64) {
        if let Some(counter) = self.counters.get(&metric) {
            counter.with_label_values(labels).inc_by(value);
        }
    }

    pub fn transaction(&self, direction: &str, command: &str) {
        self.inc_by(DispatchMetric::Transactions, &[direction, command], 1);
    }

    pub fn transfer(&self, endpoint: Endpoint, flow: Flow, bytes: usize) {
        self.inc_by(
            DispatchMetric::Bytes,
            &[endpoint.name(), flow.name()],
            bytes as u64,
        );
    }

    pub fn error(&self, kind: &str) {
        self.inc_by(DispatchMetric::Errors, &[kind], 1);
    }

    pub fn flash_settle(&self) {
        self.inc_by(DispatchMetric::FlashSettles, &[], 1);
    }

    /// Prometheus text exposition of every counter
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.transaction("read", "fpga_ctrl");
        metrics.transaction("read", "fpga_ctrl");
        metrics.transfer(Endpoint::Data, Flow::In, 32);
        metrics.error("transport");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains(
            "mcareg_transactions_total{command=\"fpga_ctrl\",direction=\"read\"} 2"
        ));
        assert!(text.contains("mcareg_transfer_bytes_total{direction=\"in\",endpoint=\"data\"} 32"));
        assert!(text.contains("mcareg_errors_total{kind=\"transport\"} 1"));
    }

    #[test]
    fn test_every_metric_registered() {
        let metrics = DispatchMetrics::new().unwrap();
        metrics.flash_settle();
        assert_eq!(metrics.counters.len(), DispatchMetric::all().len());
        assert_eq!(metrics.registry().gather().len(), 1);
        assert!(metrics
            .encode_text()
            .unwrap()
            .contains("mcareg_flash_settles_total 1"));
    }
}
