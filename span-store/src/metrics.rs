//! Process wide metrics. A single [`Metrics`] is built at startup and shared
//! as `Arc<Metrics>` with every component that records something; nothing
//! registers into the prometheus default registry.

use crate::store::StoreError;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::future::Future;

pub const NAMESPACE: &str = "span_store";

const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Call count, error count and latency of one store operation.
#[derive(Clone)]
pub struct OperationMetrics {
    pub calls: IntCounter,
    pub errors: IntCounter,
    pub seconds: Histogram,
}

impl OperationMetrics {
    fn register(registry: &Registry, operation: &str) -> prometheus::Result<Self> {
        let calls = IntCounter::with_opts(
            Opts::new(
                format!("{operation}_total"),
                format!("Number of {operation} calls"),
            )
            .namespace(NAMESPACE),
        )?;
        let errors = IntCounter::with_opts(
            Opts::new(
                format!("{operation}_errors_total"),
                format!("Number of failed {operation} calls"),
            )
            .namespace(NAMESPACE),
        )?;
        let seconds = Histogram::with_opts(
            HistogramOpts::new(
                format!("{operation}_seconds"),
                format!("Latency of {operation} calls"),
            )
            .namespace(NAMESPACE)
            .buckets(LATENCY_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(calls.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(seconds.clone()))?;
        Ok(Self {
            calls,
            errors,
            seconds,
        })
    }

    /// Counts the call, times it and counts it again as an error if it fails.
    pub async fn observe<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.calls.inc();
        let timer = self.seconds.start_timer();
        let res = call.await;
        timer.observe_duration();
        if res.is_err() {
            self.errors.inc();
        }
        res
    }
}

pub struct Metrics {
    registry: Registry,
    pub get_trace: OperationMetrics,
    pub find_traces: OperationMetrics,
    pub find_trace_ids: OperationMetrics,
    pub write_span: OperationMetrics,
    pub spans_table_bytes: IntGauge,
    pub spans_count: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let get_trace = OperationMetrics::register(&registry, "get_trace")?;
        let find_traces = OperationMetrics::register(&registry, "find_traces")?;
        let find_trace_ids = OperationMetrics::register(&registry, "find_trace_ids")?;
        let write_span = OperationMetrics::register(&registry, "write_span")?;
        let spans_table_bytes = IntGauge::with_opts(
            Opts::new("spans_table_bytes", "Size of the spans table on disk").namespace(NAMESPACE),
        )?;
        let spans_count = IntGauge::with_opts(
            Opts::new("spans_count", "Number of stored spans").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(spans_table_bytes.clone()))?;
        registry.register(Box::new(spans_count.clone()))?;
        Ok(Self {
            registry,
            get_trace,
            find_traces,
            find_trace_ids,
            write_span,
            spans_table_bytes,
            spans_count,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = vec![];
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use span_model::TraceId;

    #[test]
    fn every_metric_is_rendered_under_the_namespace() {
        let metrics = Metrics::new().unwrap();
        metrics.spans_table_bytes.set(8192);
        metrics.spans_count.set(3);
        metrics.write_span.calls.inc();
        let rendered = metrics.render().unwrap();
        for name in [
            "span_store_get_trace_total",
            "span_store_get_trace_errors_total",
            "span_store_get_trace_seconds_bucket",
            "span_store_find_traces_total",
            "span_store_find_trace_ids_total",
            "span_store_write_span_total 1",
            "span_store_spans_table_bytes 8192",
            "span_store_spans_count 3",
        ] {
            assert!(rendered.contains(name), "missing {name} in\n{rendered}");
        }
    }

    #[test]
    fn separate_registries_dont_collide() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.spans_count.set(1);
        assert_eq!(second.spans_count.get(), 0);
    }

    #[tokio::test]
    async fn observe_counts_calls_and_errors() {
        let metrics = Metrics::new().unwrap();
        let ok = metrics.get_trace.observe(async { Ok::<_, StoreError>(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        let failed = metrics
            .get_trace
            .observe(async {
                Err::<(), _>(StoreError::TraceNotFound {
                    trace_id: TraceId::new(0, 1),
                })
            })
            .await;
        assert!(failed.is_err());
        assert_eq!(metrics.get_trace.calls.get(), 2);
        assert_eq!(metrics.get_trace.errors.get(), 1);
        assert_eq!(metrics.get_trace.seconds.get_sample_count(), 2);
    }
}
