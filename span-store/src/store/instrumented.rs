use super::{SpanReader, SpanWriter, StoreError};
use crate::metrics::Metrics;
use async_trait::async_trait;
use backtraced_error::error_chain_to_pretty_formatted;
use span_model::{Operation, ServiceName, Span, Trace, TraceId, TraceQueryParameters};
use std::sync::Arc;
use tracing::{debug, error};

fn log_failure<T>(operation: &str, res: Result<T, StoreError>) -> Result<T, StoreError> {
    if let Err(e) = &res {
        let error_chain = error_chain_to_pretty_formatted(e);
        error!("{operation} failed: {error_chain}");
    }
    res
}

/// Records calls, failures and latency of any [`SpanReader`].
pub struct InstrumentedReader<R> {
    inner: R,
    metrics: Arc<Metrics>,
}

impl<R> InstrumentedReader<R> {
    pub fn new(inner: R, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl<R: SpanReader> SpanReader for InstrumentedReader<R> {
    async fn get_services(&self) -> Result<Vec<ServiceName>, StoreError> {
        log_failure("get services", self.inner.get_services().await)
    }

    async fn get_operations(&self, service_name: &str) -> Result<Vec<Operation>, StoreError> {
        log_failure(
            "get operations",
            self.inner.get_operations(service_name).await,
        )
    }

    async fn get_trace(&self, trace_id: TraceId) -> Result<Trace, StoreError> {
        let res = self
            .metrics
            .get_trace
            .observe(self.inner.get_trace(trace_id))
            .await;
        match res {
            // asking for a trace that aged out is routine
            Err(e) if e.is_not_found() => {
                debug!("{e}");
                Err(e)
            }
            res => log_failure("get trace", res),
        }
    }

    async fn find_traces(&self, query: &TraceQueryParameters) -> Result<Vec<Trace>, StoreError> {
        let res = self
            .metrics
            .find_traces
            .observe(self.inner.find_traces(query))
            .await;
        log_failure("find traces", res)
    }

    async fn find_trace_ids(
        &self,
        query: &TraceQueryParameters,
    ) -> Result<Vec<TraceId>, StoreError> {
        let res = self
            .metrics
            .find_trace_ids
            .observe(self.inner.find_trace_ids(query))
            .await;
        log_failure("find trace ids", res)
    }
}

/// Records calls, failures and latency of any [`SpanWriter`].
pub struct InstrumentedWriter<W> {
    inner: W,
    metrics: Arc<Metrics>,
}

impl<W> InstrumentedWriter<W> {
    pub fn new(inner: W, metrics: Arc<Metrics>) -> Self {
        Self { inner, metrics }
    }
}

#[async_trait]
impl<W: SpanWriter> SpanWriter for InstrumentedWriter<W> {
    async fn write_span(&self, span: &Span) -> Result<(), StoreError> {
        debug!(
            span_id = %span.span_id,
            trace_id = %span.trace_id,
            operation_name = %span.operation_name,
            "writing span"
        );
        let res = self
            .metrics
            .write_span
            .observe(self.inner.write_span(span))
            .await;
        log_failure("write span", res)
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::{TimeZone, Utc};
    use span_model::{Process, SpanId, SpanKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FlakyWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SpanWriter for FlakyWriter {
        async fn write_span(&self, span: &Span) -> Result<(), StoreError> {
            // every second call fails
            match self.calls.fetch_add(1, Ordering::SeqCst) % 2 {
                0 => Ok(()),
                _ => Err(StoreError::TraceNotFound {
                    trace_id: span.trace_id,
                }),
            }
        }
    }

    struct MissingTraces;

    #[async_trait]
    impl SpanReader for MissingTraces {
        async fn get_services(&self) -> Result<Vec<ServiceName>, StoreError> {
            Ok(vec!["svc-1".to_string()])
        }

        async fn get_operations(&self, _: &str) -> Result<Vec<Operation>, StoreError> {
            Ok(vec![])
        }

        async fn get_trace(&self, trace_id: TraceId) -> Result<Trace, StoreError> {
            Err(StoreError::TraceNotFound { trace_id })
        }

        async fn find_traces(&self, _: &TraceQueryParameters) -> Result<Vec<Trace>, StoreError> {
            Ok(vec![Trace::default()])
        }

        async fn find_trace_ids(
            &self,
            _: &TraceQueryParameters,
        ) -> Result<Vec<TraceId>, StoreError> {
            Ok(vec![TraceId::new(0, 1), TraceId::new(0, 2)])
        }
    }

    fn span() -> Span {
        Span {
            trace_id: TraceId::new(0, 42),
            span_id: SpanId(1),
            operation_name: "op".to_string(),
            references: vec![],
            flags: 0,
            start_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            duration: Duration::from_millis(3),
            tags: vec![],
            logs: vec![],
            process: Process {
                service_name: "svc-1".to_string(),
                tags: vec![],
            },
            process_id: String::new(),
            warnings: vec![],
            kind: SpanKind::Unspecified,
        }
    }

    #[tokio::test]
    async fn writes_are_counted() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let writer = InstrumentedWriter::new(FlakyWriter::default(), Arc::clone(&metrics));
        let span = span();
        assert!(writer.write_span(&span).await.is_ok());
        assert!(writer.write_span(&span).await.is_err());
        assert!(writer.write_span(&span).await.is_ok());
        assert_eq!(metrics.write_span.calls.get(), 3);
        assert_eq!(metrics.write_span.errors.get(), 1);
        assert!(writer.close().await.is_ok());
    }

    #[tokio::test]
    async fn reads_are_counted_per_operation() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let reader = InstrumentedReader::new(MissingTraces, Arc::clone(&metrics));
        let query = TraceQueryParameters::default();

        assert_eq!(reader.find_trace_ids(&query).await.unwrap().len(), 2);
        assert_eq!(reader.find_traces(&query).await.unwrap().len(), 1);
        let missing = reader.get_trace(TraceId::new(0, 9)).await.unwrap_err();
        assert!(missing.is_not_found());
        assert_eq!(reader.get_services().await.unwrap(), vec!["svc-1"]);

        assert_eq!(metrics.find_trace_ids.calls.get(), 1);
        assert_eq!(metrics.find_trace_ids.errors.get(), 0);
        assert_eq!(metrics.find_traces.calls.get(), 1);
        assert_eq!(metrics.get_trace.calls.get(), 1);
        assert_eq!(metrics.get_trace.errors.get(), 1);
    }
}
