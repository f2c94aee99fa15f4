use crate::database;
use crate::metrics::Metrics;
use backtraced_error::error_chain_to_pretty_formatted;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(5);

/// Periodically publishes the size of the spans table and its row count.
pub struct MetricSampler {
    con: PgPool,
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl MetricSampler {
    pub fn new(con: PgPool, metrics: Arc<Metrics>) -> Self {
        Self {
            con,
            metrics,
            interval: DEFAULT_SAMPLE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Samples until `cancel` fires, abandoning a sample still in flight.
    /// Failed samples are logged and skipped.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // a hung database must not hold up shutdown
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.sample().instrument(info_span!("metric_sample")) => {}
            }
        }
        info!("metric sampler stopped");
    }

    pub async fn sample(&self) {
        match database::spans_disk_size(&self.con).await {
            Ok(bytes) => self.metrics.spans_table_bytes.set(bytes),
            Err(e) => error!("{}", error_chain_to_pretty_formatted(e)),
        }
        match database::spans_count(&self.con).await {
            Ok(count) => self.metrics.spans_count.set(count),
            Err(e) => error!("{}", error_chain_to_pretty_formatted(e)),
        }
        debug!(
            spans_table_bytes = self.metrics.spans_table_bytes.get(),
            spans_count = self.metrics.spans_count.get(),
            "sampled"
        );
    }
}
