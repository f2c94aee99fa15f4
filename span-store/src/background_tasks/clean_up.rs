use crate::database;
use backtraced_error::SqlxError;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, info_span, instrument, Instrument};

pub const DEFAULT_MAX_SPAN_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CLEAN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum CleanError {
    #[error("failed to delete old spans")]
    Query {
        #[source]
        source: SqlxError,
    },
    #[error("deleting old spans took longer than {0:?}")]
    Timeout(Duration),
}

/// One shot deletion of spans that started before a cutoff.
#[derive(Debug, Clone)]
pub struct RetentionCleaner {
    con: PgPool,
    timeout: Duration,
}

impl RetentionCleaner {
    pub fn new(con: PgPool) -> Self {
        Self {
            con,
            timeout: DEFAULT_CLEAN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deletes spans with `start_time < cutoff` in a single statement and
    /// returns how many were removed. A timed out delete is rolled back by
    /// Postgres when its connection goes away.
    #[instrument(skip(self))]
    pub async fn clean(&self, cutoff: DateTime<Utc>) -> Result<u64, CleanError> {
        let deleted = tokio::time::timeout(
            self.timeout,
            database::clean_spans(&self.con, cutoff).instrument(info_span!("deleting_old_spans")),
        )
        .await
        .map_err(|_| CleanError::Timeout(self.timeout))?
        .map_err(|source| CleanError::Query { source })?;
        info!("Deleted {deleted} spans");
        Ok(deleted)
    }
}

/// Spans that started before the returned instant are older than `max_age`.
pub fn cutoff_from_max_age(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|max_age| now.checked_sub_signed(max_age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
