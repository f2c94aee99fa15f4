use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, clap::Parser)]
#[clap(about = "Postgres backed span storage")]
pub struct ServerConfig {
    #[clap(flatten)]
    pub db: DbConfig,
    #[clap(long, env, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
    #[clap(long, env, default_value = "0.0.0.0:12346")]
    pub admin_listen_addr: SocketAddr,
    #[clap(long, env, default_value_t = 5)]
    pub metrics_sample_interval_secs: u64,
}

impl ServerConfig {
    pub fn metrics_sample_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_sample_interval_secs.max(1))
    }
}

#[derive(Debug, clap::Parser)]
#[clap(about = "Deletes spans older than the configured maximum age")]
pub struct CleanerConfig {
    #[clap(flatten)]
    pub db: DbConfig,
    #[clap(long, env, value_enum, default_value_t = LogLevel::Warn)]
    pub log_level: LogLevel,
    #[clap(long, env, default_value_t = 24 * 60 * 60)]
    pub max_span_age_secs: u64,
    #[clap(long, env, default_value_t = 60)]
    pub clean_timeout_secs: u64,
}

impl CleanerConfig {
    pub fn max_span_age(&self) -> Duration {
        Duration::from_secs(self.max_span_age_secs)
    }

    pub fn clean_timeout(&self) -> Duration {
        Duration::from_secs(self.clean_timeout_secs)
    }
}

#[derive(clap::Parser)]
pub struct DbConfig {
    #[clap(long = "database-url", env = "DATABASE_URL")]
    pub url: String,
    #[clap(long, env, default_value_t = 20)]
    pub max_db_connections: u16,
    #[clap(long, env, default_value_t = 10)]
    pub connect_timeout_secs: u64,
}

impl Debug for DbConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("max_db_connections", &self.max_db_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("url", &redact_credentials(&self.url))
            .finish()
    }
}

/// Keeps only what follows the last `@`, which is host, port and database name.
fn redact_credentials(url: &str) -> String {
    match url.rsplit_once('@') {
        Some((_, host_and_db)) => format!("<redacted>@{host_and_db}"),
        None => "<redacted>".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
