use crate::config::LogLevel;
use tracing_subscriber::EnvFilter;

/// Installs a JSON formatter on stderr. `RUST_LOG`, when set, wins over `level`.
pub fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn default_directives(level: LogLevel) -> String {
    // sqlx logs every statement at info
    format!("{},sqlx=warn", level.as_filter_directive())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directives_are_valid_filters() {
        for level in [LogLevel::Debug, LogLevel::Info, LogLevel::Warn, LogLevel::Error] {
            let directives = default_directives(level);
            assert!(EnvFilter::try_new(&directives).is_ok(), "{directives}");
        }
    }
}
