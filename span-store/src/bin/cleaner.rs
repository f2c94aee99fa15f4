use backtraced_error::error_chain_to_pretty_formatted;
use chrono::Utc;
use clap::Parser;
use span_store::background_tasks::{cutoff_from_max_age, RetentionCleaner};
use span_store::config::CleanerConfig;
use span_store::{database, logging};
use std::process::ExitCode;
use tracing::{error, info, instrument};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let config = CleanerConfig::parse();
    logging::init_logging(config.log_level);
    match run(config).await {
        Ok(deleted) => {
            info!("Deleted {deleted} spans");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", error_chain_to_pretty_formatted(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "error", skip_all)]
async fn run(config: CleanerConfig) -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
    info!("Using config: {:#?}", config);
    let con = database::connect_to_db(&config.db).await?;
    database::migrate(&con).await?;
    let cutoff = cutoff_from_max_age(Utc::now(), config.max_span_age());
    info!(%cutoff, "deleting spans older than the cutoff");
    let deleted = RetentionCleaner::new(con.clone())
        .with_timeout(config.clean_timeout())
        .clean(cutoff)
        .await;
    con.close().await;
    Ok(deleted?)
}
