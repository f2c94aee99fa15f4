use backtraced_error::error_chain_to_pretty_formatted;
use clap::Parser;
use span_store::admin::{self, AdminState};
use span_store::background_tasks::MetricSampler;
use span_store::config::ServerConfig;
use span_store::metrics::Metrics;
use span_store::{database, logging, Store};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

#[tokio::main]
async fn main() -> ExitCode {
    // load env vars so clap can use it when parsing a config
    dotenv::dotenv().ok();
    let config = ServerConfig::parse();
    logging::init_logging(config.log_level);
    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", error_chain_to_pretty_formatted(e.as_ref()));
            ExitCode::FAILURE
        }
    }
}

#[instrument(level = "error", skip_all)]
async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Using config: {:#?}", config);
    let con = database::connect_to_db(&config.db).await?;
    database::migrate(&con).await?;
    let metrics = Arc::new(Metrics::new().map_err(|e| format!("registering metrics: {e}"))?);
    let store = Store::new(con.clone(), Arc::clone(&metrics));

    let cancel = CancellationToken::new();
    let sampler = MetricSampler::new(con.clone(), Arc::clone(&metrics))
        .with_interval(config.metrics_sample_interval());
    let sampler_handle = tokio::spawn(sampler.run(cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutting down"),
            Err(e) => error!("failed to listen for ctrl-c: {e}"),
        }
        shutdown.cancel();
    });

    let router = admin::router(AdminState {
        con: con.clone(),
        metrics,
        reader: store.span_reader(),
    });
    let served = admin::serve(config.admin_listen_addr, router, cancel.clone()).await;
    cancel.cancel();
    sampler_handle.await?;
    store.span_writer().close().await?;
    con.close().await;
    served
}
