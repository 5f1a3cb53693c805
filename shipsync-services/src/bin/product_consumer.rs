use std::process::ExitCode;
use std::sync::Arc;

use shipsync_services::config::ServiceConfig;
use shipsync_services::runtime::{connect_database, consume_forever};
use shipsync_services::store::PgStore;
use shipsync_services::{telemetry, ProductStockConsumer};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "product consumer exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env()?;
    tracing::info!(
        environment = ?config.environment,
        queue = %config.rabbitmq.queue,
        "starting product consumer"
    );

    let store = Arc::new(PgStore::new(connect_database(&config).await?));
    consume_forever(&config, "products", ProductStockConsumer::new(store)).await
}
