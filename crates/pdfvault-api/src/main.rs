use anyhow::Result;
use pdfvault_api::setup::{database, routes, server, services, telemetry};
use pdfvault_core::Config;
use pdfvault_storage::create_storage;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let config = Config::from_env()?;
    tracing::info!(
        environment = %config.environment,
        storage_backend = %config.storage_backend,
        chunk_size_bytes = config.chunk_size_bytes,
        "Starting pdfvault-api"
    );

    let pool = database::create_pool(&config).await?;
    let storage = create_storage(&config).await?;

    let port = config.server_port;
    let state = services::build_app_state(config, pool, storage);
    let router = routes::build_router(state.clone());

    let result = server::serve(router, port).await;

    state.task_queue.shutdown().await;

    result
}
