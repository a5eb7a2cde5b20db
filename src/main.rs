use anyhow::Context;
use dotenvy::dotenv;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use querybot::api::create_router;
use querybot::config::AppConfig;
use querybot::db::{ActiveDatabase, DatabaseManager};
use querybot::llm::{GenerationOrchestrator, LlamaServerClient, LocalGenerator, OpenAICloudClient};
use querybot::pipeline::QueryPipeline;
use querybot::security::rbac::PolicyTable;
use querybot::shared::state::AppState;
use querybot::tools::weather::OpenMeteoClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::load()?;
    config.validate()?;

    let policies = match &config.rbac.policies_file {
        Some(path) => {
            let table = PolicyTable::from_file(path)
                .with_context(|| format!("Failed to load role policies from {path}"))?;
            info!("Loaded {} role policies from {path}", table.policies().len());
            table
        }
        None => PolicyTable::builtin(),
    };

    let databases = Arc::new(
        DatabaseManager::connect(
            &config.databases.hospital_url,
            &config.databases.warehouse_url,
            config.databases.pool_size,
        )
        .context("Failed to create database pools")?,
    );

    let local = Arc::new(LlamaServerClient::connect(config.local_llm.clone()).await);
    if !local.available() {
        warn!("Local model unavailable, SQL generation will use the cloud model");
    }
    let cloud = Arc::new(OpenAICloudClient::new(&config.cloud_llm));
    if config.cloud_llm.api_key.is_empty() {
        warn!("cloud_llm.api_key is empty; cloud requests will be rejected by the provider");
    }

    let active = ActiveDatabase::new(config.databases.default_active);
    let pipeline = QueryPipeline::new(
        GenerationOrchestrator::new(local, cloud),
        databases.clone(),
        Arc::new(OpenMeteoClient::new(config.weather.clone())),
        active,
    )
    .with_policies(Arc::new(policies));

    let state = Arc::new(AppState::new(Arc::new(pipeline), databases));
    let app = create_router(state, &config.server.static_dir);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        "querybot listening on http://{addr} (active database: {})",
        config.databases.default_active
    );
    axum::serve(listener, app).await?;
    Ok(())
}
