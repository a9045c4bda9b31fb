use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rec_publisher::api;
use rec_publisher::config::AppConfig;
use rec_publisher::manager::PublishManager;
use rec_publisher::publisher::{CommandVideoGenerator, HttpPublisher};
use rec_publisher::save::SaveStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rec_publisher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let save_path = std::env::var("SAVE_PATH").unwrap_or_else(|_| "save.json".to_string());
    let listen_addr =
        std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:2356".to_string());

    let config = AppConfig::load(&config_path)?;
    let store = Arc::new(SaveStore::load(&save_path)?);

    let upload_service_url = config
        .upload_service_url
        .clone()
        .context("upload_service_url must be configured")?;
    let danmaku_command = config
        .danmaku_cut_command
        .clone()
        .context("danmaku_cut_command must be configured")?;
    let publisher = Arc::new(HttpPublisher::new(upload_service_url));
    let generator = Arc::new(CommandVideoGenerator::new(
        config.early_cut_command.clone(),
        danmaku_command,
    ));

    let manager = Arc::new(PublishManager::new(
        Arc::new(config),
        store,
        publisher,
        generator,
    ));
    let workers = manager.spawn_workers();

    let app = api::router(manager.clone());
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "rec-publisher listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager.clone()))
        .await?;

    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

async fn shutdown_signal(manager: Arc<PublishManager>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    manager.shutdown();
}
