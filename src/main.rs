use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;

use commands::ControlHandle;
use models::settings::{AppConfig, AppState, APP_NAME};
use services::diagnostic_logger;
use services::gql_client::GqlClient;
use services::scheduler::Scheduler;
use services::store_service::{FileStore, Store};
use services::telegram_service::TelegramService;
use utils::control_server;

mod commands;
mod error;
mod models;
mod services;
mod utils;

fn load_config() -> AppConfig {
    match confy::load::<AppConfig>(APP_NAME, None) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[Main] Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config();
    diagnostic_logger::init_logging(&config.log_level, config.diagnostics);
    info!("🚀 {} v{} starting", APP_NAME, env!("CARGO_PKG_VERSION"));

    let data_dir = config.resolved_data_dir();
    let file_store = FileStore::open(data_dir.clone())
        .await
        .with_context(|| format!("could not open state directory {}", data_dir.display()))?;
    let store = Store::new(Arc::new(file_store));
    info!("💾 State directory: {}", data_dir.display());

    let api = GqlClient::new(store.clone(), config.client_id.clone(), config.auth_token.clone())
        .context("could not build the HTTP client")?;
    let messenger = TelegramService::new(store.clone());
    let mut state = AppState::new(Arc::new(api), store, Arc::new(messenger));

    match state.farming.restore().await {
        Ok(true) => info!("🔄 Resumed previous farming session"),
        Ok(false) => {}
        Err(e) => warn!("⚠️ Could not restore farming session: {}", e),
    }

    let (handle, commands) = ControlHandle::channel();
    control_server::start_control_server(&config.control_addr, handle)?;

    let scheduler = Scheduler::new(state, commands).await;
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("⚠️ Could not listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}
