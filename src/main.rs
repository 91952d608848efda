use std::path::Path;
use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::call_log_service::SqliteCallLogStore;
use crate::services::campaign_service::{CampaignService, Collaborators};
use crate::services::campaign_store::CampaignStore;
use crate::services::dnc_guard::SqliteDncStore;
use crate::services::registry_service::SqliteRegistry;
use crate::services::voice_provider::HttpVoiceProvider;

mod app;
mod config;
mod errors;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(db_path: &Path) -> anyhow::Result<Pool<Sqlite>> {
    // Crear carpeta de la base si no existe
    if let Some(dir) = db_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("No se pudo crear directorio {:?}", dir))?;
    }

    log::info!("Conectando a SQLite en {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite")?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env()?;
    let db_pool = setup_database(&config.database_path).await?;

    let store = CampaignStore::new(db_pool.clone());
    store.run_migrations().await?;

    let registry = Arc::new(SqliteRegistry::new(db_pool.clone()));
    let collaborators = Collaborators {
        provider: Arc::new(HttpVoiceProvider::new(&config.provider)?),
        dnc_store: Arc::new(SqliteDncStore::new(db_pool.clone())),
        assistants: registry.clone(),
        phone_numbers: registry.clone(),
        entitlements: registry,
        call_logs: Arc::new(SqliteCallLogStore::new(db_pool.clone())),
    };
    let campaign_service = CampaignService::new(store, collaborators, &config);

    let bind = (config.bind_host.clone(), config.bind_port);
    log::info!("Levantando servidor en {}:{}", bind.0, bind.1);
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(campaign_service.clone()))
            .app_data(web::JsonConfig::default().limit(10 * 1024 * 1024))
            .configure(app::init_app)
    })
    .bind(bind)?
    .run()
    .await?;

    Ok(())
}
