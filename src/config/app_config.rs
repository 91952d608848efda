//! config/app_config.rs
//! Configuración global del servicio, leída de variables de entorno (.env).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Conexión con el proveedor de llamadas de voz.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://api.elevenlabs.io".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub database_path: PathBuf,
    pub provider: ProviderConfig,
    /// País por defecto para normalizar teléfonos sin código (ISO alpha-2)
    pub default_country: String,
    /// Máximo de campañas reconciliadas en paralelo por request
    pub reconcile_concurrency: usize,
    pub reconcile_timeout: Duration,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 5022,
            database_path: PathBuf::from("data").join("campaigns.db"),
            provider: ProviderConfig::default(),
            default_country: "TR".to_string(),
            reconcile_concurrency: 4,
            reconcile_timeout: Duration::from_secs(25),
            webhook_secret: None,
            webhook_tolerance_secs: 300,
        }
    }
}

impl AppConfig {
    /// Lee la configuración del entorno; lo que falte queda con el valor por defecto.
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let provider = ProviderConfig {
            base_url: env::var("VOICE_PROVIDER_BASE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or(defaults.provider.base_url),
            api_key: env::var("VOICE_PROVIDER_API_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(parse_var(
                "VOICE_PROVIDER_TIMEOUT_SECS",
                defaults.provider.timeout.as_secs(),
            )?),
        };

        if provider.api_key.is_empty() {
            log::warn!("VOICE_PROVIDER_API_KEY no está definida; el proveedor rechazará las llamadas");
        }

        let reconcile_concurrency: usize =
            parse_var("RECONCILE_CONCURRENCY", defaults.reconcile_concurrency)?;

        Ok(AppConfig {
            bind_host: env::var("BIND_HOST").unwrap_or(defaults.bind_host),
            bind_port: parse_var("BIND_PORT", defaults.bind_port)?,
            database_path: env::var("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            provider,
            default_country: env::var("DEFAULT_COUNTRY")
                .map(|c| c.trim().to_ascii_uppercase())
                .unwrap_or(defaults.default_country),
            reconcile_concurrency: reconcile_concurrency.max(1),
            reconcile_timeout: Duration::from_secs(parse_var(
                "RECONCILE_TIMEOUT_SECS",
                defaults.reconcile_timeout.as_secs(),
            )?),
            webhook_secret: env::var("WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            webhook_tolerance_secs: parse_var(
                "WEBHOOK_TOLERANCE_SECS",
                defaults.webhook_tolerance_secs,
            )?,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Valor inválido para {}: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}
