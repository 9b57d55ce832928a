use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::notifications::RetryPolicy;

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "CAREFLOW";

/// Runtime settings, grouped by the component that consumes them.
///
/// Every section has defaults, so an empty source set yields a runnable
/// development configuration backed by a local SQLite file.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    #[validate]
    pub server: ServerSettings,
    #[validate]
    pub database: DatabaseSettings,
    #[validate]
    pub logging: LoggingSettings,
    #[validate]
    pub dispatch: DispatchSettings,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    #[validate(custom = "validate_ip")]
    pub host: String,
    pub port: u16,
    /// `development`, `test` or `production`
    pub environment: String,
    /// Per-request timeout applied to the whole router
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "development".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AppConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| AppConfigError::Invalid(format!("host '{}' is not an IP address", self.host)))?;
        Ok(SocketAddr::from((ip, self.port)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    #[validate(length(min = 1, message = "database url cannot be empty"))]
    pub url: String,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    /// Apply pending migrations before serving
    pub auto_migrate: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://careflow.db?mode=rwc".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
            acquire_timeout_secs: 30,
            auto_migrate: false,
        }
    }
}

impl DatabaseSettings {
    /// Settings for a private in-memory SQLite database.
    ///
    /// Each `sqlite::memory:` connection opens its own database, so the pool
    /// is pinned to a single connection that is never reaped.
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout_secs: 3600,
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    #[validate(custom = "validate_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Sizing of the in-process event and notification channels.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSettings {
    #[validate(range(min = 1, message = "channel capacity must be greater than 0"))]
    pub event_channel_capacity: usize,
    #[validate(range(min = 1, message = "channel capacity must be greater than 0"))]
    pub notification_queue_capacity: usize,
    /// Retries after the first failed delivery attempt
    #[validate(range(max = 10))]
    pub notification_max_retries: u32,
    /// Doubled on each retry
    pub notification_backoff_ms: u64,
    /// How long shutdown waits for queued notifications to drain
    pub shutdown_drain_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            event_channel_capacity: 1024,
            notification_queue_capacity: 256,
            notification_max_retries: 3,
            notification_backoff_ms: 500,
            shutdown_drain_secs: 10,
        }
    }
}

impl DispatchSettings {
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.notification_max_retries,
            Duration::from_millis(self.notification_backoff_ms),
        )
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to read configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("log_level");
            err.message = Some(format!("unknown log level '{}'", level).into());
            Err(err)
        }
    }
}

fn validate_ip(host: &str) -> Result<(), ValidationError> {
    host.parse::<IpAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("host"))
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(settings: &LoggingSettings) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = env::var("RUST_LOG")
        .ok()
        .filter(|directive| !directive.trim().is_empty())
        .map(EnvFilter::new)
        .unwrap_or_else(|| {
            EnvFilter::new(format!("careflow_api={},tower_http=debug", settings.level))
        });

    let builder = fmt().with_env_filter(filter);
    // A subscriber may already be installed (tests); keep the first one.
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Reads `config/default.toml`, then `config/{RUN_ENV}.toml`, then
/// `CAREFLOW__SECTION__KEY` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| "development".to_string());
    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

pub fn load_config_from(dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    info!(dir = %dir.display(), run_env, "loading configuration");

    let settings: AppConfig = Config::builder()
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?
        .try_deserialize()?;

    settings.validate().map_err(|e| {
        error!(error = %e, "configuration rejected");
        AppConfigError::Validation(e)
    })?;
    Ok(settings)
}
