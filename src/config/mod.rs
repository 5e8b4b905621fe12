use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::pricing::cache::CacheSettings;
use crate::pricing::calculator::ExportRates;
use crate::pricing::domain::BaseMaterial;
use crate::pricing::engine::EngineSettings;
use crate::pricing::migration::MigrationStrategy;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pricing: PricingSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pricing: PricingSettings::load()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Deployment knobs for the pricing engine: exchange rates, cache placement
/// and the migration posture.
#[derive(Debug, Clone)]
pub struct PricingSettings {
    pub yuan_to_egp_rate: f64,
    pub cache_enabled: bool,
    pub cache_directory: PathBuf,
    pub cache_ttl_secs: u64,
    pub cache_memory_capacity: usize,
    pub migration_strategy: Option<MigrationStrategy>,
    pub rollout_percentage: u8,
    pub outsourced_materials: Vec<BaseMaterial>,
}

impl PricingSettings {
    fn load() -> Result<Self, ConfigError> {
        let yuan_to_egp_rate = match env::var("PRICING_YUAN_EGP_RATE") {
            Ok(value) => value.parse::<f64>().map_err(|_| ConfigError::InvalidNumber {
                var: "PRICING_YUAN_EGP_RATE",
            })?,
            Err(_) => ExportRates::default().yuan_to_egp,
        };

        let cache_enabled = env::var("PRICING_CACHE_ENABLED")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);
        let cache_directory = env::var("PRICING_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("cache/pricing"));
        let cache_ttl_secs = match env::var("PRICING_CACHE_TTL_SECS") {
            Ok(value) => value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
                var: "PRICING_CACHE_TTL_SECS",
            })?,
            Err(_) => 3600,
        };
        let cache_memory_capacity = match env::var("PRICING_CACHE_MEMORY_CAPACITY") {
            Ok(value) => value.parse::<usize>().map_err(|_| ConfigError::InvalidNumber {
                var: "PRICING_CACHE_MEMORY_CAPACITY",
            })?,
            Err(_) => 1000,
        };

        let migration_strategy = match env::var("PRICING_MIGRATION_STRATEGY") {
            Ok(value) => Some(parse_strategy(&value)?),
            Err(_) => None,
        };
        let rollout_percentage = match env::var("PRICING_ROLLOUT_PERCENTAGE") {
            Ok(value) => value.parse::<u8>().map_err(|_| ConfigError::InvalidNumber {
                var: "PRICING_ROLLOUT_PERCENTAGE",
            })?,
            Err(_) => 0,
        };

        let outsourced_materials = match env::var("PRICING_OUTSOURCED_MATERIALS") {
            Ok(value) => value
                .split(',')
                .map(str::trim)
                .filter(|label| !label.is_empty())
                .map(|label| {
                    BaseMaterial::from_label(label).ok_or(ConfigError::UnknownMaterial {
                        var: "PRICING_OUTSOURCED_MATERIALS",
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            yuan_to_egp_rate,
            cache_enabled,
            cache_directory,
            cache_ttl_secs,
            cache_memory_capacity,
            migration_strategy,
            rollout_percentage,
            outsourced_materials,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            export_rates: ExportRates {
                yuan_to_egp: self.yuan_to_egp_rate,
                ..ExportRates::default()
            },
            cache: CacheSettings {
                enabled: self.cache_enabled,
                directory: self.cache_directory.clone(),
                ttl: Duration::from_secs(self.cache_ttl_secs),
                memory_capacity: self.cache_memory_capacity,
            },
            migration_strategy: self.migration_strategy,
            rollout_percentage: self.rollout_percentage,
            outsourced_materials: self.outsourced_materials.clone(),
        }
    }
}

fn parse_strategy(value: &str) -> Result<MigrationStrategy, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "old_only" => Ok(MigrationStrategy::OldOnly),
        "new_only" => Ok(MigrationStrategy::NewOnly),
        "new_with_fallback" => Ok(MigrationStrategy::NewWithFallback),
        "comparison" => Ok(MigrationStrategy::Comparison),
        "gradual_rollout" => Ok(MigrationStrategy::GradualRollout),
        _ => Err(ConfigError::UnknownStrategy),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    UnknownStrategy,
    UnknownMaterial { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => write!(f, "{var} must be a valid number"),
            ConfigError::UnknownStrategy => write!(
                f,
                "PRICING_MIGRATION_STRATEGY must be one of old_only, new_only, new_with_fallback, comparison, gradual_rollout"
            ),
            ConfigError::UnknownMaterial { var } => {
                write!(f, "{var} contains an unknown material label")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("PRICING_YUAN_EGP_RATE");
        env::remove_var("PRICING_CACHE_ENABLED");
        env::remove_var("PRICING_CACHE_DIR");
        env::remove_var("PRICING_CACHE_TTL_SECS");
        env::remove_var("PRICING_CACHE_MEMORY_CAPACITY");
        env::remove_var("PRICING_MIGRATION_STRATEGY");
        env::remove_var("PRICING_ROLLOUT_PERCENTAGE");
        env::remove_var("PRICING_OUTSOURCED_MATERIALS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.pricing.cache_enabled);
        assert_eq!(config.pricing.migration_strategy, None);
        assert!(config.pricing.outsourced_materials.is_empty());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn pricing_settings_parse_from_env() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PRICING_YUAN_EGP_RATE", "7.25");
        env::set_var("PRICING_MIGRATION_STRATEGY", "gradual_rollout");
        env::set_var("PRICING_ROLLOUT_PERCENTAGE", "25");
        env::set_var("PRICING_OUTSOURCED_MATERIALS", "Rogers, PTFE");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.pricing.yuan_to_egp_rate, 7.25);
        assert_eq!(
            config.pricing.migration_strategy,
            Some(MigrationStrategy::GradualRollout)
        );
        assert_eq!(config.pricing.rollout_percentage, 25);
        assert_eq!(
            config.pricing.outsourced_materials,
            vec![BaseMaterial::Rogers, BaseMaterial::Ptfe]
        );
        reset_env();
    }

    #[test]
    fn invalid_rate_is_rejected() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("PRICING_YUAN_EGP_RATE", "cheap");
        let err = AppConfig::load().expect_err("invalid rate rejected");
        assert!(matches!(err, ConfigError::InvalidNumber { .. }));
        reset_env();
    }
}
