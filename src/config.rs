use crate::domain::{ChargebackRates, Environment};
use crate::errors::{AppError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub internal_api: InternalApiConfig,
    pub workflow: WorkflowConfig,
    pub provisioning: ProvisioningConfig,
    pub quota: QuotaConfig,
    pub approval: ApprovalConfig,
    pub chargeback: ChargebackConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub enabled: bool,
    pub url: String,
    pub summary_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InternalApiConfig {
    pub shared_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    pub required_environments: Vec<Environment>,
    pub gateway_domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    pub default_application_quota: u32,
    pub admin_ceiling: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApprovalConfig {
    pub rejected_retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateTableConfig {
    pub cost_per_gb_in: f64,
    pub cost_per_gb_out: f64,
    pub cost_per_million_messages: f64,
    pub effective_date: NaiveDate,
}

impl From<&RateTableConfig> for ChargebackRates {
    fn from(table: &RateTableConfig) -> Self {
        ChargebackRates {
            cost_per_gb_in: table.cost_per_gb_in,
            cost_per_gb_out: table.cost_per_gb_out,
            cost_per_million_messages: table.cost_per_million_messages,
            effective_date: table.effective_date,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChargebackConfig {
    pub rate_tables: Vec<RateTableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let environment = env::var("KCP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::File::with_name(&format!("config/{}", environment)).required(false),
            )
            // e.g., KCP__SERVER__PORT=8080
            .add_source(
                config::Environment::with_prefix("KCP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::Configuration(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Configuration("Invalid port number".to_string()));
        }

        if self.storage.backend == StorageBackend::Postgres && self.database.url.is_empty() {
            return Err(AppError::Configuration(
                "Database URL is required for the postgres backend".to_string(),
            ));
        }

        if self.redis.enabled && self.redis.url.is_empty() {
            return Err(AppError::Configuration(
                "Redis URL is required when the summary cache is enabled".to_string(),
            ));
        }

        if self.internal_api.shared_key.trim().is_empty() {
            return Err(AppError::Configuration(
                "Internal API shared key is required".to_string(),
            ));
        }

        if self.provisioning.required_environments.is_empty() {
            return Err(AppError::Configuration(
                "At least one required environment must be configured".to_string(),
            ));
        }

        if self.chargeback.rate_tables.is_empty() {
            return Err(AppError::Configuration(
                "At least one chargeback rate table is required".to_string(),
            ));
        }

        for table in &self.chargeback.rate_tables {
            if table.cost_per_gb_in < 0.0
                || table.cost_per_gb_out < 0.0
                || table.cost_per_million_messages < 0.0
            {
                return Err(AppError::Configuration(format!(
                    "Chargeback rates effective {} must not be negative",
                    table.effective_date
                )));
            }
        }

        Ok(())
    }

    pub fn rate_tables(&self) -> Vec<ChargebackRates> {
        self.chargeback
            .rate_tables
            .iter()
            .map(ChargebackRates::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let mut config = Config::load().expect("Failed to load config");
        assert!(config.validate().is_ok());

        // Test invalid port
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_environments_and_rates() {
        let config = Config::load().expect("Failed to load config");
        assert_eq!(
            config.provisioning.required_environments,
            vec![Environment::Dev, Environment::Stage, Environment::Prod]
        );
        assert!(!config.rate_tables().is_empty());
    }

    #[test]
    fn test_negative_rates_rejected() {
        let mut config = Config::load().expect("Failed to load config");
        config.chargeback.rate_tables[0].cost_per_gb_out = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_shared_key_rejected() {
        let mut config = Config::load().expect("Failed to load config");
        config.internal_api.shared_key = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
