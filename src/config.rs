use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::{KycStatus, Machine, MachineType, Role, User, UserStatus};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Machines seeded into the in-memory store at boot
    #[serde(default)]
    pub catalog: Vec<MachineSeed>,
    /// Accounts seeded into the in-memory store; ignored by the postgres backend
    #[serde(default)]
    pub users: Vec<UserSeed>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// HS256 secret for session tokens; `HASHLEASE_JWT_SECRET` overrides it
    pub jwt_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// `DATABASE_URL` overrides it
    #[serde(default)]
    pub postgres_url: Option<String>,
}

/// Accrual driver tuning
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Profit granularity and fee-check frequency
    pub tick_interval_secs: u64,
    /// Minimum idle time before a profile read recomputes earnings
    pub catch_up_min_hours: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            catch_up_min_hours: Decimal::new(1, 2),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SettlementConfig {
    #[serde(default)]
    pub require_kyc_for_withdrawal: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NotifierConfig {
    /// Mail relay endpoint; log-only delivery when unset
    #[serde(default)]
    pub relay_url: Option<String>,
    #[serde(default = "default_relay_timeout_ms")]
    pub relay_timeout_ms: u64,
}

fn default_relay_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MachineSeed {
    pub id: i64,
    pub name: String,
    pub machine_type: MachineType,
    pub daily_rate: Decimal,
    pub duration_days: i32,
    #[serde(default)]
    pub monthly_fee: Decimal,
    #[serde(default)]
    pub min_deposit: Decimal,
    #[serde(default)]
    pub rental_price: Decimal,
    #[serde(default)]
    pub buy_price: Decimal,
}

impl MachineSeed {
    pub fn to_machine(&self) -> Machine {
        Machine {
            id: self.id,
            name: self.name.clone(),
            machine_type: self.machine_type,
            daily_rate: self.daily_rate,
            duration_days: self.duration_days,
            monthly_fee: self.monthly_fee,
            min_deposit: self.min_deposit,
            rental_price: self.rental_price,
            buy_price: self.buy_price,
            is_active: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserSeed {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub balance: Decimal,
    #[serde(default)]
    pub kyc_status: KycStatus,
}

impl UserSeed {
    pub fn to_user(&self, created_at: DateTime<Utc>) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            balance: self.balance,
            last_earnings_update: None,
            kyc_status: self.kyc_status,
            status: UserStatus::Active,
            role: self.role,
            created_at,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {}: {}", config_path, e))?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gateway.jwt_secret.trim().is_empty() {
            anyhow::bail!("gateway.jwt_secret is empty; set it or HASHLEASE_JWT_SECRET");
        }
        for seed in &self.catalog {
            if seed.duration_days < 1 {
                anyhow::bail!("machine {}: duration_days must be at least 1", seed.id);
            }
            if seed.daily_rate.is_sign_negative()
                || seed.monthly_fee.is_sign_negative()
                || seed.min_deposit.is_sign_negative()
                || seed.buy_price.is_sign_negative()
            {
                anyhow::bail!("machine {}: rates and prices must not be negative", seed.id);
            }
        }
        for seed in &self.users {
            if seed.balance.is_sign_negative() {
                anyhow::bail!("user {}: balance must not be negative", seed.id);
            }
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres_url.is_none() {
            anyhow::bail!("storage.backend is postgres but no postgres_url / DATABASE_URL is set");
        }
        Ok(())
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config yaml: {}", e))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("HASHLEASE_JWT_SECRET") {
            self.gateway.jwt_secret = secret;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.postgres_url = Some(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: hashlease.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
  jwt_secret: dev-only
"#;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.engine.tick_interval_secs, 10);
        assert_eq!(config.engine.catch_up_min_hours, Decimal::new(1, 2));
        assert!(!config.settlement.require_kyc_for_withdrawal);
        assert_eq!(config.notifier.relay_timeout_ms, 5_000);
        assert!(config.catalog.is_empty());
        assert!(config.users.is_empty());
    }

    #[test]
    fn test_user_seed_defaults() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
users:
  - id: 1
    email: ops@example.com
    role: admin
  - id: 2
    email: miner@example.com
    balance: "500"
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        let now = Utc::now();
        let admin = config.users[0].to_user(now);
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.balance, Decimal::ZERO);
        let miner = config.users[1].to_user(now);
        assert_eq!(miner.role, Role::User);
        assert_eq!(miner.kyc_status, KycStatus::None);
        assert_eq!(miner.balance, Decimal::from(500));
        assert!(miner.is_active());
    }

    #[test]
    fn test_catalog_entries_parse() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
catalog:
  - id: 1
    name: S19 Lease
    machine_type: rent
    daily_rate: "1.5"
    duration_days: 30
    monthly_fee: "3"
    min_deposit: "30"
  - id: 2
    name: S21 Purchase
    machine_type: buy
    daily_rate: "2.8"
    duration_days: 365
    buy_price: "450"
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.catalog.len(), 2);
        assert_eq!(config.catalog[0].machine_type, MachineType::Rent);
        assert_eq!(config.catalog[1].buy_price, Decimal::from(450));
        assert_eq!(config.catalog[1].monthly_fee, Decimal::ZERO);
    }

    #[test]
    fn test_validate_rejects_zero_duration() {
        let yaml = format!(
            "{}{}",
            MINIMAL,
            r#"
catalog:
  - id: 7
    name: Broken
    machine_type: buy
    daily_rate: "1"
    duration_days: 0
"#
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert!(config.validate().is_err());
        assert!(AppConfig::from_yaml(MINIMAL).unwrap().validate().is_ok());
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let engine = EngineConfig {
            tick_interval_secs: 0,
            ..EngineConfig::default()
        };
        assert_eq!(engine.tick_interval(), Duration::from_secs(1));
    }
}
