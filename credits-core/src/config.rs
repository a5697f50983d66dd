//! Configuration for the credit ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::cap::CapPolicy;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Fee schedule
    pub fees: FeeConfig,

    /// Limits and allowances
    pub limits: LimitsConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/credits"),
            service_name: "credits-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            fees: FeeConfig::default(),
            limits: LimitsConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Platform fee schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fee rate retained on tips
    pub tip_fee: Decimal,

    /// Fee rate retained on subscription payments
    pub subscription_fee: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            tip_fee: Decimal::new(5, 2),           // 5%
            subscription_fee: Decimal::new(10, 2), // 10%
        }
    }
}

/// Limits and allowances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum cap-counted credits per earning period
    pub monthly_earning_cap: i64,

    /// What to do when an earning credit would exceed the cap
    pub cap_policy: CapPolicy,

    /// Minimum tip amount
    pub tip_min: i64,

    /// Maximum tip amount
    pub tip_max: i64,

    /// Minimum payout request amount
    pub minimum_payout: i64,

    /// Credits granted on account creation (0 disables the bonus)
    pub signup_bonus: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            monthly_earning_cap: 500,
            cap_policy: CapPolicy::Reject,
            tip_min: 1,
            tip_max: 1000,
            minimum_payout: 100,
            signup_bonus: 0,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CREDITS_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(cap) = std::env::var("CREDITS_MONTHLY_CAP") {
            config.limits.monthly_earning_cap = cap
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid CREDITS_MONTHLY_CAP: {}", cap)))?;
        }

        if let Ok(minimum) = std::env::var("CREDITS_MINIMUM_PAYOUT") {
            config.limits.minimum_payout = minimum.parse().map_err(|_| {
                crate::Error::Config(format!("Invalid CREDITS_MINIMUM_PAYOUT: {}", minimum))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> crate::Result<()> {
        crate::fees::validate_rate(self.fees.tip_fee)?;
        crate::fees::validate_rate(self.fees.subscription_fee)?;

        if self.limits.monthly_earning_cap <= 0 {
            return Err(crate::Error::Config(
                "monthly_earning_cap must be positive".to_string(),
            ));
        }
        if self.limits.tip_min < 1 || self.limits.tip_max < self.limits.tip_min {
            return Err(crate::Error::Config(
                "tip bounds must satisfy 1 <= tip_min <= tip_max".to_string(),
            ));
        }
        if self.limits.minimum_payout <= 0 {
            return Err(crate::Error::Config(
                "minimum_payout must be positive".to_string(),
            ));
        }
        if self.limits.signup_bonus < 0 {
            return Err(crate::Error::Config(
                "signup_bonus must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
