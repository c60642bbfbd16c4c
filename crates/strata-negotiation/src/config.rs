use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use strata_contract::HostSettings;
use strata_types::{Amount, PublicKey, BLOCKS_PER_DAY, DOWNLOAD_SAFETY_MARGIN_PERCENT};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Terms a host announces and the limits it negotiates under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub accepting_contracts: bool,
    pub max_duration: u64,
    pub window_size: u64,
    #[serde(with = "amount_as_string")]
    pub contract_price: Amount,
    #[serde(with = "amount_as_string")]
    pub storage_price: Amount,
    #[serde(with = "amount_as_string")]
    pub upload_bandwidth_price: Amount,
    #[serde(with = "amount_as_string")]
    pub download_bandwidth_price: Amount,
    #[serde(with = "amount_as_string")]
    pub sector_access_price: Amount,
    #[serde(with = "amount_as_string")]
    pub base_rpc_price: Amount,
    /// Collateral per byte per block
    #[serde(with = "amount_as_string")]
    pub deposit: Amount,
    #[serde(with = "amount_as_string")]
    pub max_deposit: Amount,
    pub responsibility_lock_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            accepting_contracts: true,
            max_duration: BLOCKS_PER_DAY * 30 * 5,
            window_size: BLOCKS_PER_DAY,
            contract_price: Amount::from_base_units(50_000_000_000_000_000),
            storage_price: Amount::from_base_units(100),
            upload_bandwidth_price: Amount::from_base_units(10_000),
            download_bandwidth_price: Amount::from_base_units(100_000),
            sector_access_price: Amount::from_base_units(1_000_000_000_000),
            base_rpc_price: Amount::from_base_units(100_000_000_000),
            deposit: Amount::from_base_units(50),
            max_deposit: Amount::from_coins(5_000),
            responsibility_lock_timeout_secs: 60,
        }
    }
}

impl HostConfig {
    /// Settings announced to clients under `public_key`
    pub fn settings(&self, public_key: PublicKey) -> HostSettings {
        HostSettings {
            public_key,
            accepting_contracts: self.accepting_contracts,
            max_duration: self.max_duration,
            window_size: self.window_size,
            contract_price: self.contract_price,
            storage_price: self.storage_price,
            upload_bandwidth_price: self.upload_bandwidth_price,
            download_bandwidth_price: self.download_bandwidth_price,
            sector_access_price: self.sector_access_price,
            base_rpc_price: self.base_rpc_price,
            deposit: self.deposit,
            max_deposit: self.max_deposit,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.responsibility_lock_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(with = "amount_as_string")]
    pub tx_fee: Amount,
    #[serde(with = "amount_as_string")]
    pub base_collateral: Amount,
    /// Bytes the client expects to store, used to cap host collateral
    pub expected_storage: u64,
    /// Contract length in blocks when the caller does not pick one
    pub default_period: u64,
    pub download_safety_margin_percent: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tx_fee: Amount::from_base_units(10_000_000_000_000_000),
            base_collateral: Amount::ZERO,
            expected_storage: 1 << 30,
            default_period: BLOCKS_PER_DAY * 28,
            download_safety_margin_percent: DOWNLOAD_SAFETY_MARGIN_PERCENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty`, `compact` or `json`
    pub format: String,
    pub module_filters: HashMap<String, String>,
    pub file_output: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            module_filters: HashMap::new(),
            file_output: None,
        }
    }
}

impl NegotiationConfig {
    /// Loads a negotiation config; sections and fields left out take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading negotiation config {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing negotiation config {}", path.display()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let rendered =
            toml::to_string_pretty(self).context("rendering negotiation config as TOML")?;
        std::fs::write(path, rendered)
            .with_context(|| format!("writing negotiation config {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(accepting) = env::var("STRATA_ACCEPTING_CONTRACTS") {
            if let Ok(val) = accepting.parse() {
                self.host.accepting_contracts = val;
            }
        }
        if let Ok(timeout) = env::var("STRATA_LOCK_TIMEOUT_SECS") {
            if let Ok(val) = timeout.parse() {
                self.host.responsibility_lock_timeout_secs = val;
            }
        }

        // Prices are in base units
        if let Ok(price) = env::var("STRATA_STORAGE_PRICE") {
            if let Ok(val) = price.parse::<u128>() {
                self.host.storage_price = Amount::from_base_units(val);
            }
        }
        if let Ok(price) = env::var("STRATA_UPLOAD_PRICE") {
            if let Ok(val) = price.parse::<u128>() {
                self.host.upload_bandwidth_price = Amount::from_base_units(val);
            }
        }
        if let Ok(price) = env::var("STRATA_DOWNLOAD_PRICE") {
            if let Ok(val) = price.parse::<u128>() {
                self.host.download_bandwidth_price = Amount::from_base_units(val);
            }
        }

        if let Ok(level) = env::var("STRATA_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }
}

/// TOML integers stop at i64, so amounts travel as decimal strings of base units
mod amount_as_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use strata_types::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_base_units().to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim()
            .parse::<u128>()
            .map(Amount::from_base_units)
            .map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NegotiationConfig::default();
        assert!(config.host.accepting_contracts);
        assert_eq!(config.host.lock_timeout(), Duration::from_secs(60));
        assert_eq!(config.client.download_safety_margin_percent, 2);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_toml_roundtrip_keeps_large_amounts() {
        let mut config = NegotiationConfig::default();
        config.host.max_deposit = Amount::from_coins(1_000_000);
        config
            .logging
            .module_filters
            .insert("strata_merkle".to_string(), "trace".to_string());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: NegotiationConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let parsed: NegotiationConfig = toml::from_str(
            r#"
            [host]
            accepting_contracts = false
            storage_price = "7"
            "#,
        )
        .unwrap();
        assert!(!parsed.host.accepting_contracts);
        assert_eq!(parsed.host.storage_price, Amount::from_base_units(7));
        assert_eq!(parsed.host.window_size, HostConfig::default().window_size);
        assert_eq!(parsed.client, ClientConfig::default());
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        let err = NegotiationConfig::from_file(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("absent.toml"));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[host\naccepting_contracts = ").unwrap();
        let err = NegotiationConfig::from_file(&broken).unwrap_err();
        assert!(err.to_string().starts_with("parsing negotiation config"));
    }

    #[test]
    fn test_settings_carry_prices() {
        let config = HostConfig::default();
        let key = PublicKey::from_bytes([3u8; 32]);
        let settings = config.settings(key);
        assert_eq!(settings.public_key, key);
        assert_eq!(settings.deposit, config.deposit);
        assert_eq!(settings.base_rpc_price, config.base_rpc_price);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("STRATA_STORAGE_PRICE", "12345");
        std::env::set_var("STRATA_LOCK_TIMEOUT_SECS", "5");
        let mut config = NegotiationConfig::default();
        config.apply_env_overrides();
        std::env::remove_var("STRATA_STORAGE_PRICE");
        std::env::remove_var("STRATA_LOCK_TIMEOUT_SECS");

        assert_eq!(config.host.storage_price, Amount::from_base_units(12345));
        assert_eq!(config.host.responsibility_lock_timeout_secs, 5);
    }
}
