//! Configuration management for PSNChain

use crate::blockchain::GenesisAllocation;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::miner::MAX_DIFFICULTY;
use crate::Amount;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "psnchain.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_mining_reward")]
    pub mining_reward: Amount,
    #[serde(default)]
    pub genesis: Option<GenesisConfig>,
}

/// Initial supply minted at bootstrap. Ignored once a chain exists in the store.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisConfig {
    pub address: Address,
    #[serde(default = "default_genesis_amount")]
    pub amount: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub beneficiary_address: Option<Address>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            mining_reward: default_mining_reward(),
            genesis: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            beneficiary_address: None,
            interval_secs: default_interval_secs(),
        }
    }
}

impl ChainConfig {
    pub fn genesis_allocation(&self) -> Option<GenesisAllocation> {
        self.genesis.as_ref().map(|g| GenesisAllocation {
            address: g.address.clone(),
            amount: g.amount,
        })
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| ChainError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.chain.difficulty > MAX_DIFFICULTY {
            return Err(ChainError::Config(format!(
                "chain.difficulty must be at most {}, got {}",
                MAX_DIFFICULTY, self.chain.difficulty
            )));
        }
        if self.chain.mining_reward == Amount::ZERO {
            return Err(ChainError::Config(
                "chain.mining_reward must be greater than zero".to_string(),
            ));
        }
        if let Some(genesis) = &self.chain.genesis {
            if genesis.amount == Amount::ZERO {
                return Err(ChainError::Config(
                    "chain.genesis.amount must be greater than zero".to_string(),
                ));
            }
        }
        if self.database.path.is_empty() {
            return Err(ChainError::Config("database.path must be set".to_string()));
        }
        if self.miner.enabled && self.miner.beneficiary_address.is_none() {
            return Err(ChainError::Config(
                "miner.beneficiary_address must be set when the miner is enabled".to_string(),
            ));
        }
        if self.miner.interval_secs == 0 {
            return Err(ChainError::Config(
                "miner.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reads `path`, falling back to defaults when the file does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    Config::from_toml_str(&contents)
}

fn default_difficulty() -> u32 {
    2
}

fn default_mining_reward() -> Amount {
    Amount::from_num(100)
}

fn default_genesis_amount() -> Amount {
    Amount::from_num(1_000_000_000u64)
}

fn default_database_path() -> String {
    "./data/psnchain.db".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chain.difficulty, 2);
        assert_eq!(config.chain.mining_reward, Amount::from_num(100));
        assert!(config.chain.genesis.is_none());
        assert_eq!(config.database.path, "./data/psnchain.db");
        assert!(!config.miner.enabled);
        assert_eq!(config.miner.interval_secs, 10);
    }

    #[test]
    fn test_full_file() {
        let genesis = Address::from_label("genesis");
        let miner = Address::from_label("miner");
        let contents = format!(
            r#"
[chain]
difficulty = 3
mining_reward = "50"

[chain.genesis]
address = "{}"

[database]
path = ":memory:"

[miner]
enabled = true
beneficiary_address = "{}"
interval_secs = 2
"#,
            genesis, miner
        );

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("psnchain.toml");
        fs::File::create(&path)
            .unwrap()
            .write_all(contents.as_bytes())
            .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.chain.difficulty, 3);
        assert_eq!(config.chain.mining_reward, Amount::from_num(50));
        let allocation = config.chain.genesis_allocation().unwrap();
        assert_eq!(allocation.address, genesis);
        assert_eq!(allocation.amount, Amount::from_num(1_000_000_000u64));
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.miner.beneficiary_address, Some(miner));
        assert_eq!(config.miner.interval_secs, 2);
    }

    #[test]
    fn test_enabled_miner_needs_beneficiary() {
        let err = Config::from_toml_str("[miner]\nenabled = true\n").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn test_difficulty_bound() {
        let err = Config::from_toml_str("[chain]\ndifficulty = 65\n").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }

    #[test]
    fn test_malformed_address_rejected() {
        let err = Config::from_toml_str("[chain.genesis]\naddress = \"psnXYZ\"\n").unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
    }
}
