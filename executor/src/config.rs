//! Configuration for the node

use ledger_core::{AccountId, NativeAmount};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::gas::GasSchedule;

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Listen address of the `/metrics` and `/events` endpoints
    pub metrics_listen_addr: String,

    /// Emit JSON log lines instead of the human format
    pub json_logs: bool,

    /// Account credited with every charged fee
    pub fee_collector: AccountId,

    /// Gas costs and price
    pub gas: GasSchedule,

    /// Native balances credited on first start
    pub genesis: Vec<GenesisAllocation>,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Actor configuration
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/buxx"),
            service_name: "buxx-node".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            json_logs: false,
            fee_collector: AccountId::from_bytes([0xfe; 20]),
            gas: GasSchedule::default(),
            genesis: Vec::new(),
            rocksdb: RocksDBConfig::default(),
            actor: ActorConfig::default(),
        }
    }
}

/// One genesis native allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAllocation {
    /// Funded account
    pub account: AccountId,

    /// Native units (TOML integers are 64-bit)
    pub amount: u64,
}

impl GenesisAllocation {
    /// Amount as a native quantity
    pub fn native_amount(&self) -> NativeAmount {
        NativeAmount::from(self.amount)
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `BUXX_*` environment overrides
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        if let Ok(data_dir) = std::env::var("BUXX_DATA_DIR") {
            self.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("BUXX_METRICS_ADDR") {
            self.metrics_listen_addr = addr;
        }

        if let Ok(price) = std::env::var("BUXX_GAS_PRICE") {
            self.gas.gas_price = price.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid BUXX_GAS_PRICE {:?}: {}", price, e))
            })?;
        }

        if let Ok(json) = std::env::var("BUXX_JSON_LOGS") {
            self.json_logs = matches!(json.as_str(), "1" | "true" | "yes");
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "buxx-node");
        assert_eq!(config.actor.mailbox_capacity, 1000);
        assert_eq!(config.gas.gas_price, 1_000);
        assert!(config.genesis.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            data_dir = "/var/lib/buxx"
            fee_collector = "0x0101010101010101010101010101010101010101"

            [gas]
            gas_price = 7

            [[genesis]]
            account = "0x0202020202020202020202020202020202020202"
            amount = 5000
        "#;

        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/buxx"));
        assert_eq!(config.fee_collector, AccountId::from_bytes([1; 20]));
        assert_eq!(config.gas.gas_price, 7);
        assert_eq!(config.gas.base, GasSchedule::default().base);
        assert_eq!(config.genesis[0].native_amount(), 5000);
        assert_eq!(config.service_name, "buxx-node");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        std::fs::write(&path, "json_logs = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.json_logs);
    }
}
