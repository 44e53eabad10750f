//! Token metadata and genesis configuration

use crate::{types::Amount, Error, Result};
use serde::{Deserialize, Serialize};

/// Token configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Human-readable token name
    pub name: String,

    /// Ticker symbol
    pub symbol: String,

    /// Implied decimal places of the smallest unit
    pub decimals: u8,

    /// Supply minted to the deployer at genesis, in whole tokens
    pub genesis_supply: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "BUIDL BUXX".to_string(),
            symbol: "BUXX".to_string(),
            decimals: 2,
            genesis_supply: 100_000,
        }
    }
}

impl TokenConfig {
    /// Genesis supply in smallest units (`genesis_supply * 10^decimals`)
    pub fn genesis_units(&self) -> Result<Amount> {
        10u128
            .checked_pow(u32::from(self.decimals))
            .and_then(|scale| Amount::from(self.genesis_supply).checked_mul(scale))
            .ok_or_else(|| {
                Error::Config(format!(
                    "Genesis supply {} with {} decimals overflows",
                    self.genesis_supply, self.decimals
                ))
            })
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TokenConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse token config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject metadata the ledger cannot represent
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.symbol.trim().is_empty() {
            return Err(Error::Config("Token name and symbol are required".to_string()));
        }
        self.genesis_units().map(|_| ())
    }
}
