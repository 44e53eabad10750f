//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact integer arithmetic (smallest denomination, no floats)
//! - Human-readable rendering where operators see them (hex addresses, decimals)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Token amount in the smallest denomination
pub type Amount = u128;

/// Native-currency amount (the currency fees are paid in)
pub type NativeAmount = u128;

/// Account identifier (20-byte address)
///
/// Used both for externally owned accounts and for deployed contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AccountId([u8; 20]);

impl AccountId {
    /// The zero address, used as the source of newly issued tokens
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derive the address of an externally owned account from its Ed25519 public key
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest: [u8; 32] = Sha256::digest(public_key).into();
        Self::from_digest(&digest)
    }

    /// Derive a contract address from its deployer and the deployer's nonce
    pub fn derive_contract(deployer: &AccountId, nonce: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(deployer.as_bytes());
        hasher.update(nonce.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Self::from_digest(&digest)
    }

    /// Check for the zero address
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    fn from_digest(digest: &[u8; 32]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[12..]);
        Self(bytes)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let decoded = hex::decode(digits)
            .map_err(|e| crate::Error::InvalidArgument(format!("Invalid address {}: {}", s, e)))?;

        let bytes: [u8; 20] = decoded.try_into().map_err(|v: Vec<u8>| {
            crate::Error::InvalidArgument(format!(
                "Invalid address {}: expected 20 bytes, got {}",
                s,
                v.len()
            ))
        })?;

        Ok(Self(bytes))
    }
}

// Hex string in human-readable formats (TOML, JSON), raw bytes in bincode
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 20]>::deserialize(deserializer).map(Self)
        }
    }
}

/// Render an integer amount as an exact decimal with `decimals` implied places
///
/// Returns `None` when the amount does not fit a 96-bit decimal mantissa.
pub fn to_decimal(amount: Amount, decimals: u8) -> Option<Decimal> {
    let units = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(units, u32::from(decimals)).ok()
}

/// Ledger operation requested by an initiator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenOp {
    /// Owner-only issuance
    Mint {
        /// Recipient
        to: AccountId,
        /// Amount in smallest units
        amount: Amount,
    },
    /// Allowlisted-or-owner distribution
    Claim {
        /// Recipient
        to: AccountId,
        /// Amount in smallest units
        amount: Amount,
    },
    /// Balance-gated movement from the initiator
    Transfer {
        /// Recipient
        to: AccountId,
        /// Amount in smallest units
        amount: Amount,
    },
    /// Owner-only allowlist insertion
    AddToAllowList {
        /// Accounts to insert
        accounts: Vec<AccountId>,
    },
    /// Owner-only allowlist removal
    RemoveFromAllowList {
        /// Accounts to remove
        accounts: Vec<AccountId>,
    },
    /// Owner-only ownership handover
    TransferOwnership {
        /// Incoming owner
        new_owner: AccountId,
    },
}

impl TokenOp {
    /// Short operation name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            TokenOp::Mint { .. } => "mint",
            TokenOp::Claim { .. } => "claim",
            TokenOp::Transfer { .. } => "transfer",
            TokenOp::AddToAllowList { .. } => "add_to_allow_list",
            TokenOp::RemoveFromAllowList { .. } => "remove_from_allow_list",
            TokenOp::TransferOwnership { .. } => "transfer_ownership",
        }
    }

    /// Destination and amount if this is a plain transfer
    pub fn as_transfer(&self) -> Option<(&AccountId, Amount)> {
        match self {
            TokenOp::Transfer { to, amount } => Some((to, *amount)),
            _ => None,
        }
    }
}

/// How tokens arrived at the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferKind {
    /// Genesis or owner mint
    Mint = 1,
    /// Allowlist-gated claim
    Claim = 2,
    /// Balance-gated transfer
    Transfer = 3,
}

/// `Transfer` notification emitted on every successful balance movement
///
/// Issuance (mint, claim) is reported with `from == AccountId::ZERO`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Unique event ID (UUIDv7 for time-ordering)
    pub event_id: Uuid,

    /// Ledger that emitted the event
    pub token: AccountId,

    /// Entry point that produced the movement
    pub kind: TransferKind,

    /// Sender (zero address for issuance)
    pub from: AccountId,

    /// Recipient
    pub to: AccountId,

    /// Amount moved
    pub amount: Amount,

    /// Emission timestamp
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    /// Create a new event stamped now
    pub fn new(
        token: AccountId,
        kind: TransferKind,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            token,
            kind,
            from,
            to,
            amount,
            timestamp: Utc::now(),
        }
    }

    /// Whether this event created new supply
    pub fn is_issuance(&self) -> bool {
        self.from.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_hex_round_trip() {
        let account = AccountId::from_bytes([0xab; 20]);
        let text = account.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(text.len(), 42);
        assert_eq!(text.parse::<AccountId>().unwrap(), account);
    }

    #[test]
    fn test_account_id_rejects_wrong_length() {
        assert!("0x1234".parse::<AccountId>().is_err());
        assert!("not-hex".parse::<AccountId>().is_err());
    }

    #[test]
    fn test_contract_addresses_depend_on_nonce() {
        let deployer = AccountId::from_bytes([7u8; 20]);
        let first = AccountId::derive_contract(&deployer, 0);
        let second = AccountId::derive_contract(&deployer, 1);
        assert_ne!(first, second);
        assert_eq!(first, AccountId::derive_contract(&deployer, 0));
    }

    #[test]
    fn test_account_id_json_is_hex() {
        let account = AccountId::from_bytes([1u8; 20]);
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, format!("\"{}\"", account));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(to_decimal(100_000 * 100, 2), Some(Decimal::new(10_000_000, 2)));
        assert_eq!(to_decimal(2000, 2).unwrap().to_string(), "20.00");
        assert_eq!(to_decimal(u128::MAX, 2), None);
    }

    #[test]
    fn test_as_transfer() {
        let to = AccountId::from_bytes([3u8; 20]);
        assert_eq!(
            TokenOp::Transfer { to, amount: 5 }.as_transfer(),
            Some((&to, 5))
        );
        assert_eq!(TokenOp::Claim { to, amount: 5 }.as_transfer(), None);
    }
}
