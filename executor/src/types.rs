//! Call model and receipts

use chrono::{DateTime, Utc};
use ledger_core::{
    crypto::{canonical_bytes, verify_signature},
    AccountId, KeyPair, NativeAmount, Signature, TokenOp, TransferEvent,
};
use paymaster::{PaymasterOp, Settlement};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Gas limit used when a call does not set one
pub const DEFAULT_GAS_LIMIT: u64 = 100_000;

/// Operation carried by a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Ledger entry point
    Token(TokenOp),
    /// Policy engine entry point
    Paymaster(PaymasterOp),
}

impl Operation {
    /// Short operation name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Token(op) => op.name(),
            Operation::Paymaster(op) => op.name(),
        }
    }
}

impl From<TokenOp> for Operation {
    fn from(op: TokenOp) -> Self {
        Operation::Token(op)
    }
}

impl From<PaymasterOp> for Operation {
    fn from(op: PaymasterOp) -> Self {
        Operation::Paymaster(op)
    }
}

/// Operation context handed to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Account on whose authority the call runs
    pub initiator: AccountId,

    /// Contract being called
    pub target: AccountId,

    /// What to do on `target`
    pub operation: Operation,

    /// Maximum gas the initiator (or sponsor) commits to
    pub gas_limit: u64,

    /// Engine asked to cover the fee, if any
    pub paymaster: Option<AccountId>,
}

impl Call {
    /// Self-paid call with the default gas limit
    pub fn new(initiator: AccountId, target: AccountId, operation: impl Into<Operation>) -> Self {
        Self {
            initiator,
            target,
            operation: operation.into(),
            gas_limit: DEFAULT_GAS_LIMIT,
            paymaster: None,
        }
    }

    /// Override the gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Request fee sponsorship from `paymaster`
    pub fn sponsored_by(mut self, paymaster: AccountId) -> Self {
        self.paymaster = Some(paymaster);
        self
    }
}

#[derive(Serialize)]
struct SigningPayload<'a> {
    call: &'a Call,
    nonce: u64,
}

/// Call authorized by the initiator's Ed25519 key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedCall {
    /// Authorized call
    pub call: Call,

    /// Initiator's sequence number
    pub nonce: u64,

    /// Initiator's public key
    pub public_key: [u8; 32],

    /// Signature over the bincode encoding of `(call, nonce)`
    pub signature: Signature,
}

impl SignedCall {
    /// Sign `call` with `keypair`
    pub fn sign(call: Call, nonce: u64, keypair: &KeyPair) -> Result<Self> {
        let bytes = canonical_bytes(&SigningPayload { call: &call, nonce })?;
        let signature = keypair.sign(&bytes);

        Ok(Self {
            call,
            nonce,
            public_key: keypair.public_key(),
            signature,
        })
    }

    /// Check that the key derives the initiator and signed this exact call
    pub fn verify(&self) -> Result<()> {
        if AccountId::from_public_key(&self.public_key) != self.call.initiator {
            return Err(Error::SignatureError(format!(
                "public key does not belong to {}",
                self.call.initiator
            )));
        }

        let bytes = canonical_bytes(&SigningPayload {
            call: &self.call,
            nonce: self.nonce,
        })?;

        if !verify_signature(&bytes, &self.signature, &self.public_key) {
            return Err(Error::SignatureError("signature does not match call".to_string()));
        }

        Ok(())
    }
}

/// Who paid the fee of a committed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeePayer {
    /// Self-paid from the initiator's native balance
    Initiator(AccountId),
    /// Covered by a policy engine's funds
    Paymaster(AccountId),
}

/// Transfer event with its position in the global commit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Global sequence number (starts at 0)
    pub sequence: u64,

    /// The event
    pub event: TransferEvent,
}

/// Outcome of a committed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Receipt ID (UUIDv7)
    pub receipt_id: Uuid,

    /// Initiator
    pub initiator: AccountId,

    /// Called contract
    pub target: AccountId,

    /// Operation name
    pub operation: String,

    /// Gas consumed
    pub gas_used: u64,

    /// Fee charged (`gas_used * gas_price`)
    pub fee: NativeAmount,

    /// Account that paid the fee
    pub fee_payer: FeePayer,

    /// Reservation close-out for sponsored calls
    pub settlement: Option<Settlement>,

    /// Native amount swept to the owner by `withdraw`
    pub withdrawn: Option<NativeAmount>,

    /// Transfer events in commit order
    pub events: Vec<EventRecord>,

    /// Commit timestamp
    pub committed_at: DateTime<Utc>,
}

impl Receipt {
    /// Whether a policy engine paid the fee
    pub fn is_sponsored(&self) -> bool {
        matches!(self.fee_payer, FeePayer::Paymaster(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_call(keypair: &KeyPair) -> Call {
        Call::new(
            keypair.account_id(),
            AccountId::from_bytes([0xaa; 20]),
            TokenOp::Transfer {
                to: AccountId::from_bytes([0x03; 20]),
                amount: 100,
            },
        )
    }

    #[test]
    fn test_signed_call_verifies() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let signed = SignedCall::sign(transfer_call(&keypair), 0, &keypair).unwrap();
        assert!(signed.verify().is_ok());
    }

    #[test]
    fn test_tampered_call_rejected() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let mut signed = SignedCall::sign(transfer_call(&keypair), 0, &keypair).unwrap();
        signed.call.operation = TokenOp::Transfer {
            to: AccountId::from_bytes([0x03; 20]),
            amount: 1_000_000,
        }
        .into();

        assert!(matches!(signed.verify(), Err(Error::SignatureError(_))));
    }

    #[test]
    fn test_replayed_nonce_changes_signature() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let mut signed = SignedCall::sign(transfer_call(&keypair), 0, &keypair).unwrap();
        signed.nonce = 1;
        assert!(signed.verify().is_err());
    }

    #[test]
    fn test_foreign_key_rejected() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let impostor = KeyPair::from_seed(&[8u8; 32]);
        let signed = SignedCall::sign(transfer_call(&keypair), 0, &impostor).unwrap();

        let err = signed.verify().unwrap_err();
        assert!(err.to_string().contains("does not belong"));
    }

    #[test]
    fn test_call_builders() {
        let initiator = AccountId::from_bytes([1; 20]);
        let sponsor = AccountId::from_bytes([2; 20]);
        let call = Call::new(initiator, AccountId::ZERO, PaymasterOp::Withdraw)
            .with_gas_limit(42)
            .sponsored_by(sponsor);

        assert_eq!(call.gas_limit, 42);
        assert_eq!(call.paymaster, Some(sponsor));
        assert_eq!(call.operation.name(), "withdraw");
    }

    #[test]
    fn test_call_json_uses_hex_accounts() {
        let keypair = KeyPair::from_seed(&[7u8; 32]);
        let call = transfer_call(&keypair);

        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains(&AccountId::from_bytes([0x03; 20]).to_string()));
        assert_eq!(serde_json::from_str::<Call>(&json).unwrap(), call);
    }
}
