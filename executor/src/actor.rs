//! Single-writer actor around the runtime
//!
//! One Tokio task owns the [`Runtime`]; every caller goes through a cloneable
//! [`RuntimeHandle`] that sends messages over a bounded channel and awaits a
//! `oneshot` reply. Calls are therefore applied one at a time in mailbox order.
//!
//! ```text
//!  RuntimeHandle (Clone) ──┐
//!  RuntimeHandle (Clone) ──┼── mpsc::channel (bounded) ──▶ RuntimeActor ──▶ Runtime
//!  RuntimeHandle (Clone) ──┘
//! ```

use ledger_core::{AccountId, Amount, NativeAmount, TokenConfig, TokenLedger};
use paymaster::Paymaster;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{
    runtime::Runtime,
    types::{Call, EventRecord, Receipt, SignedCall},
    Error, Result,
};

/// Message sent to the runtime actor
#[derive(Debug)]
pub enum RuntimeMessage {
    /// Run an authenticated call
    Execute {
        call: Call,
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Verify and run a signed call
    ExecuteSigned {
        call: Box<SignedCall>,
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Deploy a ledger
    DeployToken {
        deployer: AccountId,
        config: TokenConfig,
        response: oneshot::Sender<Result<AccountId>>,
    },

    /// Deploy a policy engine
    DeployPaymaster {
        deployer: AccountId,
        sponsor_token: AccountId,
        response: oneshot::Sender<Result<AccountId>>,
    },

    /// Fund a policy engine
    FundPaymaster {
        funder: AccountId,
        paymaster: AccountId,
        amount: NativeAmount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Native transfer
    TransferNative {
        from: AccountId,
        to: AccountId,
        amount: NativeAmount,
        response: oneshot::Sender<Result<()>>,
    },

    /// Gas estimate
    EstimateGas {
        call: Call,
        response: oneshot::Sender<u64>,
    },

    /// Token balance
    TokenBalance {
        token: AccountId,
        account: AccountId,
        response: oneshot::Sender<Amount>,
    },

    /// Native balance
    NativeBalance {
        account: AccountId,
        response: oneshot::Sender<NativeAmount>,
    },

    /// Ledger snapshot
    GetToken {
        address: AccountId,
        response: oneshot::Sender<Option<TokenLedger>>,
    },

    /// Policy engine snapshot
    GetPaymaster {
        address: AccountId,
        response: oneshot::Sender<Option<Paymaster>>,
    },

    /// Next signed-call nonce
    NonceOf {
        account: AccountId,
        response: oneshot::Sender<u64>,
    },

    /// Committed events from a sequence number on
    EventsSince {
        from: u64,
        limit: usize,
        response: oneshot::Sender<Result<Vec<EventRecord>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the runtime
#[derive(Debug)]
pub struct RuntimeActor {
    runtime: Runtime,
    mailbox: mpsc::Receiver<RuntimeMessage>,
}

impl RuntimeActor {
    /// Create new actor
    pub fn new(runtime: Runtime, mailbox: mpsc::Receiver<RuntimeMessage>) -> Self {
        Self { runtime, mailbox }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, RuntimeMessage::Shutdown) {
                break;
            }
            self.handle_message(msg);
        }

        tracing::info!(next_sequence = self.runtime.next_sequence(), "Runtime actor stopped");
    }

    fn handle_message(&mut self, msg: RuntimeMessage) {
        // A dropped receiver only means the caller stopped waiting
        match msg {
            RuntimeMessage::Execute { call, response } => {
                let _ = response.send(self.runtime.execute(call));
            }

            RuntimeMessage::ExecuteSigned { call, response } => {
                let _ = response.send(self.runtime.execute_signed(*call));
            }

            RuntimeMessage::DeployToken {
                deployer,
                config,
                response,
            } => {
                let _ = response.send(self.runtime.deploy_token(deployer, &config));
            }

            RuntimeMessage::DeployPaymaster {
                deployer,
                sponsor_token,
                response,
            } => {
                let _ = response.send(self.runtime.deploy_paymaster(deployer, sponsor_token));
            }

            RuntimeMessage::FundPaymaster {
                funder,
                paymaster,
                amount,
                response,
            } => {
                let _ = response.send(self.runtime.fund_paymaster(funder, paymaster, amount));
            }

            RuntimeMessage::TransferNative {
                from,
                to,
                amount,
                response,
            } => {
                let _ = response.send(self.runtime.transfer_native(from, to, amount));
            }

            RuntimeMessage::EstimateGas { call, response } => {
                let _ = response.send(self.runtime.estimate_gas(&call));
            }

            RuntimeMessage::TokenBalance {
                token,
                account,
                response,
            } => {
                let _ = response.send(self.runtime.token_balance(&token, &account));
            }

            RuntimeMessage::NativeBalance { account, response } => {
                let _ = response.send(self.runtime.native_balance(&account));
            }

            RuntimeMessage::GetToken { address, response } => {
                let _ = response.send(self.runtime.token(&address).cloned());
            }

            RuntimeMessage::GetPaymaster { address, response } => {
                let _ = response.send(self.runtime.paymaster(&address).cloned());
            }

            RuntimeMessage::NonceOf { account, response } => {
                let _ = response.send(self.runtime.nonce_of(&account));
            }

            RuntimeMessage::EventsSince {
                from,
                limit,
                response,
            } => {
                let _ = response.send(self.runtime.events_since(from, limit));
            }

            RuntimeMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<RuntimeMessage>,
}

impl RuntimeHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<RuntimeMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(&self, message: impl FnOnce(oneshot::Sender<T>) -> RuntimeMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Run an authenticated call
    pub async fn execute(&self, call: Call) -> Result<Receipt> {
        self.request(|response| RuntimeMessage::Execute { call, response })
            .await?
    }

    /// Verify and run a signed call
    pub async fn execute_signed(&self, call: SignedCall) -> Result<Receipt> {
        self.request(|response| RuntimeMessage::ExecuteSigned {
            call: Box::new(call),
            response,
        })
        .await?
    }

    /// Deploy a ledger
    pub async fn deploy_token(&self, deployer: AccountId, config: TokenConfig) -> Result<AccountId> {
        self.request(|response| RuntimeMessage::DeployToken {
            deployer,
            config,
            response,
        })
        .await?
    }

    /// Deploy a policy engine
    pub async fn deploy_paymaster(&self, deployer: AccountId, sponsor_token: AccountId) -> Result<AccountId> {
        self.request(|response| RuntimeMessage::DeployPaymaster {
            deployer,
            sponsor_token,
            response,
        })
        .await?
    }

    /// Fund a policy engine
    pub async fn fund_paymaster(&self, funder: AccountId, paymaster: AccountId, amount: NativeAmount) -> Result<()> {
        self.request(|response| RuntimeMessage::FundPaymaster {
            funder,
            paymaster,
            amount,
            response,
        })
        .await?
    }

    /// Native transfer
    pub async fn transfer_native(&self, from: AccountId, to: AccountId, amount: NativeAmount) -> Result<()> {
        self.request(|response| RuntimeMessage::TransferNative {
            from,
            to,
            amount,
            response,
        })
        .await?
    }

    /// Gas estimate
    pub async fn estimate_gas(&self, call: Call) -> Result<u64> {
        self.request(|response| RuntimeMessage::EstimateGas { call, response })
            .await
    }

    /// Token balance
    pub async fn token_balance(&self, token: AccountId, account: AccountId) -> Result<Amount> {
        self.request(|response| RuntimeMessage::TokenBalance {
            token,
            account,
            response,
        })
        .await
    }

    /// Native balance
    pub async fn native_balance(&self, account: AccountId) -> Result<NativeAmount> {
        self.request(|response| RuntimeMessage::NativeBalance { account, response })
            .await
    }

    /// Ledger snapshot
    pub async fn token(&self, address: AccountId) -> Result<Option<TokenLedger>> {
        self.request(|response| RuntimeMessage::GetToken { address, response })
            .await
    }

    /// Policy engine snapshot
    pub async fn paymaster(&self, address: AccountId) -> Result<Option<Paymaster>> {
        self.request(|response| RuntimeMessage::GetPaymaster { address, response })
            .await
    }

    /// Next signed-call nonce
    pub async fn nonce_of(&self, account: AccountId) -> Result<u64> {
        self.request(|response| RuntimeMessage::NonceOf { account, response })
            .await
    }

    /// At most `limit` committed events from `from` on
    pub async fn events_since(&self, from: u64, limit: usize) -> Result<Vec<EventRecord>> {
        self.request(|response| RuntimeMessage::EventsSince {
            from,
            limit,
            response,
        })
        .await?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RuntimeMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the runtime actor
pub fn spawn_runtime_actor(runtime: Runtime, mailbox_capacity: usize) -> (RuntimeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = RuntimeActor::new(runtime, rx);

    let task = tokio::spawn(async move {
        actor.run().await;
    });

    (RuntimeHandle::new(tx), task)
}
