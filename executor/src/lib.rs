//! BUIDL BUXX Execution Environment
//!
//! Hosts token ledgers and fee-sponsorship engines behind one single-writer
//! runtime: call dispatch, gas metering, native-currency fees, two-phase
//! sponsored execution, RocksDB persistence and Prometheus metrics.
//!
//! # Architecture
//!
//! - **Runtime**: staged, all-or-nothing execution of one call at a time
//! - **Storage**: RocksDB column families, one `WriteBatch` per commit
//! - **Actor**: Tokio task owning the runtime; handles are cheap to clone
//! - **Exporter**: axum router serving metrics and the event log to operators
//!
//! # Guarantees
//!
//! - An aborted call leaves ledgers, engines and native balances unchanged
//! - Sponsored fees come out of the engine's funds, never the payer's
//! - Transfer events are numbered densely in commit order

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, missing_debug_implementations, clippy::all)]

pub mod actor;
pub mod bank;
pub mod config;
pub mod error;
pub mod exporter;
pub mod gas;
pub mod metrics;
pub mod runtime;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::{spawn_runtime_actor, RuntimeHandle};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use gas::GasSchedule;
pub use runtime::Runtime;
pub use types::{Call, EventRecord, FeePayer, Operation, Receipt, SignedCall};
