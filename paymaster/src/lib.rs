//! Fee-sponsorship policy engine ("paymaster")
//!
//! Decides, per call, whether the network fee may be paid on the payer's
//! behalf, and accounts for the native funds that back those decisions.
//!
//! # Two-phase protocol
//!
//! 1. **Validate**: [`Paymaster::validate_sponsorship`] runs the ordered
//!    eligibility checks and, on success, reserves the fee bound from the
//!    engine's funds, returning a [`Reservation`].
//! 2. **Settle**: once the actual fee is known, [`Paymaster::settle`] consumes
//!    the reservation and returns the unused part to the funds. Aborted
//!    executions hand the reservation back through [`Paymaster::release`].

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod types;
pub mod policy;

pub use error::{Error, Result};
pub use types::*;
pub use policy::{Paymaster, SponsoredToken};
