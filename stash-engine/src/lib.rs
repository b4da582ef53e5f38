//! Stash Engine Layer
//!
//! Ledger rules on top of the storage layer: order matching and settlement,
//! the slot lifecycle, and deposit and withdrawal reconciliation against
//! what the bot fleet observes.
//!
//! Every operation runs inside one executor transaction. Functions in the
//! submodules take a [`stash_store::Tx`] so they compose; [`Exchange`] wraps
//! each one in its own transaction for callers outside the engine.

#![warn(clippy::all)]

pub mod deposit;
mod error;
mod exchange;
pub mod lifecycle;
pub mod matching;
pub mod policy;
pub mod ports;
pub mod withdrawal;

pub use deposit::{Confirmation, CustodyVerdict};
pub use error::{EngineError, EngineResult};
pub use exchange::{Exchange, SweepReport};
pub use matching::{BuyOutcome, SellOutcome, Settlement};
pub use policy::Policy;
pub use ports::{BotDirectory, BotPosition, StaticDirectory};
pub use withdrawal::WithdrawalReceipt;
