//! Stash Connectors
//!
//! The bot side of the exchange: the binary wire protocol bots speak, the
//! registry of connected bots, and the TCP session loop that feeds bot
//! observations to a [`BotEventHandler`].
//!
//! # Architecture
//!
//! ```text
//! Bot ──TCP──▶ serve_bot ──▶ BotEventHandler (reconciler)
//!  ▲              │
//!  └── writer ◀── BotFleet::send
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod fleet;
pub mod protocol;
pub mod session;

pub use error::{ProtocolError, ProtocolResult};
pub use fleet::{BotFleet, BotSnapshot, SessionId};
pub use protocol::{
    encode_outbound, inventory_window_slot, read_inbound, write_outbound, BotStatus, ClickKind, Inbound, Outbound,
};
pub use session::{listen, serve_bot, BotEventHandler};
