//! Stash Daemon Library
//!
//! Runtime orchestrator for the stash exchange.
//!
//! # Architecture
//!
//! ```text
//! Bots ──TCP──▶ Bot Listener ──▶ Reconciler ──┐
//!                                              ├──▶ Exchange ──▶ Transaction Executor ──▶ SQLite
//! Control API ─────────────────────────────────┤                       │
//! Sweep Scheduler ─────────────────────────────┘                       ▼
//!                                                        Notification Dispatcher
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator and cooperative shutdown
//! - **Reconciler**: Turns bot observations into custody decisions and bot commands
//! - **Scheduler**: Periodic slot, deposit and withdrawal sweeps
//! - **Notifier**: Post-commit delivery of user messages
//! - **API**: HTTP endpoints for operators
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use stashd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     Daemon::new(config).run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod notifier;
pub mod reconciler;
pub mod scheduler;

// Re-exports for convenience
pub use config::{Config, Environment, ListenConfig, StoreConfig};
pub use daemon::{Daemon, RunningDaemon};
pub use error::{DaemonError, DaemonResult};
pub use notifier::{LogNotifier, Notifier};
pub use reconciler::{FleetDirectory, Reconciler};
pub use scheduler::{sweep_once, TickReport};
