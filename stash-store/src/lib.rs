//! Stash Storage Layer
//!
//! Persistence for the exchange ledger on SQLite.
//!
//! # Architecture
//!
//! - **Transaction executor**: one worker owns the connection; every unit of
//!   work is a transaction run strictly in arrival order
//! - **Ledger queries**: free functions over `&mut SqliteConnection`, one
//!   module per table, composed by the engine inside a unit of work
//! - **Schema**: embedded migrations, status reporting and listing seeding
//!
//! # Usage
//!
//! ```rust,no_run
//! use stash_store::{schema, users, StoreError, TxExecutor};
//!
//! # async fn demo() -> Result<(), StoreError> {
//! let mut conn = schema::connect("sqlite://exchange.db").await?;
//! schema::migrate(&mut conn).await?;
//! let executor = TxExecutor::spawn(conn, None);
//!
//! let user = executor
//!     .run(|tx| Box::pin(async move { users::ensure_user(tx.conn(), 42).await }))
//!     .await?;
//! assert_eq!(user.balance, 0);
//! executor.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

// Modules
pub mod audit;
pub mod deposits;
mod error;
mod executor;
pub mod inventory;
pub mod listings;
pub mod orders;
pub mod schema;
pub mod seed;
pub mod slots;
pub mod trades;
pub mod users;
pub mod withdrawals;

// Re-exports
pub use error::{StoreError, StoreResult};
pub use executor::{Tx, TxExecutor};
pub use orders::CancelScope;
pub use slots::NewSlot;
pub use withdrawals::Redemption;
