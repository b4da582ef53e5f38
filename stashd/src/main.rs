//! Stash Daemon
//!
//! Runs the exchange: ledger executor, bot listener, sweeps and control API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration
//! cargo run -p stashd
//!
//! # Database maintenance
//! cargo run -p stashd -- db migrate
//! cargo run -p stashd -- db status
//! cargo run -p stashd -- db seed --server 2b2t.org
//! ```
//!
//! # Environment Variables
//!
//! - `STASH_ENV`: Environment (test, development, production)
//! - `STASH_DATABASE_URL`: Ledger database (default: sqlite://exchange.db)
//! - `STASH_BOT_HOST` / `STASH_BOT_PORT`: Bot listener (default: 0.0.0.0:5021)
//! - `STASH_API_HOST` / `STASH_API_PORT`: Control API (default: 0.0.0.0:3000)
//! - `STASH_SWEEP_INTERVAL_SECS`: Sweep cadence (default: 10)
//! - `STASH_DEPOSIT_TTL_SECS` / `STASH_WITHDRAWAL_TTL_SECS`: Pending lifetimes (default: 900)
//! - `STASH_LISTINGS_FILE`: Extra listings to seed (JSON)
//! - `STASH_DEFAULT_SERVER`: Server of the built-in listings (default: 2b2t.org)

use stashd::{db, Config, Daemon};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("stashd=info".parse()?)
                .add_directive("stash_engine=info".parse()?)
                .add_directive("stash_store=info".parse()?),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(String::as_str) == Some("db") {
        return db::run_db_command(&config, &args).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api = %config.api.addr(),
        bots = %config.bots.addr(),
        database = %config.store.database_url,
        "Stash daemon"
    );

    Daemon::new(config).run().await?;

    Ok(())
}
