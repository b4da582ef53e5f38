//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Transaction executor (the single ledger writer)
//! - Notification dispatcher (post-commit user messages)
//! - Bot listener and reconciler (physical custody)
//! - Sweep scheduler (slot lifecycle, deposit and withdrawal expiry)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Open storage, migrate, seed listings
//! 2. Start the executor and notification dispatcher
//! 3. Start the bot listener, API server and sweeps
//! 4. Wait for SIGINT
//! 5. Stop accepting bots and requests, drain the executor, close storage

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info};

use stash_connectors::{listen, BotFleet};
use stash_engine::Exchange;
use stash_store::{schema, seed, TxExecutor};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};
use crate::notifier::{spawn_dispatcher, LogNotifier, Notifier};
use crate::reconciler::{FleetDirectory, Reconciler};
use crate::scheduler::run_sweeps;

// =============================================================================
// Daemon
// =============================================================================

/// The main stash daemon.
pub struct Daemon {
    config: Config,
    notifier: Arc<dyn Notifier>,
}

/// A started daemon; dropping it does not stop anything, call [`shutdown`](Self::shutdown).
pub struct RunningDaemon {
    pub api_addr: SocketAddr,
    pub bot_addr: SocketAddr,
    pub fleet: Arc<BotFleet>,
    pub exchange: Exchange,
    executor: Arc<TxExecutor>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    sessions: TaskTracker,
    dispatcher_shutdown: CancellationToken,
    dispatcher: JoinHandle<()>,
}

impl Daemon {
    /// Daemon that logs notifications.
    pub fn new(config: Config) -> Self {
        Self::with_notifier(config, Arc::new(LogNotifier))
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting stash daemon"
        );

        let running = self.start().await?;

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal");

        running.shutdown().await;
        Ok(())
    }

    /// Bring every component up and return once all listeners are bound.
    pub async fn start(self) -> DaemonResult<RunningDaemon> {
        let Self { config, notifier } = self;

        // 1. Storage
        let mut conn = schema::connect(&config.store.database_url).await?;
        schema::migrate(&mut conn).await?;
        let mut listings = seed::builtin_listings(&config.store.default_server);
        if let Some(path) = &config.store.listings_file {
            listings.extend(seed::load_listings_file(path).await?);
        }
        seed::seed_listings(&mut conn, &listings).await?;

        // 2. Executor and notifications
        let (outbox, notifications) = mpsc::unbounded_channel();
        let executor = Arc::new(TxExecutor::spawn(conn, Some(outbox)));
        let dispatcher_shutdown = CancellationToken::new();
        let dispatcher = spawn_dispatcher(notifications, notifier, dispatcher_shutdown.clone());

        let fleet = Arc::new(BotFleet::new(config.policy.bot_liveness));
        let directory = Arc::new(FleetDirectory(fleet.clone()));
        let exchange = Exchange::new(executor.clone(), directory, config.policy.clone());
        let reconciler = Arc::new(Reconciler::new(exchange.clone(), fleet.clone()));

        // 3. Listeners and timers
        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();
        let sessions = TaskTracker::new();

        let bot_listener = bind(&config.bots.addr()).await?;
        let bot_addr = local_addr(&bot_listener)?;
        let token = shutdown.clone();
        let (bot_fleet, handler) = (fleet.clone(), reconciler.clone());
        tasks.push(tokio::spawn(listen(
            bot_listener,
            bot_fleet,
            handler,
            sessions.clone(),
            token,
        )));
        info!(%bot_addr, "Bot listener started");

        let api_listener = bind(&config.api.addr()).await?;
        let api_addr = local_addr(&api_listener)?;
        let router = create_router(Arc::new(ApiState {
            fleet: fleet.clone(),
            reconciler,
        }));
        let token = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            let serving = axum::serve(api_listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serving.await {
                error!(error = %e, "API server error");
            }
        }));
        info!(%api_addr, "API server started");

        tasks.push(tokio::spawn(run_sweeps(
            exchange.clone(),
            config.sweep_interval,
            shutdown.clone(),
        )));

        Ok(RunningDaemon {
            api_addr,
            bot_addr,
            fleet,
            exchange,
            executor,
            shutdown,
            tasks,
            sessions,
            dispatcher_shutdown,
            dispatcher,
        })
    }
}

impl RunningDaemon {
    /// Cooperative shutdown: stop intake, let bot sessions finish the message
    /// they are handling, drain queued transactions, close storage, then
    /// deliver the last notifications.
    pub async fn shutdown(self) {
        info!("Shutting down stash daemon");
        self.shutdown.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Task ended abnormally");
            }
        }

        // sessions must not outlive the executor
        self.sessions.close();
        self.sessions.wait().await;

        self.executor.shutdown().await;
        self.dispatcher_shutdown.cancel();
        if let Err(e) = self.dispatcher.await {
            error!(error = %e, "Notification dispatcher ended abnormally");
        }
        info!("Shutdown complete");
    }
}

async fn bind(addr: &str) -> DaemonResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))
}

fn local_addr(listener: &TcpListener) -> DaemonResult<SocketAddr> {
    listener
        .local_addr()
        .map_err(|e| DaemonError::Config(format!("Failed to get local address: {}", e)))
}
