//! Transaction Executor: the single writer.
//!
//! One worker task owns the only storage connection. Units of work are queued
//! on an unbounded channel and run strictly in arrival order, each inside its
//! own transaction, so no two units ever overlap.
//!
//! # Flow
//!
//! ```text
//! caller → run(work) → queue → worker: BEGIN → work(tx) → COMMIT | ROLLBACK → reply
//!                                                     ↓ (after COMMIT only)
//!                                               notification outbox
//! ```

use crate::error::StoreError;
use futures_util::future::BoxFuture;
use sqlx::{Connection, SqliteConnection};
use stash_domain::{Notification, UserId};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

// =============================================================================
// Transaction handle
// =============================================================================

/// Handle passed to a unit of work.
///
/// Gives access to the open transaction and collects notifications that are
/// released only once the transaction has committed.
pub struct Tx<'c> {
    conn: &'c mut SqliteConnection,
    outbox: Vec<Notification>,
}

impl<'c> Tx<'c> {
    fn new(conn: &'c mut SqliteConnection) -> Self {
        Self {
            conn,
            outbox: Vec::new(),
        }
    }

    /// Connection inside the open transaction
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }

    /// Queue a message for `user_id`, sent only if this transaction commits
    pub fn notify(&mut self, user_id: UserId, message: impl Into<String>) {
        self.outbox.push(Notification::new(user_id, message));
    }

    fn into_outbox(self) -> Vec<Notification> {
        self.outbox
    }
}

// =============================================================================
// Executor
// =============================================================================

type Job = Box<dyn for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, ()> + Send>;

enum Command {
    Run(Job),
    Shutdown(oneshot::Sender<()>),
}

fn job<F>(f: F) -> Job
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, ()> + Send + 'static,
{
    Box::new(f)
}

/// Serializes every storage mutation through one worker.
///
/// Cloning is not offered on purpose; share it behind an `Arc`.
pub struct TxExecutor {
    commands: mpsc::UnboundedSender<Command>,
    outbox: Option<mpsc::UnboundedSender<Notification>>,
}

impl TxExecutor {
    /// Start the worker on an already migrated connection.
    ///
    /// Notifications queued by committed units are forwarded to `outbox`;
    /// with `None` they are discarded.
    pub fn spawn(
        conn: SqliteConnection,
        outbox: Option<mpsc::UnboundedSender<Notification>>,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(worker(conn, receiver));
        Self { commands, outbox }
    }

    /// Run `work` as one transaction and wait for it to commit or roll back.
    ///
    /// Returns the first error raised by `work`; in that case nothing it did
    /// is visible to anyone. Fails with [`StoreError::Closed`] once the
    /// executor has shut down.
    pub async fn run<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<StoreError> + fmt::Display + Send + 'static,
        F: for<'t> FnOnce(&'t mut Tx<'_>) -> BoxFuture<'t, Result<T, E>> + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        let outbox = self.outbox.clone();

        let unit = job(move |conn| {
            Box::pin(async move {
                let result = transact(conn, work, outbox.as_ref()).await;
                // caller may have given up waiting; the outcome stands either way
                let _ = reply.send(result);
            })
        });

        self.commands
            .send(Command::Run(unit))
            .map_err(|_| E::from(StoreError::Closed))?;

        response.await.map_err(|_| E::from(StoreError::Closed))?
    }

    /// Stop accepting work, drain everything already queued, close storage.
    ///
    /// Returns once storage is closed. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown(ack)).is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Whether the worker still accepts work
    pub fn is_open(&self) -> bool {
        !self.commands.is_closed()
    }
}

async fn worker(mut conn: SqliteConnection, mut commands: mpsc::UnboundedReceiver<Command>) {
    info!("Transaction executor started");
    let mut waiting = Vec::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Run(unit) => unit(&mut conn).await,
            Command::Shutdown(ack) => {
                if waiting.is_empty() {
                    info!("Transaction executor draining");
                }
                commands.close();
                waiting.push(ack);
            },
        }
    }

    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close storage cleanly");
    }
    info!("Transaction executor stopped");

    for ack in waiting {
        let _ = ack.send(());
    }
}

async fn transact<T, E, F>(
    conn: &mut SqliteConnection,
    work: F,
    outbox: Option<&mpsc::UnboundedSender<Notification>>,
) -> Result<T, E>
where
    E: From<StoreError> + fmt::Display,
    F: for<'t> FnOnce(&'t mut Tx<'_>) -> BoxFuture<'t, Result<T, E>>,
{
    let mut txn = conn.begin().await.map_err(StoreError::from)?;

    let mut tx = Tx::new(&mut *txn);
    let outcome = work(&mut tx).await;
    let notifications = tx.into_outbox();

    match outcome {
        Ok(value) => {
            txn.commit().await.map_err(StoreError::from)?;
            if let Some(outbox) = outbox {
                for notification in notifications {
                    if outbox.send(notification).is_err() {
                        debug!("Notification dispatcher gone, dropping notification");
                        break;
                    }
                }
            }
            Ok(value)
        },
        Err(err) => {
            warn!(error = %err, "Rolling back transaction");
            if let Err(e) = txn.rollback().await {
                error!(error = %e, "Rollback failed");
            }
            Err(err)
        },
    }
}

// =============================================================================
// Tests
// =============================================================================
