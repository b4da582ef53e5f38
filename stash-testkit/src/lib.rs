//! Test helpers for Stash ledger tests.
//!
//! Provides an in-memory ledger behind a running executor, plus seeding
//! helpers for listings, users and confirmed items.

mod helpers;

pub use helpers::{
    balance, bot_report, deposit, expire_deposit, expire_slot, expire_withdrawal, item,
    money_supply, orders, seed_item, seed_listing, seed_user, set_max_slots, slots, test_bot,
    trade_count, withdrawal,
};

pub use anyhow::Result;
use stash_domain::Notification;
use stash_store::{schema, TxExecutor};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A migrated in-memory ledger and the notifications it released.
pub struct TestLedger {
    pub executor: Arc<TxExecutor>,
    notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestLedger {
    /// Notifications released by committed transactions so far
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

/// Setup a fresh in-memory ledger with the full schema.
///
/// Each call gets its own database; nothing is shared between tests.
pub async fn setup_test_ledger() -> Result<TestLedger> {
    let mut conn = schema::connect("sqlite::memory:").await?;
    schema::migrate(&mut conn).await?;
    let (sender, notifications) = mpsc::unbounded_channel();
    Ok(TestLedger {
        executor: Arc::new(TxExecutor::spawn(conn, Some(sender))),
        notifications,
    })
}
