//! Exchange service: every ledger operation as one serialized transaction.
//!
//! This is the surface the daemon, the bot reconciler and the scheduler call.
//! Each method submits exactly one unit of work to the executor, except the
//! sweeps, which loop one row per transaction.

use crate::deposit::{self, Confirmation, CustodyVerdict};
use crate::error::{EngineError, EngineResult};
use crate::lifecycle;
use crate::matching::{self, BuyOutcome, SellOutcome};
use crate::policy::Policy;
use crate::ports::BotDirectory;
use crate::withdrawal::{self, WithdrawalReceipt};
use serde::{Deserialize, Serialize};
use stash_domain::{
    now_unix, BotUuid, BuyOrder, Listing, ListingId, ObservedItem, PendingDeposit,
    PendingWithdrawal, Price, Quantity, Slot, SlotIndex, StorageSlot, UnixSeconds, User, UserId,
    WithdrawalCode,
};
use stash_store::{listings, orders, slots, users, CancelScope, TxExecutor};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Counts from one slot lifecycle sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub renewed: u64,
    pub locked: u64,
    pub force_sold: u64,
}

/// Ledger service over the single-writer executor.
#[derive(Clone)]
pub struct Exchange {
    executor: Arc<TxExecutor>,
    directory: Arc<dyn BotDirectory>,
    policy: Policy,
}

impl Exchange {
    pub fn new(executor: Arc<TxExecutor>, directory: Arc<dyn BotDirectory>, policy: Policy) -> Self {
        Self {
            executor,
            directory,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn executor(&self) -> &Arc<TxExecutor> {
        &self.executor
    }

    // =========================================================================
    // Accounts and catalogue
    // =========================================================================

    /// Create the account with defaults on first sight
    pub async fn ensure_user(&self, user_id: UserId) -> EngineResult<User> {
        self.executor
            .run(move |tx| Box::pin(async move { Ok(users::ensure_user(tx.conn(), user_id).await?) }))
            .await
    }

    pub async fn user(&self, user_id: UserId) -> EngineResult<User> {
        self.executor
            .run(move |tx| {
                Box::pin(async move {
                    users::get_user(tx.conn(), user_id)
                        .await
                        .map_err(|e| EngineError::or_not_found(e, EngineError::UserNotFound(user_id)))
                })
            })
            .await
    }

    pub async fn listings(&self) -> EngineResult<Vec<Listing>> {
        self.executor
            .run(|tx| Box::pin(async move { Ok(listings::all_listings(tx.conn()).await?) }))
            .await
    }

    pub async fn slots(&self, user_id: UserId) -> EngineResult<Vec<Slot>> {
        self.executor
            .run(move |tx| Box::pin(async move { Ok(slots::slots_of(tx.conn(), user_id).await?) }))
            .await
    }

    pub async fn buy_orders(&self, user_id: UserId) -> EngineResult<Vec<BuyOrder>> {
        self.executor
            .run(move |tx| Box::pin(async move { Ok(orders::orders_of(tx.conn(), user_id).await?) }))
            .await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Sell slot `index` for `ask` each
    pub async fn place_sell_order(
        &self,
        user_id: UserId,
        index: SlotIndex,
        ask: i64,
    ) -> EngineResult<SellOutcome> {
        let price = Price::ask(ask)?;
        let policy = self.policy.clone();
        self.executor
            .run(move |tx| {
                Box::pin(async move {
                    matching::place_sell_order(tx, &policy, user_id, index, price, now_unix()).await
                })
            })
            .await
    }

    /// Buy up to `quantity` of a listing for at most `bid` each
    pub async fn place_buy_order(
        &self,
        user_id: UserId,
        listing_id: ListingId,
        bid: i64,
        quantity: i64,
    ) -> EngineResult<BuyOutcome> {
        let price = Price::bid(bid)?;
        let quantity = Quantity::new(quantity)?;
        let policy = self.policy.clone();
        self.executor
            .run(move |tx| {
                Box::pin(async move {
                    matching::place_buy_order(tx, &policy, user_id, listing_id, price, quantity, now_unix())
                        .await
                })
            })
            .await
    }

    /// Cancel buy orders in `scope`; returns the refund
    pub async fn cancel_buy_orders(&self, user_id: UserId, scope: CancelScope) -> EngineResult<i64> {
        self.executor
            .run(move |tx| Box::pin(async move { matching::cancel_buy_orders(tx, user_id, scope).await }))
            .await
    }

    pub async fn cancel_sell_order(&self, user_id: UserId, index: SlotIndex) -> EngineResult<()> {
        self.executor
            .run(move |tx| Box::pin(async move { matching::cancel_sell_order(tx, user_id, index).await }))
            .await
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    pub async fn create_deposit(&self, user_id: UserId, listing_id: ListingId) -> EngineResult<PendingDeposit> {
        let policy = self.policy.clone();
        self.executor
            .run(move |tx| {
                Box::pin(async move {
                    deposit::create_deposit(tx, &policy, user_id, listing_id, now_unix()).await
                })
            })
            .await
    }

    /// A bot holds `raw_item` in its moving inventory on `server`.
    ///
    /// Any doubt, including a storage fault, means the bot must not keep it.
    pub async fn bot_picked_up(&self, server: &str, raw_item: &str) -> CustodyVerdict {
        let Some(item) = ObservedItem::parse(raw_item) else {
            return CustodyVerdict::Drop;
        };
        let server = server.to_string();

        let result = self
            .executor
            .run(move |tx| {
                Box::pin(async move {
                    let listing = listings::find_by_contents(tx.conn(), &item.contents, &server)
                        .await?
                        .ok_or(EngineError::UnknownItem(item.deposit_id))?;
                    deposit::record_pickup(tx, item.deposit_id, listing.id, now_unix()).await
                })
            })
            .await;

        match result {
            Ok(_) => CustodyVerdict::Keep,
            Err(e) => {
                debug!(error = %e, "Pickup rejected");
                CustodyVerdict::Drop
            },
        }
    }

    /// A bot sees `raw_item` in slot `slot` of its remote storage on `server`.
    ///
    /// Only a definite "not accounted for" answer drops the item. Faults and
    /// unrecognized contents keep it.
    pub async fn bot_stored(
        &self,
        bot: BotUuid,
        server: &str,
        slot: StorageSlot,
        raw_item: &str,
    ) -> CustodyVerdict {
        let Some(item) = ObservedItem::parse(raw_item) else {
            return CustodyVerdict::Keep;
        };
        let deposit_id = item.deposit_id;
        let server = server.to_string();
        let policy = self.policy.clone();

        let result = self
            .executor
            .run(move |tx| {
                Box::pin(async move {
                    let Some(listing) =
                        listings::find_by_contents(tx.conn(), &item.contents, &server).await?
                    else {
                        return Ok(None);
                    };
                    deposit::confirm_in_storage(
                        tx,
                        &policy,
                        bot,
                        slot,
                        item.deposit_id,
                        listing.id,
                        now_unix(),
                    )
                    .await
                    .map(Some)
                })
            })
            .await;

        match result {
            Ok(Some(Confirmation::Credited { .. } | Confirmation::AlreadyHeld)) => CustodyVerdict::Keep,
            Ok(None) => {
                debug!(%deposit_id, "Unrecognized contents in storage, keeping");
                CustodyVerdict::Keep
            },
            Err(EngineError::DepositUndeliverable { deposit_id, user_id }) => {
                let closed = self
                    .executor
                    .run(move |tx| Box::pin(async move { deposit::abandon_deposit(tx, deposit_id, user_id).await }))
                    .await;
                if let Err(e) = closed {
                    warn!(error = %e, %deposit_id, "Failed to close undeliverable deposit");
                }
                info!(%deposit_id, user_id, "Deposit undeliverable, dropping");
                CustodyVerdict::Drop
            },
            Err(e @ (EngineError::UnknownItem(_) | EngineError::MisplacedItem { .. })) => {
                info!(error = %e, %bot, %slot, "Item not accounted for, dropping");
                CustodyVerdict::Drop
            },
            Err(e) => {
                if e.is_fatal() {
                    error!(error = %e, %bot, %slot, "Custody check failed");
                } else {
                    warn!(error = %e, %bot, %slot, "Custody check failed, keeping item");
                }
                CustodyVerdict::Keep
            },
        }
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    pub async fn create_withdrawal(&self, user_id: UserId, index: SlotIndex) -> EngineResult<PendingWithdrawal> {
        let policy = self.policy.clone();
        let directory = self.directory.clone();
        self.executor
            .run(move |tx| {
                Box::pin(async move {
                    withdrawal::create_withdrawal(tx, &policy, directory.as_ref(), user_id, index, now_unix())
                        .await
                })
            })
            .await
    }

    pub async fn redeem_withdrawal(&self, code: WithdrawalCode) -> EngineResult<WithdrawalReceipt> {
        let directory = self.directory.clone();
        self.executor
            .run(move |tx| {
                Box::pin(async move { withdrawal::redeem_withdrawal(tx, directory.as_ref(), code).await })
            })
            .await
    }

    // =========================================================================
    // Sweeps
    // =========================================================================

    /// Auto-renew, then force-lock and force-sell one slot per transaction
    pub async fn sweep_slots(&self, now: UnixSeconds) -> EngineResult<SweepReport> {
        let mut report = SweepReport::default();

        let policy = self.policy.clone();
        report.renewed = self
            .executor
            .run(move |tx| Box::pin(async move { lifecycle::auto_renew(tx, &policy, now).await }))
            .await?;

        loop {
            let policy = self.policy.clone();
            let locked = self
                .executor
                .run(move |tx| Box::pin(async move { lifecycle::force_lock_next(tx, &policy, now).await }))
                .await?;
            if locked.is_none() {
                break;
            }
            report.locked += 1;
        }

        loop {
            let policy = self.policy.clone();
            let sold = self
                .executor
                .run(move |tx| Box::pin(async move { lifecycle::force_sell_next(tx, &policy, now).await }))
                .await?;
            if sold.is_none() {
                break;
            }
            report.force_sold += 1;
        }

        Ok(report)
    }

    /// Delete abandoned deposits
    pub async fn sweep_deposits(&self, now: UnixSeconds) -> EngineResult<u64> {
        let policy = self.policy.clone();
        self.executor
            .run(move |tx| Box::pin(async move { deposit::expire_deposits(tx, &policy, now).await }))
            .await
    }

    /// Release expired withdrawals, one per transaction
    pub async fn sweep_withdrawals(&self, now: UnixSeconds) -> EngineResult<u64> {
        let mut released = 0;
        while self
            .executor
            .run(move |tx| Box::pin(async move { withdrawal::expire_next_withdrawal(tx, now).await }))
            .await?
            .is_some()
        {
            released += 1;
        }
        Ok(released)
    }
}

