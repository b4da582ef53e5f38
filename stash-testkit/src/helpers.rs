//! Seeding and inspection helpers.
//!
//! Every helper runs as its own transaction on the executor, so what it
//! writes is committed and visible to the next operation under test.

use anyhow::Context;
use stash_domain::{
    full_container_key, now_unix, BotUuid, BuyOrder, DepositId, InventoryItem, Listing, ListingId,
    NewListing, PendingDeposit, PendingWithdrawal, Slot, SlotIndex, StorageSlot, UnixSeconds, User,
    UserId, WithdrawalCode,
};
use stash_store::{
    audit, deposits, inventory, listings, orders as order_book, slots as slot_store, trades, users,
    withdrawals, NewSlot, StoreError, TxExecutor,
};

use crate::Result;

const SEEDED_SLOT_LIFETIME: i64 = 86_400;
const SEEDED_RENEWALS: i64 = 14;

/// A fixed bot identity; `n` picks one of several distinct bots
pub fn test_bot(n: u8) -> BotUuid {
    format!("00000000-0000-4000-8000-0000000000{:02x}", n)
        .parse()
        .unwrap_or_else(|e| panic!("invalid test bot uuid: {}", e))
}

/// Raw item string a bot would report for a deposit container of `listing`
pub fn bot_report(deposit_id: DepositId, listing: &Listing) -> String {
    format!(
        "{}$tile.shulkerBox;10;1;{}",
        stash_domain::deposit_item_name(deposit_id),
        listing.item_key
    )
}

/// Seed a listing of full containers of `item` on `server`.
///
/// Idempotent per (server, item).
pub async fn seed_listing(executor: &TxExecutor, server: &str, item: &str) -> Result<Listing> {
    let new = NewListing {
        server: server.to_string(),
        item_key: full_container_key(item),
        name: item.to_string(),
        photo: String::new(),
    };
    let listing = executor
        .run(move |tx| {
            Box::pin(async move {
                listings::insert_listing(tx.conn(), &new).await?;
                listings::find_by_contents(tx.conn(), &new.item_key, &new.server).await
            })
        })
        .await?;
    listing.context("seeded listing not found")
}

/// Seed a user with `balance`
pub async fn seed_user(executor: &TxExecutor, user_id: UserId, balance: i64) -> Result<User> {
    Ok(executor
        .run(move |tx| {
            Box::pin(async move {
                users::ensure_user(tx.conn(), user_id).await?;
                users::set_balance(tx.conn(), user_id, balance).await?;
                users::get_user(tx.conn(), user_id).await
            })
        })
        .await?)
}

pub async fn set_max_slots(executor: &TxExecutor, user_id: UserId, max_slots: i64) -> Result<()> {
    Ok(executor
        .run(move |tx| Box::pin(async move { users::set_max_slots(tx.conn(), user_id, max_slots).await }))
        .await?)
}

/// Seed a confirmed item held by `bot` and the slot that owns it.
///
/// Keeps conservation intact: one inventory row and one slot, in the user's
/// lowest free slot index. Returns the slot index and the item id.
pub async fn seed_item(
    executor: &TxExecutor,
    user_id: UserId,
    listing_id: ListingId,
    bot: BotUuid,
    storage_slot: i64,
) -> Result<(SlotIndex, DepositId)> {
    let slot = StorageSlot::new(storage_slot)?;
    Ok(executor
        .run(move |tx| {
            Box::pin(async move {
                let next_id: i64 = sqlx::query_scalar(
                    "SELECT COALESCE(MAX(id), 0) + 1 FROM \
                     (SELECT item_id AS id FROM inventory UNION ALL SELECT deposit_id AS id FROM pending_deposits)",
                )
                .fetch_one(&mut *tx.conn())
                .await?;
                let item_id = DepositId::from_column(next_id)?;

                inventory::insert_item(
                    tx.conn(),
                    &InventoryItem {
                        item_id,
                        listing_id,
                        bot_uuid: bot,
                        slot,
                    },
                )
                .await?;

                let used = slot_store::used_indexes(tx.conn(), user_id).await?;
                let index = (0..).find(|i| !used.contains(i)).unwrap_or_default();
                slot_store::insert_slot(
                    tx.conn(),
                    NewSlot {
                        user_id,
                        index,
                        listing_id,
                        expiry_time: now_unix() + SEEDED_SLOT_LIFETIME,
                        renewals: SEEDED_RENEWALS,
                    },
                )
                .await?;
                Ok::<_, StoreError>((index, item_id))
            })
        })
        .await?)
}

/// Move a slot's expiry to `at`
pub async fn expire_slot(executor: &TxExecutor, user_id: UserId, index: SlotIndex, at: UnixSeconds) -> Result<()> {
    Ok(executor
        .run(move |tx| Box::pin(async move { slot_store::set_expiry(tx.conn(), user_id, index, at).await }))
        .await?)
}

/// Move a pending deposit's expiry to `at`
pub async fn expire_deposit(executor: &TxExecutor, deposit_id: DepositId, at: UnixSeconds) -> Result<()> {
    Ok(executor
        .run(move |tx| {
            Box::pin(async move {
                sqlx::query("UPDATE pending_deposits SET expiry_time = ? WHERE deposit_id = ?")
                    .bind(at)
                    .bind(deposit_id.as_column())
                    .execute(&mut *tx.conn())
                    .await?;
                Ok::<_, StoreError>(())
            })
        })
        .await?)
}

/// Move a pending withdrawal's expiry to `at`
pub async fn expire_withdrawal(executor: &TxExecutor, code: WithdrawalCode, at: UnixSeconds) -> Result<()> {
    Ok(executor
        .run(move |tx| {
            Box::pin(async move {
                sqlx::query("UPDATE pending_withdrawals SET expiry_time = ? WHERE withdrawal_code = ?")
                    .bind(at)
                    .bind(code.value())
                    .execute(&mut *tx.conn())
                    .await?;
                Ok::<_, StoreError>(())
            })
        })
        .await?)
}

pub async fn balance(executor: &TxExecutor, user_id: UserId) -> Result<i64> {
    let user = executor
        .run(move |tx| Box::pin(async move { users::get_user(tx.conn(), user_id).await }))
        .await?;
    Ok(user.balance)
}

pub async fn slots(executor: &TxExecutor, user_id: UserId) -> Result<Vec<Slot>> {
    Ok(executor
        .run(move |tx| Box::pin(async move { slot_store::slots_of(tx.conn(), user_id).await }))
        .await?)
}

pub async fn orders(executor: &TxExecutor, user_id: UserId) -> Result<Vec<BuyOrder>> {
    Ok(executor
        .run(move |tx| Box::pin(async move { order_book::orders_of(tx.conn(), user_id).await }))
        .await?)
}

pub async fn trade_count(executor: &TxExecutor) -> Result<i64> {
    Ok(executor
        .run(|tx| Box::pin(async move { trades::count_trades(tx.conn()).await }))
        .await?)
}

/// Balances plus escrow of every open buy order
pub async fn money_supply(executor: &TxExecutor) -> Result<i64> {
    Ok(executor
        .run(|tx| Box::pin(async move { audit::money_supply(tx.conn()).await }))
        .await?)
}

pub async fn item(executor: &TxExecutor, item_id: DepositId) -> Result<Option<InventoryItem>> {
    Ok(executor
        .run(move |tx| Box::pin(async move { inventory::get_item(tx.conn(), item_id).await }))
        .await?)
}

pub async fn deposit(executor: &TxExecutor, deposit_id: DepositId) -> Result<Option<PendingDeposit>> {
    Ok(executor
        .run(move |tx| Box::pin(async move { deposits::get_deposit(tx.conn(), deposit_id).await }))
        .await?)
}

pub async fn withdrawal(executor: &TxExecutor, code: WithdrawalCode) -> Result<Option<PendingWithdrawal>> {
    Ok(executor
        .run(move |tx| Box::pin(async move { withdrawals::get_withdrawal(tx.conn(), code).await }))
        .await?)
}
