//! Deposit reconciliation.
//!
//! ```text
//! none → pending → picked up → confirmed (slot granted)
//!                      ↘ rejected (drop it back)
//! ```
//!
//! Confirmation only ever yields a drop verdict for the specific custody
//! errors; anything else leaves the item where it is.

use crate::error::{EngineError, EngineResult};
use crate::matching;
use crate::policy::Policy;
use rand::Rng;
use serde::{Deserialize, Serialize};
use stash_domain::{
    deposit_item_name, BotUuid, DepositId, InventoryItem, ListingId, PendingDeposit, SlotIndex,
    StorageSlot, UnixSeconds, UserId,
};
use stash_store::{audit, deposits, inventory, listings, users, Tx};
use tracing::{debug, info};

const MAX_ID_ATTEMPTS: usize = 16;

/// Whether a bot should keep an item it is holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CustodyVerdict {
    Keep,
    Drop,
}

/// Result of a confirmed remote-storage observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// A pending deposit became inventory and a slot was granted
    Credited { user_id: UserId, slot_index: SlotIndex },
    /// Already in inventory at exactly this bot and slot
    AlreadyHeld,
}

fn random_deposit_id() -> DepositId {
    loop {
        if let Ok(id) = DepositId::new(rand::thread_rng().gen()) {
            return id;
        }
    }
}

/// Open a deposit for `user_id` into `listing_id`.
///
/// The returned id, rendered by [`deposit_item_name`], is the name the item
/// must carry when handed to a bot.
pub async fn create_deposit(
    tx: &mut Tx<'_>,
    policy: &Policy,
    user_id: UserId,
    listing_id: ListingId,
    now: UnixSeconds,
) -> EngineResult<PendingDeposit> {
    users::get_user(tx.conn(), user_id)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::UserNotFound(user_id)))?;
    listings::get_listing(tx.conn(), listing_id)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::ListingNotFound(listing_id)))?;

    let mut deposit_id = None;
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = random_deposit_id();
        if !deposits::id_in_use(tx.conn(), candidate).await? {
            deposit_id = Some(candidate);
            break;
        }
    }
    let deposit_id = deposit_id.ok_or_else(|| {
        EngineError::SlotUnavailable("Unable to allocate a deposit id, try again".to_string())
    })?;

    let deposit = PendingDeposit {
        deposit_id,
        user_id,
        listing_id,
        expiry_time: now + policy.deposit_ttl_secs,
        picked_up_at: None,
    };
    deposits::insert_deposit(tx.conn(), &deposit).await?;
    info!(user_id, listing_id, item_name = %deposit_item_name(deposit_id), "Deposit opened");
    Ok(deposit)
}

/// A bot picked up an item named for `deposit_id` whose contents match `listing_id`.
///
/// Idempotent: a repeated pickup just refreshes `picked_up_at`.
///
/// # Errors
/// [`EngineError::UnknownItem`] when no unexpired deposit matches; the bot
/// must not keep the item.
pub async fn record_pickup(
    tx: &mut Tx<'_>,
    deposit_id: DepositId,
    listing_id: ListingId,
    now: UnixSeconds,
) -> EngineResult<PendingDeposit> {
    let deposit = deposits::get_deposit(tx.conn(), deposit_id)
        .await?
        .filter(|d| d.listing_id == listing_id && d.expiry_time > now)
        .ok_or(EngineError::UnknownItem(deposit_id))?;

    if !deposits::mark_picked_up(tx.conn(), deposit_id, listing_id, now).await? {
        return Err(EngineError::UnknownItem(deposit_id));
    }

    if deposit.picked_up_at.is_none() {
        tx.notify(
            deposit.user_id,
            format!(
                "The deposit bot has picked up your item for listing {} and verified its contents and name. \
                 Ender chest verification is pending, and should only take a few seconds.",
                listing_id
            ),
        );
    }
    debug!(user_id = deposit.user_id, %deposit_id, "Deposit picked up");
    Ok(PendingDeposit {
        picked_up_at: Some(now),
        ..deposit
    })
}

/// A bot reports the item sitting in slot `slot` of its remote storage.
///
/// # Errors
/// - [`EngineError::DepositUndeliverable`] when the owner has no free slot
/// - [`EngineError::UnknownItem`] when it is neither pending nor inventory
/// - [`EngineError::MisplacedItem`] when inventory places it elsewhere
pub async fn confirm_in_storage(
    tx: &mut Tx<'_>,
    policy: &Policy,
    bot: BotUuid,
    slot: StorageSlot,
    deposit_id: DepositId,
    listing_id: ListingId,
    now: UnixSeconds,
) -> EngineResult<Confirmation> {
    let pending = deposits::get_deposit(tx.conn(), deposit_id)
        .await?
        .filter(|d| d.listing_id == listing_id);

    let Some(deposit) = pending else {
        return match inventory::get_item(tx.conn(), deposit_id).await? {
            None => Err(EngineError::UnknownItem(deposit_id)),
            Some(item) if item.bot_uuid == bot && item.slot == slot => Ok(Confirmation::AlreadyHeld),
            Some(item) => Err(EngineError::MisplacedItem {
                item: deposit_id,
                expected_bot: item.bot_uuid,
                expected_slot: item.slot,
            }),
        };
    };

    deposits::delete_deposit(tx.conn(), deposit_id).await?;
    inventory::insert_item(
        tx.conn(),
        &InventoryItem {
            item_id: deposit_id,
            listing_id,
            bot_uuid: bot,
            slot,
        },
    )
    .await?;

    let slot_index = match matching::grant_slot(tx, policy, deposit.user_id, listing_id, now).await {
        Ok(index) => index,
        Err(EngineError::NoFreeSlots) => {
            return Err(EngineError::DepositUndeliverable {
                deposit_id,
                user_id: deposit.user_id,
            })
        },
        Err(e) => return Err(e),
    };
    audit::verify_conservation(tx.conn()).await?;

    info!(user_id = deposit.user_id, %deposit_id, %bot, %slot, slot_index, "Deposit confirmed");
    tx.notify(
        deposit.user_id,
        format!("Deposit confirmed! The item is in slot #{} of your account.", slot_index),
    );
    Ok(Confirmation::Credited {
        user_id: deposit.user_id,
        slot_index,
    })
}

/// Close a deposit that can never be credited, after its confirmation rolled back
pub async fn abandon_deposit(tx: &mut Tx<'_>, deposit_id: DepositId, user_id: UserId) -> EngineResult<()> {
    deposits::delete_deposit(tx.conn(), deposit_id).await?;
    tx.notify(
        user_id,
        "Error while completing deposit: all of your slots are full. The bot will drop the item back to you.",
    );
    Ok(())
}

/// Delete expired deposits; returns how many were removed
pub async fn expire_deposits(tx: &mut Tx<'_>, policy: &Policy, now: UnixSeconds) -> EngineResult<u64> {
    let removed = deposits::delete_abandoned(tx.conn(), now, policy.stuck_deposit_secs).await?;
    if removed > 0 {
        debug!(removed, "Expired deposits removed");
    }
    Ok(removed)
}
