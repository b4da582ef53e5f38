//! Withdrawal reconciliation.
//!
//! ```text
//! unlocked → withdrawal-locked + pending → redeemed (slot, item gone)
//!                                       ↘ expired (slot unlocked again)
//! ```

use crate::error::{EngineError, EngineResult};
use crate::policy::Policy;
use crate::ports::{BotDirectory, BotPosition};
use rand::Rng;
use serde::{Deserialize, Serialize};
use stash_domain::{
    deposit_item_name, BotUuid, DepositId, ListingId, PendingWithdrawal, SlotIndex, UnixSeconds,
    UserId, WithdrawalCode,
};
use stash_store::{audit, inventory, listings, slots, withdrawals, Tx};
use tracing::{debug, info};

const MAX_CODE_ATTEMPTS: usize = 16;

/// Everything a user needs to collect a redeemed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub code: i64,
    pub user_id: UserId,
    pub slot_index: SlotIndex,
    pub listing_id: ListingId,
    pub item_name: String,
    pub server: String,
    pub bot_uuid: BotUuid,
    pub item_id: DepositId,
    /// Where the bot stands, if it is online right now
    pub position: Option<BotPosition>,
}

fn random_code() -> WithdrawalCode {
    // positive 63-bit
    WithdrawalCode::new(rand::thread_rng().gen_range(1..=i64::MAX))
}

/// Lock a slot for withdrawal and reserve a physical item a live bot holds.
///
/// # Errors
/// Missing or expired slot, a slot already locked, or no connected bot
/// holding an unclaimed item of that listing. Nothing changes on error.
pub async fn create_withdrawal(
    tx: &mut Tx<'_>,
    policy: &Policy,
    directory: &dyn BotDirectory,
    user_id: UserId,
    index: SlotIndex,
    now: UnixSeconds,
) -> EngineResult<PendingWithdrawal> {
    let slot = slots::get_slot(tx.conn(), user_id, index)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::SlotNotFound { user_id, index }))?;
    if slot.is_expired(now) {
        return Err(EngineError::SlotUnavailable(
            "Cannot withdraw an expired slot".to_string(),
        ));
    }

    let mut code = None;
    for _ in 0..MAX_CODE_ATTEMPTS {
        let candidate = random_code();
        if withdrawals::get_withdrawal(tx.conn(), candidate).await?.is_none() {
            code = Some(candidate);
            break;
        }
    }
    let code = code.ok_or_else(|| {
        EngineError::SlotUnavailable("Unable to allocate a withdrawal code, try again".to_string())
    })?;
    let locked = slot
        .state
        .lock_for_withdrawal(code)
        .map_err(|e| EngineError::SlotUnavailable(e.to_string()))?;

    let listing = listings::get_listing(tx.conn(), slot.listing_id).await?;
    let live = directory.withdrawal_capable(&listing.server);
    let item = inventory::unclaimed_items(tx.conn(), slot.listing_id)
        .await?
        .into_iter()
        .find(|item| live.contains(&item.bot_uuid))
        .ok_or(EngineError::NoBotAvailable)?;

    let withdrawal = PendingWithdrawal {
        code,
        item_id: item.item_id,
        expiry_time: now + policy.withdrawal_ttl_secs,
    };
    // the slot references the pending row, so it goes in first
    withdrawals::insert_withdrawal(tx.conn(), &withdrawal).await?;
    slots::write_state(tx.conn(), user_id, index, &locked).await?;

    info!(user_id, index, item_id = %item.item_id, bot = %item.bot_uuid, "Withdrawal opened");
    Ok(withdrawal)
}

/// Complete a withdrawal: the slot, the pending row and the inventory item go.
///
/// The holding bot drops the item the next time it sees it in storage, since
/// it is no longer accounted for.
pub async fn redeem_withdrawal(
    tx: &mut Tx<'_>,
    directory: &dyn BotDirectory,
    code: WithdrawalCode,
) -> EngineResult<WithdrawalReceipt> {
    let redemption = withdrawals::redemption(tx.conn(), code)
        .await?
        .ok_or(EngineError::UnknownWithdrawalCode)?;

    slots::delete_slot(tx.conn(), redemption.user_id, redemption.slot_index).await?;
    withdrawals::delete_withdrawal(tx.conn(), code).await?;
    inventory::delete_item(tx.conn(), redemption.item.item_id).await?;
    audit::verify_conservation(tx.conn()).await?;

    let bot = redemption.item.bot_uuid;
    let listing = redemption.listing;
    let position = directory.position_of(&bot, &listing.server);

    let mut message = format!(
        "Withdrawal code `{}` confirmed!\n\
         The shulker of `{}` on `{}` will be dropped, and has been removed from slot `#{}` of your exchange account.\n\
         The item name will be `{}`.\n\n\
         UUID of the bot that has this item in its ender chest is `{}`.\n",
        code,
        listing.name,
        listing.server,
        redemption.slot_index,
        deposit_item_name(redemption.item.item_id),
        bot
    );
    match position {
        Some(at) => message.push_str(&format!(
            "This bot is at ({},{},{}) and will drop your item immediately.\n",
            at.x as i64, at.y as i64, at.z as i64
        )),
        None => message.push_str(
            "This bot is not currently online. It will drop the item as soon as it reconnects.\n",
        ),
    }
    tx.notify(redemption.user_id, message);

    info!(
        user_id = redemption.user_id,
        slot_index = redemption.slot_index,
        item_id = %redemption.item.item_id,
        %bot,
        "Withdrawal redeemed"
    );
    Ok(WithdrawalReceipt {
        code: code.value(),
        user_id: redemption.user_id,
        slot_index: redemption.slot_index,
        listing_id: listing.id,
        item_name: listing.name,
        server: listing.server,
        bot_uuid: bot,
        item_id: redemption.item.item_id,
        position,
    })
}

/// Release the oldest expired withdrawal, if any.
///
/// The slot is unlocked; physical custody is untouched.
pub async fn expire_next_withdrawal(
    tx: &mut Tx<'_>,
    now: UnixSeconds,
) -> EngineResult<Option<WithdrawalCode>> {
    let Some(withdrawal) = withdrawals::next_expired(tx.conn(), now).await? else {
        return Ok(None);
    };

    // unlock before the pending row goes, the slot still references it
    if let Some(slot) = slots::slot_for_withdrawal(tx.conn(), withdrawal.code).await? {
        let released = slot.state.release_withdrawal()?;
        slots::write_state(tx.conn(), slot.user_id, slot.index, &released).await?;
        tx.notify(
            slot.user_id,
            format!("Withdrawal from slot #{} expired; the slot is unlocked again.", slot.index),
        );
    }
    withdrawals::delete_withdrawal(tx.conn(), withdrawal.code).await?;

    debug!(code = %withdrawal.code, "Withdrawal expired");
    Ok(Some(withdrawal.code))
}
