//! Slot expiry: auto-renewal, force-lock and force-sale passes.
//!
//! Each pass is meant to run in its own transaction. The lock and sale passes
//! handle a single slot per call so callers can loop one transaction at a time.

use crate::error::EngineResult;
use crate::matching::{self, SellOutcome};
use crate::policy::Policy;
use stash_domain::{Price, SlotIndex, UnixSeconds, UserId};
use stash_store::{listings, orders, slots, CancelScope, Tx};
use tracing::{debug, info};

/// Extend every expired listed slot that still has renewals left
pub async fn auto_renew(tx: &mut Tx<'_>, policy: &Policy, now: UnixSeconds) -> EngineResult<u64> {
    let renewed = slots::renew_expired_listed(tx.conn(), now, policy.renewal_period_secs).await?;
    if renewed > 0 {
        debug!(renewed, "Slots auto-renewed");
    }
    Ok(renewed)
}

/// Force-lock the oldest expired unlocked slot, if any.
///
/// Its listing is cleared and it gets a random grace period before the sale.
pub async fn force_lock_next(
    tx: &mut Tx<'_>,
    policy: &Policy,
    now: UnixSeconds,
) -> EngineResult<Option<(UserId, SlotIndex)>> {
    let Some(slot) = slots::next_to_force_lock(tx.conn(), now).await? else {
        return Ok(None);
    };

    let locked = slot.state.force_lock()?;
    let delay = policy.force_sell_delay();
    slots::write_state(tx.conn(), slot.user_id, slot.index, &locked).await?;
    slots::set_expiry(tx.conn(), slot.user_id, slot.index, now + delay).await?;

    let listing = listings::get_listing(tx.conn(), slot.listing_id).await?;
    info!(
        user_id = slot.user_id,
        index = slot.index,
        listing_id = slot.listing_id,
        delay,
        "Slot expired, locked for force sale"
    );
    tx.notify(
        slot.user_id,
        format!(
            "Slot #{} ({}) has expired and will be force sold for free in the next 5 to 10 minutes. \
             It goes to the highest open buy order.",
            slot.index, listing.name
        ),
    );
    Ok(Some((slot.user_id, slot.index)))
}

/// Force-sell the oldest force-locked slot whose grace period is over.
///
/// The owner's own bids in that listing are cancelled first so the free
/// listing cannot match against them.
pub async fn force_sell_next(
    tx: &mut Tx<'_>,
    policy: &Policy,
    now: UnixSeconds,
) -> EngineResult<Option<SellOutcome>> {
    let Some(slot) = slots::next_to_force_sell(tx.conn(), now).await? else {
        return Ok(None);
    };

    orders::cancel_bids(tx.conn(), slot.user_id, CancelScope::Listing(slot.listing_id)).await?;
    let outcome =
        matching::place_sell_order(tx, policy, slot.user_id, slot.index, Price::zero(), now).await?;

    info!(user_id = slot.user_id, index = slot.index, ?outcome, "Slot force sold");
    let message = match outcome {
        SellOutcome::Sold { .. } => format!("Slot #{} was force sold.", slot.index),
        SellOutcome::Listed { .. } => {
            format!("Slot #{} is now listed for free until someone takes it.", slot.index)
        },
    };
    tx.notify(slot.user_id, message);
    Ok(Some(outcome))
}
