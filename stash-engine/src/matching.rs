//! Order matching and settlement.
//!
//! Price/time priority with the resting order setting the price: an incoming
//! sell executes at the best bid's price, an incoming buy at each ask's price.
//! All functions run inside a caller's transaction; any error aborts it.

use crate::error::{EngineError, EngineResult};
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use stash_domain::{
    CompletedTrade, ListingId, Price, Quantity, SlotIndex, UnixSeconds, UserId,
};
use stash_store::{audit, listings, orders, slots, trades, users, CancelScope, NewSlot, Tx};
use tracing::{debug, info};

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to a sell order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SellOutcome {
    /// No bid matched; the slot is now listed
    Listed { price: i64 },
    /// Sold immediately to a resting bid, at that bid's price
    Sold { buyer_id: UserId, price: i64 },
}

/// What happened to a buy order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOutcome {
    /// Units bought immediately
    pub filled: i64,
    /// Units left resting in the book
    pub resting: i64,
    /// Units dropped because the buyer ran out of slots
    pub discarded: i64,
    /// Amount paid for the filled units
    pub spent: i64,
}

/// One unit changing hands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub seller_id: UserId,
    pub seller_slot: SlotIndex,
    pub buyer_id: UserId,
    pub listing_id: ListingId,
    pub price: i64,
}

// =============================================================================
// Sell side
// =============================================================================

/// List a slot at `price`, or sell it at once to the best bid at or above it.
///
/// # Errors
/// Wrong owner, withdrawal lock, force lock at a nonzero price, or a best bid
/// owned by the seller.
pub async fn place_sell_order(
    tx: &mut Tx<'_>,
    policy: &Policy,
    user_id: UserId,
    index: SlotIndex,
    price: Price,
    now: UnixSeconds,
) -> EngineResult<SellOutcome> {
    let slot = slots::get_slot(tx.conn(), user_id, index)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::SlotNotFound { user_id, index }))?;
    let listed = slot.state.list(price, now)?;

    let Some(bid) = orders::best_bid(tx.conn(), slot.listing_id, price).await? else {
        slots::write_state(tx.conn(), user_id, index, &listed).await?;
        debug!(user_id, index, price = price.amount(), "Slot listed");
        return Ok(SellOutcome::Listed { price: price.amount() });
    };

    if bid.user_id == user_id {
        return Err(EngineError::SelfTrade);
    }

    orders::take_one(tx.conn(), &bid).await?;
    settle(
        tx,
        policy,
        Settlement {
            seller_id: user_id,
            seller_slot: index,
            buyer_id: bid.user_id,
            listing_id: slot.listing_id,
            price: bid.price.amount(),
        },
        now,
    )
    .await?;

    Ok(SellOutcome::Sold {
        buyer_id: bid.user_id,
        price: bid.price.amount(),
    })
}

/// Take a slot off the market. Nothing was escrowed, so no balance moves.
pub async fn cancel_sell_order(tx: &mut Tx<'_>, user_id: UserId, index: SlotIndex) -> EngineResult<()> {
    let slot = slots::get_slot(tx.conn(), user_id, index)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::SlotNotFound { user_id, index }))?;
    slots::write_state(tx.conn(), user_id, index, &slot.state.unlist()).await?;
    Ok(())
}

// =============================================================================
// Buy side
// =============================================================================

/// Buy up to `quantity` units at `price` or better; rest whatever is left.
///
/// Fills one unit at a time against the cheapest ask. If the buyer's last
/// free slot fills mid-way, every other open buy order of theirs is
/// cancelled and the unmatched remainder is discarded; they pay only for
/// what they got.
pub async fn place_buy_order(
    tx: &mut Tx<'_>,
    policy: &Policy,
    user_id: UserId,
    listing_id: ListingId,
    price: Price,
    quantity: Quantity,
    now: UnixSeconds,
) -> EngineResult<BuyOutcome> {
    let user = users::get_user(tx.conn(), user_id)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::UserNotFound(user_id)))?;
    listings::get_listing(tx.conn(), listing_id)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::ListingNotFound(listing_id)))?;

    let mut used = slots::count_slots(tx.conn(), user_id).await?;
    if used >= user.max_slots {
        return Err(EngineError::NoFreeSlots);
    }

    let cost = price.total(quantity)?;
    if cost > user.balance {
        return Err(EngineError::InsufficientBalance);
    }

    let mut remaining = quantity.count();
    let mut spent = 0;

    while remaining > 0 {
        let Some(ask) = slots::best_ask(tx.conn(), listing_id, price).await? else {
            break;
        };
        if ask.user_id == user_id {
            return Err(EngineError::SelfTrade);
        }

        spent += ask.price.amount();
        remaining -= 1;
        settle(
            tx,
            policy,
            Settlement {
                seller_id: ask.user_id,
                seller_slot: ask.slot_index,
                buyer_id: user_id,
                listing_id,
                price: ask.price.amount(),
            },
            now,
        )
        .await?;

        used += 1;
        if used >= user.max_slots {
            orders::cancel_bids(tx.conn(), user_id, CancelScope::All).await?;
            users::debit(tx.conn(), user_id, spent).await?;
            let filled = quantity.count() - remaining;
            info!(user_id, listing_id, filled, discarded = remaining, "Buy order filled last free slot");
            return Ok(BuyOutcome {
                filled,
                resting: 0,
                discarded: remaining,
                spent,
            });
        }
    }

    // remaining <= quantity, so this cannot exceed `cost`
    let escrow = price.amount() * remaining;
    users::debit(tx.conn(), user_id, spent + escrow).await?;
    if remaining > 0 {
        orders::rest_bid(tx.conn(), user_id, listing_id, price, remaining, now).await?;
        debug!(user_id, listing_id, price = price.amount(), remaining, "Buy order resting");
    }

    Ok(BuyOutcome {
        filled: quantity.count() - remaining,
        resting: remaining,
        discarded: 0,
        spent,
    })
}

/// Cancel a user's buy orders in `scope`; returns the refund
pub async fn cancel_buy_orders(tx: &mut Tx<'_>, user_id: UserId, scope: CancelScope) -> EngineResult<i64> {
    let refund = orders::cancel_bids(tx.conn(), user_id, scope).await?;
    debug!(user_id, refund, ?scope, "Buy orders cancelled");
    Ok(refund)
}

// =============================================================================
// Settlement
// =============================================================================

/// Move one unit from seller to buyer at `price`.
///
/// The buyer's escrow already covers the price, so only the seller's balance
/// moves. Conservation is re-checked before the trade is recorded.
pub async fn settle(
    tx: &mut Tx<'_>,
    policy: &Policy,
    settlement: Settlement,
    now: UnixSeconds,
) -> EngineResult<()> {
    let Settlement {
        seller_id,
        seller_slot,
        buyer_id,
        listing_id,
        price,
    } = settlement;

    users::credit(tx.conn(), seller_id, price).await?;
    slots::delete_slot(tx.conn(), seller_id, seller_slot).await?;
    let buyer_slot = grant_slot(tx, policy, buyer_id, listing_id, now).await?;
    audit::verify_conservation(tx.conn()).await?;
    trades::record_trade(
        tx.conn(),
        &CompletedTrade {
            buyer_id,
            seller_id,
            listing_id,
            price,
            timestamp: now,
        },
    )
    .await?;

    info!(seller_id, buyer_id, listing_id, price, buyer_slot, "Trade settled");
    tx.notify(seller_id, format!("You just sold an item! Balance increased by {}.", price));
    tx.notify(buyer_id, format!("You just bought an item! It is in slot #{}.", buyer_slot));
    Ok(())
}

/// Put one unit of `listing_id` into the user's lowest free slot.
///
/// When that fills the user's last slot, all their open buy orders are
/// cancelled and refunded since none of them could be delivered.
pub async fn grant_slot(
    tx: &mut Tx<'_>,
    policy: &Policy,
    user_id: UserId,
    listing_id: ListingId,
    now: UnixSeconds,
) -> EngineResult<SlotIndex> {
    let user = users::get_user(tx.conn(), user_id)
        .await
        .map_err(|e| EngineError::or_not_found(e, EngineError::UserNotFound(user_id)))?;
    let used = slots::used_indexes(tx.conn(), user_id).await?;
    let index = (0..user.max_slots)
        .find(|i| !used.contains(i))
        .ok_or(EngineError::NoFreeSlots)?;

    slots::insert_slot(
        tx.conn(),
        NewSlot {
            user_id,
            index,
            listing_id,
            expiry_time: now + policy.renewal_period_secs,
            renewals: policy.renewals,
        },
    )
    .await?;

    if used.len() as i64 + 1 >= user.max_slots {
        let refund = orders::cancel_bids(tx.conn(), user_id, CancelScope::All).await?;
        if refund > 0 {
            debug!(user_id, refund, "Last slot filled, open buy orders cancelled");
        }
    }
    Ok(index)
}
