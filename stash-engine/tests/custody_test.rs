//! Integration tests for deposit and withdrawal reconciliation.

use stash_domain::{now_unix, DepositId, SlotState, StorageSlot};
use stash_engine::{
    BotDirectory, BotPosition, CustodyVerdict, EngineError, Exchange, Policy, StaticDirectory,
};
use stash_testkit::{
    bot_report, deposit, expire_deposit, expire_slot, expire_withdrawal, item, seed_item,
    seed_listing, seed_user, set_max_slots, setup_test_ledger, slots, test_bot, withdrawal,
    Result, TestLedger,
};
use std::sync::Arc;

const SERVER: &str = "2b2t.org";
const ALICE: i64 = 1;
const BOB: i64 = 2;

fn exchange_with(ledger: &TestLedger, directory: Arc<StaticDirectory>) -> Exchange {
    Exchange::new(ledger.executor.clone(), directory as Arc<dyn BotDirectory>, Policy::default())
}

fn storage(n: i64) -> StorageSlot {
    StorageSlot::new(n).unwrap()
}

fn spawn_point() -> BotPosition {
    BotPosition {
        x: 100.5,
        y: 64.0,
        z: -20.5,
    }
}

// =============================================================================
// Deposits
// =============================================================================

#[tokio::test]
async fn test_deposit_pickup_and_confirmation() -> Result<()> {
    let mut ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;

    let pending = exchange.create_deposit(ALICE, totems.id).await?;
    assert!(pending.expiry_time > now_unix());
    let raw = bot_report(pending.deposit_id, &totems);

    assert_eq!(exchange.bot_picked_up(SERVER, &raw).await, CustodyVerdict::Keep);
    // picking the same item up again is harmless
    assert_eq!(exchange.bot_picked_up(SERVER, &raw).await, CustodyVerdict::Keep);
    let picked = deposit(&ledger.executor, pending.deposit_id).await?.unwrap();
    assert!(picked.picked_up_at.is_some());

    let verdict = exchange.bot_stored(test_bot(1), SERVER, storage(3), &raw).await;
    assert_eq!(verdict, CustodyVerdict::Keep);

    assert!(deposit(&ledger.executor, pending.deposit_id).await?.is_none());
    let held = item(&ledger.executor, pending.deposit_id).await?.unwrap();
    assert_eq!(held.bot_uuid, test_bot(1));
    assert_eq!(held.slot, storage(3));
    let owned = slots(&ledger.executor, ALICE).await?;
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].listing_id, totems.id);

    // one pickup message and one confirmation
    let messages = ledger.drain_notifications();
    assert_eq!(messages.len(), 2);
    assert!(messages.iter().all(|n| n.user_id == ALICE));
    Ok(())
}

#[tokio::test]
async fn test_repeated_confirmation_is_idempotent() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;

    let pending = exchange.create_deposit(ALICE, totems.id).await?;
    let raw = bot_report(pending.deposit_id, &totems);
    exchange.bot_picked_up(SERVER, &raw).await;

    let first = exchange.bot_stored(test_bot(1), SERVER, storage(0), &raw).await;
    let second = exchange.bot_stored(test_bot(1), SERVER, storage(0), &raw).await;
    assert_eq!(first, CustodyVerdict::Keep);
    assert_eq!(second, CustodyVerdict::Keep);
    assert_eq!(slots(&ledger.executor, ALICE).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_pickup_rejections() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    let gapples = seed_listing(&ledger.executor, SERVER, "item.appleGold;1").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let pending = exchange.create_deposit(ALICE, totems.id).await?;

    // never issued
    let unknown = bot_report(DepositId::new(0x1234_5678)?, &totems);
    assert_eq!(exchange.bot_picked_up(SERVER, &unknown).await, CustodyVerdict::Drop);

    // right id, wrong contents
    let swapped = bot_report(pending.deposit_id, &gapples);
    assert_eq!(exchange.bot_picked_up(SERVER, &swapped).await, CustodyVerdict::Drop);

    // right item, other server
    let raw = bot_report(pending.deposit_id, &totems);
    assert_eq!(exchange.bot_picked_up("constantiam.net", &raw).await, CustodyVerdict::Drop);

    // not a deposit container at all
    assert_eq!(exchange.bot_picked_up(SERVER, "Diamond Sword$item.swordDiamond;0").await, CustodyVerdict::Drop);

    // expired
    expire_deposit(&ledger.executor, pending.deposit_id, now_unix() - 1).await?;
    assert_eq!(exchange.bot_picked_up(SERVER, &raw).await, CustodyVerdict::Drop);
    Ok(())
}

#[tokio::test]
async fn test_storage_mismatch_drops_item() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (_, item_id) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 4).await?;
    let raw = bot_report(item_id, &totems);

    assert_eq!(exchange.bot_stored(test_bot(1), SERVER, storage(4), &raw).await, CustodyVerdict::Keep);
    assert_eq!(exchange.bot_stored(test_bot(1), SERVER, storage(5), &raw).await, CustodyVerdict::Drop);
    assert_eq!(exchange.bot_stored(test_bot(2), SERVER, storage(4), &raw).await, CustodyVerdict::Drop);

    let stray = bot_report(DepositId::new(0x00ab_cdef)?, &totems);
    assert_eq!(exchange.bot_stored(test_bot(1), SERVER, storage(6), &stray).await, CustodyVerdict::Drop);

    // inventory still records the original placement
    let held = item(&ledger.executor, item_id).await?.unwrap();
    assert_eq!((held.bot_uuid, held.slot), (test_bot(1), storage(4)));
    Ok(())
}

#[tokio::test]
async fn test_storage_fault_keeps_item_but_refuses_pickup() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let pending = exchange.create_deposit(ALICE, totems.id).await?;
    let raw = bot_report(pending.deposit_id, &totems);
    let stray = bot_report(DepositId::new(0x00ab_cdef)?, &totems);

    ledger.executor.shutdown().await;

    // storage cannot answer: whatever sits in remote storage stays there
    assert_eq!(exchange.bot_stored(test_bot(1), SERVER, storage(3), &raw).await, CustodyVerdict::Keep);
    assert_eq!(exchange.bot_stored(test_bot(1), SERVER, storage(4), &stray).await, CustodyVerdict::Keep);
    // while nothing new is taken into custody
    assert_eq!(exchange.bot_picked_up(SERVER, &raw).await, CustodyVerdict::Drop);
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_storage_contents_are_kept() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;

    let verdict = exchange.bot_stored(test_bot(1), SERVER, storage(0), "empty").await;
    assert_eq!(verdict, CustodyVerdict::Keep);
    let verdict = exchange
        .bot_stored(test_bot(1), SERVER, storage(1), "Obsidian$tile.obsidian;0;64;")
        .await;
    assert_eq!(verdict, CustodyVerdict::Keep);
    Ok(())
}

#[tokio::test]
async fn test_deposit_without_free_slot_is_closed() -> Result<()> {
    let mut ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;

    let pending = exchange.create_deposit(ALICE, totems.id).await?;
    let raw = bot_report(pending.deposit_id, &totems);
    exchange.bot_picked_up(SERVER, &raw).await;
    set_max_slots(&ledger.executor, ALICE, 0).await?;
    ledger.drain_notifications();

    let verdict = exchange.bot_stored(test_bot(1), SERVER, storage(2), &raw).await;
    assert_eq!(verdict, CustodyVerdict::Drop);

    // the doomed deposit is gone and nothing was credited
    assert!(deposit(&ledger.executor, pending.deposit_id).await?.is_none());
    assert!(item(&ledger.executor, pending.deposit_id).await?.is_none());
    assert!(slots(&ledger.executor, ALICE).await?.is_empty());

    let messages = ledger.drain_notifications();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].message.contains("slots are full"));

    // a second sighting is now simply unknown
    let verdict = exchange.bot_stored(test_bot(1), SERVER, storage(2), &raw).await;
    assert_eq!(verdict, CustodyVerdict::Drop);
    Ok(())
}

#[tokio::test]
async fn test_deposit_sweep() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let now = now_unix();

    let untouched = exchange.create_deposit(ALICE, totems.id).await?;
    let in_transit = exchange.create_deposit(ALICE, totems.id).await?;
    exchange.bot_picked_up(SERVER, &bot_report(in_transit.deposit_id, &totems)).await;
    expire_deposit(&ledger.executor, untouched.deposit_id, now - 1).await?;
    expire_deposit(&ledger.executor, in_transit.deposit_id, now - 1).await?;

    assert_eq!(exchange.sweep_deposits(now).await?, 1);
    assert!(deposit(&ledger.executor, untouched.deposit_id).await?.is_none());
    // picked up recently: kept until it has been stuck for a day
    assert!(deposit(&ledger.executor, in_transit.deposit_id).await?.is_some());

    let stuck_after = Policy::default().stuck_deposit_secs;
    assert_eq!(exchange.sweep_deposits(now + stuck_after + 10).await?, 1);
    assert!(deposit(&ledger.executor, in_transit.deposit_id).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn test_create_deposit_unknown_listing() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let exchange = exchange_with(&ledger, Arc::new(StaticDirectory::new()));
    seed_user(&ledger.executor, ALICE, 0).await?;

    let err = exchange.create_deposit(ALICE, 99).await.unwrap_err();
    assert!(matches!(err, EngineError::ListingNotFound(99)));
    let err = exchange.create_deposit(BOB, 99).await.unwrap_err();
    assert!(matches!(err, EngineError::UserNotFound(BOB)));
    Ok(())
}

// =============================================================================
// Withdrawals
// =============================================================================

#[tokio::test]
async fn test_withdrawal_without_live_bot_changes_nothing() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (slot, _) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 0).await?;

    let err = exchange.create_withdrawal(ALICE, slot).await.unwrap_err();
    assert!(matches!(err, EngineError::NoBotAvailable));
    assert!(err.to_string().contains("none of the bots"));

    // a live bot that holds nothing of this listing does not help
    directory.set_online(test_bot(2), SERVER, spawn_point());
    // nor does the right bot on another server
    directory.set_online(test_bot(1), "constantiam.net", spawn_point());
    let err = exchange.create_withdrawal(ALICE, slot).await.unwrap_err();
    assert!(matches!(err, EngineError::NoBotAvailable));

    assert_eq!(slots(&ledger.executor, ALICE).await?[0].state, SlotState::Held);
    Ok(())
}

#[tokio::test]
async fn test_withdrawal_redeemed() -> Result<()> {
    let mut ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (slot, item_id) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 7).await?;
    directory.set_online(test_bot(1), SERVER, spawn_point());

    let pending = exchange.create_withdrawal(ALICE, slot).await?;
    assert_eq!(pending.item_id, item_id);
    assert_eq!(
        slots(&ledger.executor, ALICE).await?[0].state,
        SlotState::WithdrawalLocked { code: pending.code }
    );

    // locked slots cannot be listed or withdrawn twice
    let err = exchange.place_sell_order(ALICE, slot, 5).await.unwrap_err();
    assert!(matches!(err, EngineError::Domain(_)));
    let err = exchange.create_withdrawal(ALICE, slot).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable(_)));

    let receipt = exchange.redeem_withdrawal(pending.code).await?;
    assert_eq!(receipt.user_id, ALICE);
    assert_eq!(receipt.bot_uuid, test_bot(1));
    assert_eq!(receipt.item_id, item_id);
    assert_eq!(receipt.position, Some(spawn_point()));

    assert!(slots(&ledger.executor, ALICE).await?.is_empty());
    assert!(item(&ledger.executor, item_id).await?.is_none());
    assert!(withdrawal(&ledger.executor, pending.code).await?.is_none());

    let messages = ledger.drain_notifications();
    let last = messages.last().unwrap();
    assert_eq!(last.user_id, ALICE);
    assert!(last.message.contains("(100,64,-20)"));

    let err = exchange.redeem_withdrawal(pending.code).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownWithdrawalCode));
    Ok(())
}

#[tokio::test]
async fn test_redeem_with_bot_offline_defers_drop() -> Result<()> {
    let mut ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (slot, _) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 0).await?;
    directory.set_online(test_bot(1), SERVER, spawn_point());

    let pending = exchange.create_withdrawal(ALICE, slot).await?;
    directory.set_offline(&test_bot(1));

    let receipt = exchange.redeem_withdrawal(pending.code).await?;
    assert_eq!(receipt.position, None);
    let messages = ledger.drain_notifications();
    assert!(messages.last().unwrap().message.contains("not currently online"));
    Ok(())
}

#[tokio::test]
async fn test_concurrent_withdrawals_claim_distinct_items() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (first, _) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 0).await?;
    let (second, _) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 1).await?;
    directory.set_online(test_bot(1), SERVER, spawn_point());

    let (a, b) = tokio::join!(
        exchange.create_withdrawal(ALICE, first),
        exchange.create_withdrawal(ALICE, second)
    );
    let (a, b) = (a?, b?);
    assert_ne!(a.item_id, b.item_id);
    assert_ne!(a.code, b.code);
    Ok(())
}

#[tokio::test]
async fn test_expired_slot_cannot_be_withdrawn() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (slot, _) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 0).await?;
    directory.set_online(test_bot(1), SERVER, spawn_point());
    expire_slot(&ledger.executor, ALICE, slot, now_unix() - 1).await?;

    let err = exchange.create_withdrawal(ALICE, slot).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable(_)));

    let err = exchange.create_withdrawal(BOB, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::SlotNotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_expired_withdrawal_unlocks_slot() -> Result<()> {
    let ledger = setup_test_ledger().await?;
    let directory = Arc::new(StaticDirectory::new());
    let exchange = exchange_with(&ledger, directory.clone());
    let totems = seed_listing(&ledger.executor, SERVER, "item.totem;0").await?;
    seed_user(&ledger.executor, ALICE, 0).await?;
    let (slot, item_id) = seed_item(&ledger.executor, ALICE, totems.id, test_bot(1), 0).await?;
    directory.set_online(test_bot(1), SERVER, spawn_point());

    let pending = exchange.create_withdrawal(ALICE, slot).await?;
    let now = now_unix();
    assert_eq!(exchange.sweep_withdrawals(now).await?, 0);

    expire_withdrawal(&ledger.executor, pending.code, now - 1).await?;
    assert_eq!(exchange.sweep_withdrawals(now).await?, 1);

    assert_eq!(slots(&ledger.executor, ALICE).await?[0].state, SlotState::Held);
    assert!(withdrawal(&ledger.executor, pending.code).await?.is_none());
    // custody is untouched
    assert!(item(&ledger.executor, item_id).await?.is_some());
    let err = exchange.redeem_withdrawal(pending.code).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownWithdrawalCode));

    // and the slot can be withdrawn again
    exchange.create_withdrawal(ALICE, slot).await?;
    Ok(())
}
