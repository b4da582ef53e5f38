//! Glue between the bot fleet and the ledger.
//!
//! Turns what bots observe into custody decisions and those decisions into
//! bot commands:
//!
//! ```text
//! status snapshot     → first item in inventory → pickup check → store / goto / throw
//! storage slot report → custody check           → keep / delayed throw
//! redeemed withdrawal → holding bot walks to its storage (the next report drops the item)
//! ```

use async_trait::async_trait;
use stash_connectors::{inventory_window_slot, BotEventHandler, BotFleet, BotStatus, Outbound, SessionId};
use stash_domain::naming::EMPTY_ITEM;
use stash_domain::{BotUuid, StorageSlot, WithdrawalCode};
use stash_engine::{BotDirectory, BotPosition, CustodyVerdict, EngineResult, Exchange, WithdrawalReceipt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before throwing a rejected item out of remote storage
pub const DROP_DELAY: Duration = Duration::from_millis(125);

/// [`BotDirectory`] backed by the live fleet registry.
pub struct FleetDirectory(pub Arc<BotFleet>);

impl BotDirectory for FleetDirectory {
    fn withdrawal_capable(&self, server: &str) -> HashSet<BotUuid> {
        self.0.withdrawal_capable(server)
    }

    fn position_of(&self, bot: &BotUuid, server: &str) -> Option<BotPosition> {
        self.0.position_of(bot, server).map(|(x, y, z)| BotPosition { x, y, z })
    }
}

/// Reacts to bot observations on behalf of the exchange.
pub struct Reconciler {
    exchange: Exchange,
    fleet: Arc<BotFleet>,
    drop_delay: Duration,
}

impl Reconciler {
    pub fn new(exchange: Exchange, fleet: Arc<BotFleet>) -> Self {
        Self {
            exchange,
            fleet,
            drop_delay: DROP_DELAY,
        }
    }

    /// Override [`DROP_DELAY`]
    pub fn with_drop_delay(mut self, delay: Duration) -> Self {
        self.drop_delay = delay;
        self
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Redeem a withdrawal code and send the holding bot to its storage.
    pub async fn redeem(&self, code: WithdrawalCode) -> EngineResult<WithdrawalReceipt> {
        let receipt = self.exchange.redeem_withdrawal(code).await?;
        info!(
            code = receipt.code,
            user_id = receipt.user_id,
            bot = %receipt.bot_uuid,
            item = %receipt.item_id,
            "Withdrawal redeemed"
        );

        match self.fleet.find(&receipt.bot_uuid, &receipt.server) {
            Some(session) => self.send(session, Outbound::goto_storage()),
            None => debug!(bot = %receipt.bot_uuid, "Holding bot offline, drop deferred"),
        }
        Ok(receipt)
    }

    fn send(&self, session: SessionId, command: Outbound) {
        if let Err(e) = self.fleet.send(session, command) {
            debug!(session, error = %e, "Bot command not delivered");
        }
    }

    fn schedule_drop(&self, session: SessionId, slot: i32) {
        let fleet = self.fleet.clone();
        let delay = self.drop_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // the storage window may have closed in the meantime
            match fleet.status(session) {
                Some(status) if status.storage_open => {
                    if let Err(e) = fleet.send(session, Outbound::throw(status.window_id, slot)) {
                        debug!(session, error = %e, "Drop not delivered");
                    }
                },
                _ => debug!(session, slot, "Storage closed before drop"),
            }
        });
    }
}

#[async_trait]
impl BotEventHandler for Reconciler {
    async fn on_status(&self, session: SessionId, status: &BotStatus) {
        let Some((index, item)) = status
            .main_inventory
            .iter()
            .enumerate()
            .find(|(_, item)| item.as_str() != EMPTY_ITEM)
        else {
            return;
        };

        let command = match self.exchange.bot_picked_up(&status.server, item).await {
            CustodyVerdict::Keep if status.storage_open => {
                Outbound::quick_move(status.window_id, inventory_window_slot(index, true))
            },
            CustodyVerdict::Keep => Outbound::goto_storage(),
            CustodyVerdict::Drop => {
                debug!(session, index, item = %item, "Throwing unaccounted item");
                Outbound::throw(status.window_id, inventory_window_slot(index, status.storage_open))
            },
        };
        self.send(session, command);
    }

    async fn on_storage_slot(&self, session: SessionId, slot: i32, item: String) {
        let Some(status) = self.fleet.status(session) else {
            debug!(session, "Storage report before any status, ignoring");
            return;
        };
        let bot: BotUuid = match status.bot_uuid.parse() {
            Ok(bot) => bot,
            Err(e) => {
                warn!(session, error = %e, "Bot reported an invalid uuid");
                return;
            },
        };
        // slots past the storage window belong to the player inventory
        let Ok(storage_slot) = StorageSlot::new(i64::from(slot)) else {
            return;
        };

        if self.exchange.bot_stored(bot, &status.server, storage_slot, &item).await == CustodyVerdict::Drop {
            self.schedule_drop(session, slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stash_domain::DepositId;
    use stash_engine::Policy;
    use stash_testkit::{bot_report, seed_listing, setup_test_ledger, TestLedger};
    use tokio::sync::mpsc;

    fn status(bot: &str, inventory: &[(usize, &str)], storage_open: bool) -> BotStatus {
        let mut main_inventory = vec![EMPTY_ITEM.to_string(); 36];
        for (index, item) in inventory {
            main_inventory[*index] = item.to_string();
        }
        BotStatus {
            bot_uuid: bot.to_string(),
            server: "2b2t.org".to_string(),
            x: 0.0,
            y: 64.0,
            z: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            on_ground: true,
            health: 20.0,
            saturation: 5.0,
            food_level: 20,
            dimension: 0,
            path_start_x: 0,
            path_start_y: 64,
            path_start_z: 0,
            has_current_segment: false,
            has_next_segment: false,
            calc_in_progress: false,
            ticks_remaining_in_current: 0.0,
            calc_failed_last_tick: false,
            safe_to_cancel: true,
            current_goal: "null".to_string(),
            current_process: "null".to_string(),
            main_inventory,
            armor: vec![EMPTY_ITEM.to_string(); 4],
            off_hand: EMPTY_ITEM.to_string(),
            window_id: if storage_open { 3 } else { 0 },
            storage_open,
        }
    }

    fn reconciler(ledger: &TestLedger) -> (Reconciler, Arc<BotFleet>) {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let directory = Arc::new(FleetDirectory(fleet.clone()));
        let exchange = Exchange::new(ledger.executor.clone(), directory, Policy::default());
        let reconciler = Reconciler::new(exchange, fleet.clone()).with_drop_delay(Duration::ZERO);
        (reconciler, fleet)
    }

    const BOT: &str = "00000000-0000-4000-8000-000000000001";

    #[tokio::test]
    async fn test_unknown_item_is_thrown() {
        let ledger = setup_test_ledger().await.unwrap();
        let (reconciler, fleet) = reconciler(&ledger);
        let (sender, mut commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);

        // cobblestone in hotbar slot 2, storage closed
        let status = status(BOT, &[(2, "Cobblestone$tile.stonebrick;64")], false);
        fleet.record_status(session, status.clone());
        reconciler.on_status(session, &status).await;

        assert_eq!(commands.try_recv().unwrap(), Outbound::throw(0, 38));
    }

    #[tokio::test]
    async fn test_empty_inventory_sends_nothing() {
        let ledger = setup_test_ledger().await.unwrap();
        let (reconciler, fleet) = reconciler(&ledger);
        let (sender, mut commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);

        let status = status(BOT, &[], true);
        reconciler.on_status(session, &status).await;
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_storage_report_without_status_is_ignored() {
        let ledger = setup_test_ledger().await.unwrap();
        let (reconciler, fleet) = reconciler(&ledger);
        let (sender, mut commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);

        reconciler.on_storage_slot(session, 4, "stash#00000001$junk".to_string()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unaccounted_storage_item_is_thrown() {
        let ledger = setup_test_ledger().await.unwrap();
        let totems = seed_listing(&ledger.executor, "2b2t.org", "item.totem;0").await.unwrap();
        let (reconciler, fleet) = reconciler(&ledger);
        let (sender, mut commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        fleet.record_status(session, status(BOT, &[], true));

        let stray = bot_report(DepositId::new(0x00ab_cdef).unwrap(), &totems);
        reconciler.on_storage_slot(session, 4, stray).await;

        let command = tokio::time::timeout(Duration::from_secs(5), commands.recv()).await.unwrap();
        assert_eq!(command, Some(Outbound::throw(3, 4)));
    }

    #[tokio::test]
    async fn test_no_drop_once_storage_closed() {
        let ledger = setup_test_ledger().await.unwrap();
        let totems = seed_listing(&ledger.executor, "2b2t.org", "item.totem;0").await.unwrap();
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let exchange = Exchange::new(
            ledger.executor.clone(),
            Arc::new(FleetDirectory(fleet.clone())),
            Policy::default(),
        );
        let reconciler = Reconciler::new(exchange, fleet.clone()).with_drop_delay(Duration::from_millis(50));
        let (sender, mut commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        fleet.record_status(session, status(BOT, &[], true));

        let stray = bot_report(DepositId::new(0x00ab_cdef).unwrap(), &totems);
        reconciler.on_storage_slot(session, 4, stray).await;
        // the bot walks away before the drop fires
        fleet.record_status(session, status(BOT, &[], false));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fleet_directory_maps_positions() {
        let fleet = Arc::new(BotFleet::new(Duration::from_secs(5)));
        let (sender, _commands) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        fleet.record_status(session, status(BOT, &[], false));

        let directory = FleetDirectory(fleet);
        let bot: BotUuid = BOT.parse().unwrap();
        assert!(directory.withdrawal_capable("2b2t.org").contains(&bot));
        assert_eq!(
            directory.position_of(&bot, "2b2t.org"),
            Some(BotPosition { x: 0.0, y: 64.0, z: 0.0 })
        );
    }
}
