//! Port for querying the live bot fleet.
//!
//! The engine only needs snapshots: which bots could drop an item right now,
//! and where a bot stands. Implementations must not block on network I/O
//! since they are called inside ledger transactions.

use serde::{Deserialize, Serialize};
use stash_domain::BotUuid;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Block coordinates of a bot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BotPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Read-only view of the connected bot fleet.
pub trait BotDirectory: Send + Sync {
    /// Bots connected to `server` with a fresh status, in the overworld
    fn withdrawal_capable(&self, server: &str) -> HashSet<BotUuid>;

    /// Position of `bot` if it is withdrawal-capable on `server`
    fn position_of(&self, bot: &BotUuid, server: &str) -> Option<BotPosition>;
}

/// Fixed directory for tests and offline tooling.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    bots: Mutex<HashMap<(BotUuid, String), BotPosition>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `bot` as live on `server` at `position`
    pub fn set_online(&self, bot: BotUuid, server: &str, position: BotPosition) {
        if let Ok(mut bots) = self.bots.lock() {
            bots.insert((bot, server.to_string()), position);
        }
    }

    /// Remove `bot` from every server
    pub fn set_offline(&self, bot: &BotUuid) {
        if let Ok(mut bots) = self.bots.lock() {
            bots.retain(|(uuid, _), _| uuid != bot);
        }
    }
}

impl BotDirectory for StaticDirectory {
    fn withdrawal_capable(&self, server: &str) -> HashSet<BotUuid> {
        self.bots
            .lock()
            .map(|bots| {
                bots.keys()
                    .filter(|(_, s)| s == server)
                    .map(|(uuid, _)| *uuid)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn position_of(&self, bot: &BotUuid, server: &str) -> Option<BotPosition> {
        self.bots
            .lock()
            .ok()
            .and_then(|bots| bots.get(&(*bot, server.to_string())).copied())
    }
}
