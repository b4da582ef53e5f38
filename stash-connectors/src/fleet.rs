//! Registry of connected bots.
//!
//! Holds each session's latest status and its command queue behind one
//! mutex. Lookups return copies, so no lock is ever held across an await.

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{BotStatus, Outbound, OVERWORLD};
use serde::Serialize;
use stash_domain::BotUuid;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Identifies one connection for its lifetime
pub type SessionId = u64;

struct Session {
    latest: Option<(BotStatus, Instant)>,
    commands: mpsc::UnboundedSender<Outbound>,
}

/// Latest status of a bot and how old it is
#[derive(Debug, Clone, Serialize)]
pub struct BotSnapshot {
    pub session: SessionId,
    pub age_ms: u64,
    pub status: BotStatus,
}

/// All currently connected bots.
pub struct BotFleet {
    sessions: Mutex<HashMap<SessionId, Session>>,
    next_id: AtomicU64,
    liveness: Duration,
}

impl BotFleet {
    /// A bot counts as live if its last status is younger than `liveness`
    pub fn new(liveness: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            liveness,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Session>> {
        // a panic while holding the lock cannot leave the map half-updated
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new connection; commands for it arrive on `commands`
    pub fn register(&self, commands: mpsc::UnboundedSender<Outbound>) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(
            id,
            Session {
                latest: None,
                commands,
            },
        );
        id
    }

    pub fn unregister(&self, session: SessionId) {
        self.lock().remove(&session);
    }

    pub fn record_status(&self, session: SessionId, status: BotStatus) {
        if let Some(entry) = self.lock().get_mut(&session) {
            entry.latest = Some((status, Instant::now()));
        }
    }

    /// Latest status of one session
    pub fn status(&self, session: SessionId) -> Option<BotStatus> {
        self.lock()
            .get(&session)
            .and_then(|entry| entry.latest.as_ref())
            .map(|(status, _)| status.clone())
    }

    /// Latest status of every bot that has reported at least once
    pub fn statuses(&self) -> Vec<BotSnapshot> {
        let mut snapshots: Vec<_> = self
            .lock()
            .iter()
            .filter_map(|(id, entry)| {
                entry.latest.as_ref().map(|(status, at)| BotSnapshot {
                    session: *id,
                    age_ms: at.elapsed().as_millis() as u64,
                    status: status.clone(),
                })
            })
            .collect();
        snapshots.sort_by_key(|s| s.session);
        snapshots
    }

    /// Queue a command for a session
    pub fn send(&self, session: SessionId, command: Outbound) -> ProtocolResult<()> {
        let sessions = self.lock();
        let entry = sessions.get(&session).ok_or(ProtocolError::SessionClosed)?;
        entry.commands.send(command).map_err(|_| ProtocolError::SessionClosed)
    }

    /// Session of `bot` on `server`, if it has reported
    pub fn find(&self, bot: &BotUuid, server: &str) -> Option<SessionId> {
        let uuid = bot.to_string();
        self.lock().iter().find_map(|(id, entry)| {
            entry
                .latest
                .as_ref()
                .filter(|(status, _)| status.bot_uuid == uuid && status.server == server)
                .map(|_| *id)
        })
    }

    /// Bots on `server` with a fresh status, standing in the overworld
    pub fn withdrawal_capable(&self, server: &str) -> HashSet<BotUuid> {
        self.lock()
            .values()
            .filter_map(|entry| entry.latest.as_ref())
            .filter(|(status, at)| self.is_capable(status, *at, server))
            .filter_map(|(status, _)| status.bot_uuid.parse().ok())
            .collect()
    }

    /// Coordinates of `bot` if it is withdrawal-capable on `server`
    pub fn position_of(&self, bot: &BotUuid, server: &str) -> Option<(f64, f64, f64)> {
        let uuid = bot.to_string();
        self.lock()
            .values()
            .filter_map(|entry| entry.latest.as_ref())
            .find(|(status, at)| status.bot_uuid == uuid && self.is_capable(status, *at, server))
            .map(|(status, _)| (status.x, status.y, status.z))
    }

    fn is_capable(&self, status: &BotStatus, received: Instant, server: &str) -> bool {
        status.server == server && status.dimension == OVERWORLD && received.elapsed() < self.liveness
    }

    /// Number of open connections
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::tests::sample_status;

    fn fleet() -> BotFleet {
        BotFleet::new(Duration::from_secs(5))
    }

    #[test]
    fn test_register_and_report() {
        let fleet = fleet();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        assert_eq!(fleet.len(), 1);
        assert!(fleet.statuses().is_empty());

        fleet.record_status(session, sample_status());
        let snapshots = fleet.statuses();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].session, session);
        assert_eq!(fleet.status(session).unwrap().window_id, 7);

        fleet.unregister(session);
        assert!(fleet.is_empty());
        assert!(fleet.status(session).is_none());
    }

    #[test]
    fn test_withdrawal_capable_filters() {
        let fleet = fleet();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        let status = sample_status();
        let bot: BotUuid = status.bot_uuid.parse().unwrap();

        fleet.record_status(session, status.clone());
        assert!(fleet.withdrawal_capable("2b2t.org").contains(&bot));
        assert!(fleet.withdrawal_capable("constantiam.net").is_empty());
        assert_eq!(fleet.position_of(&bot, "2b2t.org"), Some((12.5, 70.0, -3.25)));
        assert_eq!(fleet.find(&bot, "2b2t.org"), Some(session));

        // in the nether
        fleet.record_status(session, BotStatus { dimension: -1, ..status });
        assert!(fleet.withdrawal_capable("2b2t.org").is_empty());
        assert!(fleet.position_of(&bot, "2b2t.org").is_none());
    }

    #[test]
    fn test_stale_status_is_not_live() {
        let fleet = BotFleet::new(Duration::ZERO);
        let (sender, _receiver) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        fleet.record_status(session, sample_status());
        assert!(fleet.withdrawal_capable("2b2t.org").is_empty());
    }

    #[test]
    fn test_send_reaches_session() {
        let fleet = fleet();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let session = fleet.register(sender);

        fleet.send(session, Outbound::goto_storage()).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), Outbound::goto_storage());

        fleet.unregister(session);
        assert!(matches!(
            fleet.send(session, Outbound::goto_storage()),
            Err(ProtocolError::SessionClosed)
        ));
    }

    #[test]
    fn test_snapshot_serializes_status() {
        let fleet = fleet();
        let (sender, _receiver) = mpsc::unbounded_channel();
        let session = fleet.register(sender);
        fleet.record_status(session, sample_status());

        let json = serde_json::to_value(fleet.statuses()).unwrap();
        assert_eq!(json[0]["session"], session);
        assert_eq!(json[0]["status"]["server"], "2b2t.org");
        assert_eq!(json[0]["status"]["window_id"], 7);
    }
}
