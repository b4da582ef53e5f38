//! Domain Entities for the stash exchange
//!
//! Ledger entities with lifecycle management. Slot lifecycles are explicit
//! enums here; the persisted column combination is a serialization detail
//! produced and validated by [`SlotState::to_columns`] / [`SlotState::from_columns`].

use crate::value_objects::{
    BotUuid, DepositId, DomainError, ListingId, Price, SlotIndex, StorageSlot, UnixSeconds,
    UserId, WithdrawalCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current unix time in seconds
pub fn now_unix() -> UnixSeconds {
    Utc::now().timestamp()
}

// =============================================================================
// User
// =============================================================================

/// Account holder. `balance` is the single ledger currency and never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub balance: i64,
    pub max_slots: i64,
}

// =============================================================================
// Listing
// =============================================================================

/// A tradeable item class, unique per (server, item_key)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub server: String,
    pub item_key: String,
    pub name: String,
    pub photo: String,
}

/// A listing that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewListing {
    pub server: String,
    pub item_key: String,
    pub name: String,
    pub photo: String,
}

// =============================================================================
// Slot
// =============================================================================

/// Persisted lock column values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i64)]
pub enum LockState {
    Open = 0,
    ForceSaleLocked = 1,
    WithdrawalLocked = 2,
}

impl LockState {
    /// Decode the persisted lock column
    pub fn from_column(value: i64) -> Result<Self, DomainError> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::ForceSaleLocked),
            2 => Ok(Self::WithdrawalLocked),
            other => Err(DomainError::InvalidSlotState(format!("unknown lock state {}", other))),
        }
    }

    /// Value as persisted
    pub fn as_column(self) -> i64 {
        self as i64
    }
}

/// Lifecycle of a slot.
///
/// ```text
/// Held <-> ForSale
///   |         |
///   +--> ForceSaleLocked (listed at 0 or not at all) --> sold away
///   |
///   +--> WithdrawalLocked --> withdrawn (deleted) | expired --> Held
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Owned, not listed, not locked
    Held,
    /// Listed for sale; price may be zero
    ForSale { price: Price, since: UnixSeconds },
    /// Expired without renewals; only a free listing is allowed
    ForceSaleLocked { listed_since: Option<UnixSeconds> },
    /// A withdrawal is in progress
    WithdrawalLocked { code: WithdrawalCode },
}

/// The four persisted columns describing a [`SlotState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotColumns {
    pub locked: i64,
    pub sale_price: Option<i64>,
    pub for_sale_since: Option<i64>,
    pub withdrawal_code: Option<i64>,
}

impl SlotState {
    /// Rebuild the state from persisted columns, rejecting invalid combinations
    pub fn from_columns(columns: SlotColumns) -> Result<Self, DomainError> {
        let lock = LockState::from_column(columns.locked)?;
        match (lock, columns.sale_price, columns.for_sale_since, columns.withdrawal_code) {
            (LockState::Open, None, None, None) => Ok(Self::Held),
            (LockState::Open, Some(price), Some(since), None) => Ok(Self::ForSale {
                price: Price::ask(price)?,
                since,
            }),
            (LockState::ForceSaleLocked, None, None, None) => {
                Ok(Self::ForceSaleLocked { listed_since: None })
            },
            (LockState::ForceSaleLocked, Some(0), Some(since), None) => {
                Ok(Self::ForceSaleLocked { listed_since: Some(since) })
            },
            (LockState::WithdrawalLocked, None, None, Some(code)) => {
                Ok(Self::WithdrawalLocked { code: WithdrawalCode::new(code) })
            },
            _ => Err(DomainError::InvalidSlotState(format!("{:?}", columns))),
        }
    }

    /// Serialize to the persisted columns
    pub fn to_columns(&self) -> SlotColumns {
        match *self {
            Self::Held => SlotColumns {
                locked: LockState::Open.as_column(),
                sale_price: None,
                for_sale_since: None,
                withdrawal_code: None,
            },
            Self::ForSale { price, since } => SlotColumns {
                locked: LockState::Open.as_column(),
                sale_price: Some(price.amount()),
                for_sale_since: Some(since),
                withdrawal_code: None,
            },
            Self::ForceSaleLocked { listed_since } => SlotColumns {
                locked: LockState::ForceSaleLocked.as_column(),
                sale_price: listed_since.map(|_| 0),
                for_sale_since: listed_since,
                withdrawal_code: None,
            },
            Self::WithdrawalLocked { code } => SlotColumns {
                locked: LockState::WithdrawalLocked.as_column(),
                sale_price: None,
                for_sale_since: None,
                withdrawal_code: Some(code.value()),
            },
        }
    }

    /// Lock column value
    pub fn lock_state(&self) -> LockState {
        match self {
            Self::Held | Self::ForSale { .. } => LockState::Open,
            Self::ForceSaleLocked { .. } => LockState::ForceSaleLocked,
            Self::WithdrawalLocked { .. } => LockState::WithdrawalLocked,
        }
    }

    /// Current ask, if listed
    pub fn sale_price(&self) -> Option<Price> {
        match self {
            Self::ForSale { price, .. } => Some(*price),
            Self::ForceSaleLocked { listed_since: Some(_) } => Some(Price::zero()),
            _ => None,
        }
    }

    /// Check that a sell order at `price` may be placed against this slot
    pub fn ensure_listable(&self, price: Price) -> Result<(), DomainError> {
        match self {
            Self::WithdrawalLocked { .. } => Err(DomainError::InvalidStateTransition(
                "Cannot put something up for sale that you're in the middle of withdrawing"
                    .to_string(),
            )),
            Self::ForceSaleLocked { .. } if price != Price::zero() => {
                Err(DomainError::InvalidStateTransition(
                    "Slot is locked for force selling, cannot put up for sale for nonzero price"
                        .to_string(),
                ))
            },
            _ => Ok(()),
        }
    }

    /// List (or relist) the slot at `price`
    pub fn list(self, price: Price, now: UnixSeconds) -> Result<Self, DomainError> {
        self.ensure_listable(price)?;
        Ok(match self {
            Self::ForceSaleLocked { .. } => Self::ForceSaleLocked { listed_since: Some(now) },
            _ => Self::ForSale { price, since: now },
        })
    }

    /// Withdraw any listing. Locks are preserved.
    pub fn unlist(self) -> Self {
        match self {
            Self::ForSale { .. } => Self::Held,
            Self::ForceSaleLocked { .. } => Self::ForceSaleLocked { listed_since: None },
            other => other,
        }
    }

    /// Lock an expired slot for forced sale, clearing its listing
    pub fn force_lock(self) -> Result<Self, DomainError> {
        match self {
            Self::Held | Self::ForSale { .. } => Ok(Self::ForceSaleLocked { listed_since: None }),
            other => Err(DomainError::InvalidStateTransition(format!(
                "cannot force-lock a slot in state {:?}",
                other
            ))),
        }
    }

    /// Lock the slot for a withdrawal, clearing its listing
    pub fn lock_for_withdrawal(self, code: WithdrawalCode) -> Result<Self, DomainError> {
        match self {
            Self::Held | Self::ForSale { .. } => Ok(Self::WithdrawalLocked { code }),
            Self::ForceSaleLocked { .. } => Err(DomainError::InvalidStateTransition(
                "Cannot withdraw a slot that is locked for force selling".to_string(),
            )),
            Self::WithdrawalLocked { .. } => Err(DomainError::InvalidStateTransition(
                "A withdrawal is already in progress for this slot".to_string(),
            )),
        }
    }

    /// Release an expired withdrawal lock
    pub fn release_withdrawal(self) -> Result<Self, DomainError> {
        match self {
            Self::WithdrawalLocked { .. } => Ok(Self::Held),
            other => Err(DomainError::InvalidStateTransition(format!(
                "slot is not withdrawal-locked: {:?}",
                other
            ))),
        }
    }
}

/// One physical unit of inventory owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub user_id: UserId,
    pub index: SlotIndex,
    pub listing_id: ListingId,
    pub expiry_time: UnixSeconds,
    pub renewals: i64,
    pub state: SlotState,
}

impl Slot {
    /// Whether the slot is past its expiry
    pub fn is_expired(&self, now: UnixSeconds) -> bool {
        self.expiry_time <= now
    }
}

// =============================================================================
// Orders and trades
// =============================================================================

/// Resting buy order; its `price * quantity` is already escrowed from the balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub price: Price,
    pub quantity: i64,
    pub created_at: UnixSeconds,
}

/// Resting sell order (a listed slot)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ask {
    pub user_id: UserId,
    pub slot_index: SlotIndex,
    pub price: Price,
    pub since: UnixSeconds,
}

/// Append-only settlement record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub listing_id: ListingId,
    pub price: i64,
    pub timestamp: UnixSeconds,
}

// =============================================================================
// Custody
// =============================================================================

/// An item physically confirmed present in a bot's remote storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub item_id: DepositId,
    pub listing_id: ListingId,
    pub bot_uuid: BotUuid,
    pub slot: StorageSlot,
}

/// "If this item is seen, credit this user"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub deposit_id: DepositId,
    pub user_id: UserId,
    pub listing_id: ListingId,
    pub expiry_time: UnixSeconds,
    pub picked_up_at: Option<UnixSeconds>,
}

impl PendingDeposit {
    /// Whether the sweep should discard this deposit.
    ///
    /// Never-seen deposits go at expiry; picked-up but unconfirmed ones are
    /// kept for `stuck_after` seconds past their pickup.
    pub fn is_abandoned(&self, now: UnixSeconds, stuck_after: i64) -> bool {
        self.expiry_time < now
            && self.picked_up_at.map_or(true, |at| at < now - stuck_after)
    }
}

/// "Drop this specific physical item when this code is presented"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub code: WithdrawalCode,
    pub item_id: DepositId,
    pub expiry_time: UnixSeconds,
}

// =============================================================================
// Notifications
// =============================================================================

/// Text message for a user, delivered only after the producing transaction commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
}

impl Notification {
    pub fn new(user_id: UserId, message: impl Into<String>) -> Self {
        Self {
            user_id,
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(locked: i64, price: Option<i64>, since: Option<i64>, code: Option<i64>) -> SlotColumns {
        SlotColumns {
            locked,
            sale_price: price,
            for_sale_since: since,
            withdrawal_code: code,
        }
    }

    #[test]
    fn test_slot_state_columns_roundtrip() {
        let states = [
            SlotState::Held,
            SlotState::ForSale { price: Price::ask(5).unwrap(), since: 100 },
            SlotState::ForceSaleLocked { listed_since: None },
            SlotState::ForceSaleLocked { listed_since: Some(200) },
            SlotState::WithdrawalLocked { code: WithdrawalCode::new(42) },
        ];
        for state in states {
            assert_eq!(SlotState::from_columns(state.to_columns()).unwrap(), state);
        }
    }

    #[test]
    fn test_invalid_column_combinations_rejected() {
        // for sale while withdrawing
        assert!(SlotState::from_columns(columns(2, Some(1), Some(1), Some(9))).is_err());
        // force-locked at nonzero price
        assert!(SlotState::from_columns(columns(1, Some(3), Some(1), None)).is_err());
        // price without timestamp
        assert!(SlotState::from_columns(columns(0, Some(3), None, None)).is_err());
        // withdrawal code without lock
        assert!(SlotState::from_columns(columns(0, None, None, Some(9))).is_err());
        assert!(SlotState::from_columns(columns(3, None, None, None)).is_err());
    }

    #[test]
    fn test_force_locked_only_lists_for_free() {
        let locked = SlotState::ForceSaleLocked { listed_since: None };
        assert!(locked.list(Price::ask(1).unwrap(), 10).is_err());
        assert_eq!(
            locked.list(Price::zero(), 10).unwrap(),
            SlotState::ForceSaleLocked { listed_since: Some(10) }
        );
    }

    #[test]
    fn test_withdrawal_locked_cannot_list() {
        let state = SlotState::WithdrawalLocked { code: WithdrawalCode::new(1) };
        assert!(state.list(Price::zero(), 1).is_err());
        assert_eq!(state.release_withdrawal().unwrap(), SlotState::Held);
    }

    #[test]
    fn test_withdrawal_lock_clears_listing() {
        let listed = SlotState::ForSale { price: Price::ask(9).unwrap(), since: 3 };
        let locked = listed.lock_for_withdrawal(WithdrawalCode::new(77)).unwrap();
        assert_eq!(locked.sale_price(), None);
        assert_eq!(locked.to_columns().withdrawal_code, Some(77));
        assert!(SlotState::ForceSaleLocked { listed_since: None }
            .lock_for_withdrawal(WithdrawalCode::new(1))
            .is_err());
    }

    #[test]
    fn test_unlist_keeps_force_lock() {
        let state = SlotState::ForceSaleLocked { listed_since: Some(4) };
        assert_eq!(state.unlist(), SlotState::ForceSaleLocked { listed_since: None });
        let listed = SlotState::ForSale { price: Price::ask(2).unwrap(), since: 1 };
        assert_eq!(listed.unlist(), SlotState::Held);
    }

    #[test]
    fn test_deposit_abandonment() {
        let mut deposit = PendingDeposit {
            deposit_id: DepositId::new(1).unwrap(),
            user_id: 1,
            listing_id: 1,
            expiry_time: 1_000,
            picked_up_at: None,
        };
        assert!(!deposit.is_abandoned(999, 86_400));
        assert!(deposit.is_abandoned(1_001, 86_400));

        deposit.picked_up_at = Some(900);
        assert!(!deposit.is_abandoned(1_001, 86_400));
        assert!(deposit.is_abandoned(900 + 86_401, 86_400));
    }

    #[test]
    fn test_slot_state_serializes() {
        let json = serde_json::to_string(&SlotState::Held).unwrap();
        assert_eq!(json, "\"Held\"");
    }
}
