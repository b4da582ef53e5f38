//! Engine error types.

use stash_domain::{BotUuid, DepositId, DomainError, ListingId, SlotIndex, StorageSlot, UserId};
use stash_store::StoreError;
use thiserror::Error;

/// Errors raised by ledger operations.
///
/// Validation and not-found errors never leave side effects behind: the
/// enclosing transaction rolls back. The custody verdicts are what let the
/// reconciler tell "drop this item" apart from a plain fault.
#[derive(Debug, Error)]
pub enum EngineError {
    // --- validation ---
    /// Matching would trade a user against themselves
    #[error("Cannot place an order that would match against one of your own orders")]
    SelfTrade,

    /// Not enough balance to escrow the order
    #[error("Cannot place a buy order for more than you have")]
    InsufficientBalance,

    /// Every slot of the user is full
    #[error("There are no open slots the item could go in")]
    NoFreeSlots,

    /// Slot exists but its state forbids the operation
    #[error("{0}")]
    SlotUnavailable(String),

    /// No connected bot holds an item that could be withdrawn
    #[error(
        "Unable to schedule your withdrawal; none of the bots with that item are currently connected. Please try again later."
    )]
    NoBotAvailable,

    // --- not found ---
    #[error("Slot #{index} of user {user_id} not found")]
    SlotNotFound { user_id: UserId, index: SlotIndex },

    #[error("Listing {0} not found")]
    ListingNotFound(ListingId),

    #[error("User {0} not found")]
    UserNotFound(UserId),

    #[error("Unknown withdrawal code")]
    UnknownWithdrawalCode,

    // --- custody verdicts ---
    /// Neither pending nor in inventory
    #[error("Item {0} is not accounted for")]
    UnknownItem(DepositId),

    /// Accounted for, but at another bot or storage slot
    #[error("Item {item} belongs at bot {expected_bot} slot {expected_slot}")]
    MisplacedItem {
        item: DepositId,
        expected_bot: BotUuid,
        expected_slot: StorageSlot,
    },

    /// Deposit cannot be credited because the owner has no free slot
    #[error("Deposit {deposit_id} cannot be credited to user {user_id}: all slots are full")]
    DepositUndeliverable { deposit_id: DepositId, user_id: UserId },

    // --- passthrough ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Ledger and physical custody diverged; must be logged loudly
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(StoreError::ConservationViolated { .. }))
    }

    /// Errors a user caused and should see verbatim
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::Store(_))
    }

    /// Replace a store not-found with a more specific error
    pub(crate) fn or_not_found(err: StoreError, specific: Self) -> Self {
        if err.is_not_found() {
            specific
        } else {
            Self::Store(err)
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
