//! Stash Domain Layer
//!
//! Pure ledger types with zero I/O dependencies.
//! Contains entities, the slot lifecycle, value objects and the deposit item
//! naming convention shared with the bot fleet.

#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod naming;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    now_unix, Ask, BuyOrder, CompletedTrade, InventoryItem, Listing, LockState, NewListing,
    Notification, PendingDeposit, PendingWithdrawal, Slot, SlotColumns, SlotState, User,
};
pub use naming::{deposit_item_name, full_container_key, parse_deposit_name, ObservedItem};
pub use value_objects::{
    BotUuid, DepositId, DomainError, ListingId, Price, Quantity, SlotIndex, StorageSlot,
    UnixSeconds, UserId, WithdrawalCode, REMOTE_STORAGE_SLOTS,
};
