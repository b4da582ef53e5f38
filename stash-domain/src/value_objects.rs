//! Value Objects for the stash domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a User (the identity provider's numeric id)
pub type UserId = i64;

/// Unique identifier for a Listing
pub type ListingId = i64;

/// Position of a slot within one user's account, `0..max_slots`
pub type SlotIndex = i64;

/// Unix time in seconds
pub type UnixSeconds = i64;

/// Number of slots in a bot's remote storage (ender chest)
pub const REMOTE_STORAGE_SLOTS: u8 = 27;

/// Domain errors for value object validation and state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price out of range
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Quantity must be positive
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Bot identifier is not a canonical UUID
    #[error("Invalid bot uuid: {0}")]
    InvalidBotUuid(String),

    /// Remote storage slot out of range
    #[error("Invalid remote storage slot: {0}")]
    InvalidStorageSlot(i64),

    /// Deposit identifier cannot be zero
    #[error("Invalid deposit id: {0}")]
    InvalidDepositId(i64),

    /// Persisted columns do not describe a valid slot state
    #[error("Invalid slot state: {0}")]
    InvalidSlotState(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Arithmetic overflow while computing an amount
    #[error("Amount overflow: {0}")]
    Overflow(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price of one unit, in the ledger currency
///
/// # Invariants
/// - Asks may be zero (free / force-sold), never negative
/// - Bids must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(i64);

impl Price {
    /// Create an ask (sell) price.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value < 0
    pub fn ask(value: i64) -> Result<Self, DomainError> {
        if value < 0 {
            return Err(DomainError::InvalidPrice(
                "Cannot sell for less than zero each".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Create a bid (buy) price.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn bid(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidPrice(
                "Cannot create buy for 0 or less each".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Free (force sales are listed at this price)
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Get the underlying amount
    pub fn amount(&self) -> i64 {
        self.0
    }

    /// Total cost of `quantity` units at this price.
    ///
    /// # Errors
    /// Returns `DomainError::Overflow` if the product does not fit in an i64
    pub fn total(&self, quantity: Quantity) -> Result<i64, DomainError> {
        self.0.checked_mul(quantity.count()).ok_or_else(|| {
            DomainError::Overflow(format!("{} x {} does not fit", self.0, quantity.count()))
        })
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// Number of units on a buy order
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(i64);

impl Quantity {
    /// Create a new Quantity with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidQuantity` if value <= 0
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::InvalidQuantity(
                "Cannot create buy for quantity of 0 or less".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Get the underlying count
    pub fn count(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Bot identity
// =============================================================================

/// UUID of a bot account, persisted in its 36-character hyphenated form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotUuid(Uuid);

impl BotUuid {
    /// Wrap an already parsed uuid
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner uuid
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl FromStr for BotUuid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 36 {
            return Err(DomainError::InvalidBotUuid(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::InvalidBotUuid(s.to_string()))
    }
}

impl fmt::Display for BotUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// =============================================================================
// Remote storage slot
// =============================================================================

/// Slot inside a bot's remote storage, `0..27`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageSlot(u8);

impl StorageSlot {
    /// Create a new storage slot with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStorageSlot` outside `0..27`
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if !(0..i64::from(REMOTE_STORAGE_SLOTS)).contains(&value) {
            return Err(DomainError::InvalidStorageSlot(value));
        }
        Ok(Self(value as u8))
    }

    /// Slot number as persisted
    pub fn number(&self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for StorageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Deposit identifier
// =============================================================================

/// 32-bit identifier of a deposited item.
///
/// The same value is the pending deposit's id, the inventory item's id, and
/// (hex encoded) the name the bot fleet physically sees on the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositId(u32);

impl DepositId {
    /// Create a deposit id
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDepositId` for zero
    pub fn new(value: u32) -> Result<Self, DomainError> {
        if value == 0 {
            return Err(DomainError::InvalidDepositId(0));
        }
        Ok(Self(value))
    }

    /// Rebuild from a persisted column
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDepositId` if the value is zero or outside u32
    pub fn from_column(value: i64) -> Result<Self, DomainError> {
        u32::try_from(value)
            .map_err(|_| DomainError::InvalidDepositId(value))
            .and_then(Self::new)
    }

    /// Raw 32-bit value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Value as persisted
    pub fn as_column(&self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for DepositId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

// =============================================================================
// Withdrawal code
// =============================================================================

/// Code that releases one physical item when presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithdrawalCode(i64);

impl WithdrawalCode {
    /// Wrap a persisted code
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Parse a code typed by a user, decimal or `0x`-prefixed hex
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let value = match input.strip_prefix("0x") {
            Some(hex) => i64::from_str_radix(hex, 16).ok()?,
            None => input.parse::<i64>().ok()?,
        };
        Some(Self(value))
    }
}

impl fmt::Display for WithdrawalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
