//! Storage layer errors

use stash_domain::{DomainError, ListingId};
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (user, slot, listing, ...)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// A schema constraint rejected the write (unique, foreign key, check, not null)
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Slot count and physical inventory disagree for a listing
    #[error(
        "Conservation violated for listing {listing_id}: {in_slots} in slots, {in_storage} in storage"
    )]
    ConservationViolated {
        listing_id: ListingId,
        in_slots: i64,
        in_storage: i64,
    },

    /// Persisted row could not be turned back into a domain value
    #[error("Corrupt row: {0}")]
    Corrupt(#[from] DomainError),

    /// Listings file could not be read or parsed
    #[error("Invalid seed data: {0}")]
    InvalidSeed(String),

    /// The transaction executor has shut down
    #[error("Transaction executor is closed")]
    Closed,

    /// Database error
    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Whether this is a plain "no such row" result
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("row", "unknown"),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StoreError::Constraint(db_err.message().to_string()),
                _ => StoreError::Database(db_err.to_string()),
            },
            _ => StoreError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Result type for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
