//! Store error types.

use common::ReservationId;
use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Not enough unreserved stock to satisfy a reservation.
    #[error("insufficient stock for {sku_id}: requested {requested}, available {available}")]
    InsufficientStock {
        sku_id: String,
        requested: u32,
        available: u32,
    },

    /// The SKU has no inventory record.
    #[error("no inventory record for {0}")]
    SkuNotFound(String),

    /// The reservation is not active (already committed, or never made).
    #[error("unknown reservation {0}")]
    UnknownReservation(ReservationId),

    /// A referenced record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A stored value could not be decoded into its domain type.
    #[error("stored value could not be decoded: {0}")]
    Decode(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Shorthand for [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
