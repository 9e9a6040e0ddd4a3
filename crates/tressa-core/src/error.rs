// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tressa rewards engine.

use thiserror::Error;

/// The primary error type used across storage, configuration, and reward services.
///
/// Redemption-facing variants (`NotFound`, `NotActive`, `AlreadyRedeemed`,
/// `Expired`, `BookingAlreadyDiscounted`) are terminal and safe to show to
/// the customer. `Transient` is the only variant worth retrying.
#[derive(Debug, Error)]
pub enum TressaError {
    /// Process configuration errors (invalid TOML, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, row decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The entity does not exist, or is not owned by the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The entity exists but is not in a state that allows the operation.
    #[error("{id} is not active (status: {status})")]
    NotActive { id: String, status: String },

    /// The grant was already consumed by an earlier redemption.
    #[error("reward {id} has already been redeemed")]
    AlreadyRedeemed { id: String },

    /// The grant or package is past its deadline. The row has been moved to `expired`.
    #[error("{id} has expired")]
    Expired { id: String },

    /// The booking already carries a reward discount.
    #[error("booking {booking_id} already has a reward applied")]
    BookingAlreadyDiscounted { booking_id: String },

    /// Malformed track, mapping, or programme configuration, rejected at write time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Contention on the storage layer persisted past the single retry.
    #[error("transient storage contention: {0}")]
    Transient(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TressaError {
    /// Whether the caller may retry the operation unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, TressaError::Transient(_))
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        TressaError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<serde_json::Error> for TressaError {
    fn from(e: serde_json::Error) -> Self {
        TressaError::InvalidConfig(e.to_string())
    }
}
