// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tressa rewards engine.
//!
//! This crate provides the error type, the domain enums stored in every
//! rewards table, the clock seam used for expiry decisions, and the storage
//! lifecycle trait.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TressaError;
pub use traits::StorageAdapter;
pub use types::{GrantStatus, HealthStatus, PackageStatus, RewardType, TrackType};
