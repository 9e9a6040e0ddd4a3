// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for the rewards tables.
//!
//! Plain `fn`s take a `&Connection` so the reward services can compose them
//! inside one write transaction; `async fn`s are standalone operations.

pub mod grants;
pub mod mappings;
pub mod packages;
pub mod progress;
pub mod referrals;
pub mod settings;
pub mod tracks;
