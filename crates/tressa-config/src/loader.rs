// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./tressa.toml` > `~/.config/tressa/tressa.toml` > `/etc/tressa/tressa.toml`
//! with environment variable overrides via `TRESSA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::TressaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/tressa/tressa.toml` (system-wide)
/// 3. `~/.config/tressa/tressa.toml` (user XDG config)
/// 4. `./tressa.toml` (local directory)
/// 5. `TRESSA_*` environment variables
pub fn load_config() -> Result<TressaConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<TressaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TressaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TressaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TressaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(TressaConfig::default()))
        .merge(Toml::file("/etc/tressa/tressa.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("tressa/tressa.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("tressa.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// Key names contain underscores, so `Env::split("_")` would be ambiguous:
/// `TRESSA_SWEEPER_INTERVAL_SECS` must become `sweeper.interval_secs`.
pub(crate) fn env_provider() -> Env {
    Env::prefixed("TRESSA_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("service_", "service.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("sweeper_", "sweeper.", 1);
        mapped.into()
    })
}
