// SPDX-FileCopyrightText: 2026 Tressa Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Tressa configuration system.

use tressa_config::diagnostic::ConfigError;
use tressa_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_tressa_config() {
    let toml = r#"
[service]
name = "salon-east"
log_level = "debug"

[storage]
database_path = "/tmp/rewards.db"
wal_mode = false
busy_timeout_ms = 250

[sweeper]
enabled = false
interval_secs = 900
run_on_start = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.service.name, "salon-east");
    assert_eq!(config.service.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/rewards.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 250);
    assert!(!config.sweeper.enabled);
    assert_eq!(config.sweeper.interval_secs, 900);
    assert!(!config.sweeper.run_on_start);
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.service.name, "tressa");
    assert_eq!(config.service.log_level, "info");
    assert!(config.storage.database_path.ends_with("tressa.db"));
    assert!(config.storage.wal_mode);
    assert_eq!(config.storage.busy_timeout_ms, 5_000);
    assert!(config.sweeper.enabled);
    assert_eq!(config.sweeper.interval_secs, 3_600);
    assert!(config.sweeper.run_on_start);
}

/// Unknown field in [sweeper] is rejected with a suggestion.
#[test]
fn unknown_sweeper_key_produces_suggestion() {
    let toml = r#"
[sweeper]
interval_sec = 60
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "interval_sec");
            assert_eq!(suggestion.as_deref(), Some("interval_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[rewards]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Wrong value type is reported as InvalidType.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[sweeper]
interval_secs = "hourly"
"#;

    let errors = load_and_validate_str(toml).expect_err("string is not an integer");
    assert!(
        matches!(&errors[0], ConfigError::InvalidType { key, .. } if key.contains("interval_secs")),
        "got {errors:?}"
    );
}

/// Semantically invalid values pass deserialization but fail validation.
#[test]
fn zero_interval_fails_validation() {
    let toml = r#"
[sweeper]
interval_secs = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero interval is invalid");
    assert!(matches!(errors[0], ConfigError::Validation { .. }));
}

/// TRESSA_* environment variables override file values, including keys with underscores.
#[test]
fn env_var_overrides_nested_keys() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "tressa.toml",
            r#"
[sweeper]
interval_secs = 60
"#,
        )?;
        jail.set_env("TRESSA_SWEEPER_INTERVAL_SECS", "120");
        jail.set_env("TRESSA_STORAGE_BUSY_TIMEOUT_MS", "10");

        let config = tressa_config::load_config_from_path(std::path::Path::new("tressa.toml"))?;
        assert_eq!(config.sweeper.interval_secs, 120);
        assert_eq!(config.storage.busy_timeout_ms, 10);
        Ok(())
    });
}
