//! Table-driven tests for configuration loading and validation.

mod common;

use std::path::PathBuf;

use sitekeeper::config::{load_config_from_str, LogFormat};
use sitekeeper::load_config;

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Expected error substring (if should_succeed is false).
    expected_error: Option<&'static str>,
}

const JSON_CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db"
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "stateDatabase": "/srv/state.db",
            "siteName": "Shop",
            "origin": "https://shop.example.com",
            "categories": {
                "uploads": "media",
                "themes": "look/themes",
                "plugins": "ext"
            },
            "excludedPaths": ["content/cache/**", "*.tmp"],
            "batch": {
                "rowsPerFetch": 500,
                "categoryFiles": 20,
                "archiveFiles": 40,
                "archiveFilesAfterError": 5,
                "extractEntries": 60,
                "restoreFiles": 30
            },
            "diskSpace": {
                "check": true,
                "lowBytes": 2048,
                "criticalBytes": 1024,
                "unlimitedBytes": 1099511627776
            },
            "retention": {
                "activeJobSecs": 600,
                "completedJobSecs": 60,
                "progressSecs": 600
            },
            "logging": { "level": "debug", "format": "json" }
        }"#,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "invalid_version",
        config_json: r#"{
            "version": "2.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db"
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "missing_required_field",
        config_json: r#"{
            "version": "1.0",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db"
        }"#,
        should_succeed: false,
        expected_error: Some("siteRoot"),
    },
    ConfigTestCase {
        name: "unknown_field",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "compression": "max"
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "zero_batch_size",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "batch": { "archiveFiles": 0 }
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_log_level",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "logging": { "level": "loud" }
        }"#,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "blank_site_name",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "siteName": "   "
        }"#,
        should_succeed: false,
        expected_error: Some("siteName must not be empty"),
    },
    ConfigTestCase {
        name: "critical_above_low_threshold",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "diskSpace": { "lowBytes": 100, "criticalBytes": 200 }
        }"#,
        should_succeed: false,
        expected_error: Some("criticalBytes must not exceed"),
    },
    ConfigTestCase {
        name: "invalid_excluded_pattern",
        config_json: r#"{
            "version": "1.0",
            "siteRoot": "/srv/site",
            "archiveDirectory": "/srv/backups",
            "workDirectory": "/srv/work",
            "database": "/srv/site.db",
            "excludedPaths": ["content/["]
        }"#,
        should_succeed: false,
        expected_error: Some("Invalid excluded path pattern"),
    },
    ConfigTestCase {
        name: "invalid_json",
        config_json: r#"{ invalid json }"#,
        should_succeed: false,
        expected_error: Some("Failed to parse config JSON"),
    },
];

#[test]
fn test_json_config_loading() {
    for test_case in JSON_CONFIG_TESTS {
        let result = load_config_from_str(test_case.config_json);

        if test_case.should_succeed {
            assert!(
                result.is_ok(),
                "Test '{}': Expected success but got error: {:?}",
                test_case.name,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Test '{}': Expected error but got success",
                test_case.name
            );

            if let Some(expected_error) = test_case.expected_error {
                let error_msg = result.err().unwrap().to_string();
                assert!(
                    error_msg.contains(expected_error),
                    "Test '{}': Expected error containing '{}', got '{}'",
                    test_case.name,
                    expected_error,
                    error_msg
                );
            }
        }
    }
}

#[test]
fn test_full_config_values() {
    let config = load_config_from_str(JSON_CONFIG_TESTS[1].config_json).unwrap();

    assert_eq!(config.site_name, "Shop");
    assert_eq!(config.state_database_path(), PathBuf::from("/srv/state.db"));
    assert_eq!(
        config.category_dir(sitekeeper::FileCategory::Uploads),
        PathBuf::from("/srv/site/media")
    );
    assert_eq!(config.batch.archive_files_after_error, 5);
    assert_eq!(config.disk_space.critical_bytes, 1024);
    assert_eq!(config.retention.completed_job_secs, 60);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_load_config_from_file() {
    let harness = common::TestHarness::new();
    let path = harness.temp_path().join("config.json");
    std::fs::write(&path, JSON_CONFIG_TESTS[0].config_json).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.site_root, PathBuf::from("/srv/site"));

    let missing = load_config(harness.temp_path().join("absent.json")).unwrap_err();
    assert!(missing.to_string().contains("Failed to read config file"));
}
