// tests/unit_config.rs
//! Configuration loading and fail-fast validation at the engine boundary.

use std::fs::File;
use std::io::Write;

use tempfile::TempDir;

use racewarden_core::config::CatalogConfig;
use racewarden_core::engine::Engine;
use racewarden_core::error::WardenError;

#[test]
fn loads_config_document_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("racewarden.toml");
    let mut file = File::create(&path).unwrap();
    write!(
        file,
        r#"
[rules."Sc.1"]
enabled = false

[thresholds]
short_section_stmts = 20
"#
    )
    .unwrap();

    let cfg = CatalogConfig::load(&path).unwrap();
    assert_eq!(cfg.thresholds.short_section_stmts, 20);
    assert!(Engine::new(cfg).is_ok());
}

#[test]
fn missing_file_reports_its_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nope.toml");
    let err = CatalogConfig::load(&path).unwrap_err();
    assert!(matches!(err, WardenError::Io { path: p, .. } if p == path));
}

#[test]
fn malformed_document_is_rejected() {
    assert!(CatalogConfig::from_toml_str("rules = 3").is_err());
}

#[test]
fn engine_construction_fails_fast_on_unknown_rule() {
    let cfg = CatalogConfig::from_toml_str(
        r#"
        [rules."XX.1"]
        enabled = true
        "#,
    )
    .unwrap();
    assert!(matches!(
        Engine::new(cfg),
        Err(WardenError::UnknownRule(id)) if id == "XX.1"
    ));
}

#[test]
fn engine_construction_fails_fast_on_zero_budget() {
    let cfg = CatalogConfig::from_toml_str("[thresholds]\nunit_budget_ms = 0\n").unwrap();
    assert!(Engine::new(cfg).is_err());
}

#[test]
fn config_document_round_trips() {
    let cfg = CatalogConfig::from_toml_str(
        r#"
        [rules."RC.2"]
        severity = "error"
        "#,
    )
    .unwrap();
    let doc = toml::to_string(&cfg).unwrap();
    let back = CatalogConfig::from_toml_str(&doc).unwrap();
    assert_eq!(
        back.rules.get("RC.2").unwrap().severity,
        cfg.rules.get("RC.2").unwrap().severity
    );
}
