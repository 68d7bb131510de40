// src/config.rs
//! The persisted rule-catalog configuration document.
//!
//! TOML shape:
//!
//! ```toml
//! [rules."Sc.1"]
//! enabled = true
//! confidence = "medium"
//!
//! [rules."RC.3"]
//! severity = "medium"
//!
//! [thresholds]
//! short_section_stmts = 12
//!
//! [handlers]
//! patterns = ["(?i)handle", "(?i)route"]
//! ```
//!
//! Absence of an entry means "use the rule default". Validation is
//! fail-fast: an unknown rule id or an out-of-range threshold aborts the
//! run before any analysis starts.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WardenError};
use crate::types::{Confidence, RuleId, Severity};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_short_section_stmts")]
    pub short_section_stmts: u32,
    /// Per-unit analysis budget in milliseconds. Off by default; runs stay
    /// fully deterministic unless this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_budget_ms: Option<u64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            short_section_stmts: default_short_section_stmts(),
            unit_budget_ms: None,
        }
    }
}

const fn default_short_section_stmts() -> u32 {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerConfig {
    #[serde(default = "default_handler_patterns")]
    pub patterns: Vec<String>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            patterns: default_handler_patterns(),
        }
    }
}

fn default_handler_patterns() -> Vec<String> {
    vec![
        r"(?i)handle".to_string(),
        r"(?i)route".to_string(),
        r"(?i)on_request".to_string(),
    ]
}

/// The full configuration document. `Default` is a valid, empty-override
/// configuration with every rule enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, RuleOverride>,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub handlers: HandlerConfig,
}

impl CatalogConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed. Semantic validation
    /// happens separately in [`CatalogConfig::validate`].
    pub fn from_toml_str(doc: &str) -> Result<Self> {
        Ok(toml::from_str(doc)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let doc = fs::read_to_string(path).map_err(|source| WardenError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        Self::from_toml_str(&doc)
    }

    /// Semantic validation, run by the engine before any analysis.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown rule ids or out-of-range thresholds.
    /// Handler patterns are validated when compiled by the engine.
    pub fn validate(&self) -> Result<()> {
        for key in self.rules.keys() {
            if RuleId::parse(key).is_none() {
                return Err(WardenError::UnknownRule(key.clone()));
            }
        }
        if self.thresholds.short_section_stmts == 0 {
            return Err(WardenError::Threshold {
                name: "short_section_stmts",
                value: 0,
            });
        }
        if self.thresholds.unit_budget_ms == Some(0) {
            return Err(WardenError::Threshold {
                name: "unit_budget_ms",
                value: 0,
            });
        }
        Ok(())
    }

    /// The override entry for a rule, if the document has one.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> Option<&RuleOverride> {
        self.rules.get(id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(CatalogConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_overrides_and_thresholds() {
        let cfg = CatalogConfig::from_toml_str(
            r#"
            [rules."Sc.1"]
            enabled = false
            confidence = "medium"

            [rules."RC.3"]
            severity = "medium"

            [thresholds]
            short_section_stmts = 20
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();

        let sc1 = cfg.rule(RuleId::Sc1).unwrap();
        assert_eq!(sc1.enabled, Some(false));
        assert_eq!(sc1.confidence, Some(Confidence::Medium));
        assert_eq!(
            cfg.rule(RuleId::Rc3).unwrap().severity,
            Some(Severity::Medium)
        );
        assert_eq!(cfg.thresholds.short_section_stmts, 20);
        assert!(cfg.rule(RuleId::Rc2).is_none(), "absent entry = defaults");
    }

    #[test]
    fn unknown_rule_id_fails_validation() {
        let cfg = CatalogConfig::from_toml_str(
            r#"
            [rules."RC.9"]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(WardenError::UnknownRule(id)) if id == "RC.9"
        ));
    }

    #[test]
    fn reserved_ids_are_not_configurable() {
        let cfg = CatalogConfig::from_toml_str(
            r#"
            [rules.internal]
            enabled = false
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_threshold_is_out_of_range() {
        let cfg = CatalogConfig::from_toml_str("[thresholds]\nshort_section_stmts = 0\n").unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(WardenError::Threshold { name, .. }) if name == "short_section_stmts"
        ));
    }
}
