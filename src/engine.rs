// src/engine.rs
//! The hazard engine: runs the configured catalog over built units and
//! turns candidates into an ordered diagnostic stream.
//!
//! Units are independent and analyzed in parallel; detectors within a unit
//! run in catalog order. Results are merged by concatenation plus a stable
//! sort by (unit, line, rule), so worker scheduling never changes the
//! output. Identical IR and configuration always produce the identical
//! stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use regex::Regex;

use crate::catalog::{RuleSpec, CATALOG};
use crate::config::CatalogConfig;
use crate::detectors::RuleCx;
use crate::error::{Result, WardenError};
use crate::ir::build::BuildOutcome;
use crate::ir::UnitIr;
use crate::types::{
    Candidate, Confidence, Diagnostic, Location, RuleId, RunOutcome, RunReport, Severity,
};

/// Cooperative cancellation: a shared flag plus an optional deadline.
/// Checked before each (unit, rule) pair; work already started finishes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + budget),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

struct ResolvedRule {
    spec: &'static RuleSpec,
    severity: Severity,
    confidence: Confidence,
}

struct UnitOutput {
    diagnostics: Vec<Diagnostic>,
    failed: bool,
    /// At least one detector ran over this unit.
    analyzed: bool,
    skipped: usize,
}

/// One configured engine. Construction validates the configuration; a bad
/// document never reaches analysis.
pub struct Engine {
    rules: Vec<ResolvedRule>,
    cx: RuleCx,
    unit_budget: Option<Duration>,
}

impl Engine {
    /// Builds an engine from a catalog configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown rule ids, out-of-range thresholds, or
    /// invalid handler patterns — fail fast, before any unit is analyzed.
    pub fn new(config: CatalogConfig) -> Result<Self> {
        config.validate()?;

        let mut handler_patterns = Vec::with_capacity(config.handlers.patterns.len());
        for pattern in &config.handlers.patterns {
            let re = Regex::new(pattern).map_err(|source| WardenError::HandlerPattern {
                pattern: pattern.clone(),
                source,
            })?;
            handler_patterns.push(re);
        }

        let rules = CATALOG
            .iter()
            .filter_map(|spec| {
                let over = config.rule(spec.id);
                if over.and_then(|o| o.enabled) == Some(false) {
                    return None;
                }
                Some(ResolvedRule {
                    spec,
                    severity: over.and_then(|o| o.severity).unwrap_or(spec.severity),
                    confidence: over.and_then(|o| o.confidence).unwrap_or(spec.confidence),
                })
            })
            .collect();

        Ok(Self {
            rules,
            cx: RuleCx {
                short_section_stmts: config.thresholds.short_section_stmts,
                handler_patterns,
            },
            unit_budget: config.thresholds.unit_budget_ms.map(Duration::from_millis),
        })
    }

    /// An engine with every rule at its catalog default.
    ///
    /// # Panics
    ///
    /// Panics if the built-in default configuration is invalid, which is a
    /// developer error covered by tests.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(CatalogConfig::default()).expect("default configuration is valid")
    }

    /// Analyzes a batch of built units.
    #[must_use]
    pub fn run(&self, units: Vec<BuildOutcome>) -> RunReport {
        self.run_cancellable(units, &CancelToken::new())
    }

    /// Analyzes a batch with cooperative cancellation. On trigger, pending
    /// (unit, rule) pairs are skipped and one partial-result diagnostic is
    /// appended; everything already produced stays in the stream.
    #[must_use]
    pub fn run_cancellable(&self, units: Vec<BuildOutcome>, cancel: &CancelToken) -> RunReport {
        let start = Instant::now();

        let outputs: Vec<UnitOutput> = units
            .into_par_iter()
            .map(|outcome| self.analyze_unit(outcome, cancel))
            .collect();

        let mut diagnostics = Vec::new();
        let mut units_analyzed = 0;
        let mut units_failed = 0;
        let mut skipped_pairs = 0;
        for out in outputs {
            diagnostics.extend(out.diagnostics);
            units_analyzed += usize::from(out.analyzed);
            units_failed += usize::from(out.failed);
            skipped_pairs += out.skipped;
        }

        if skipped_pairs > 0 {
            diagnostics.push(Diagnostic {
                rule: RuleId::Internal,
                severity: Severity::Medium,
                confidence: Confidence::High,
                location: Location {
                    unit: String::from("(run)"),
                    line: 0,
                },
                message: format!(
                    "analysis cancelled before completion; {skipped_pairs} unit/rule \
                     pairs skipped, results are partial"
                ),
                suppressed: false,
                suppression_note: None,
            });
        }

        diagnostics.sort_by(|a, b| {
            a.location
                .cmp(&b.location)
                .then_with(|| a.rule.cmp(&b.rule))
        });

        let outcome = if units_failed > 0 {
            RunOutcome::EngineError
        } else if diagnostics.iter().any(|d| !d.suppressed) {
            RunOutcome::Findings
        } else {
            RunOutcome::Clean
        };

        RunReport {
            diagnostics,
            outcome,
            duration_ms: start.elapsed().as_millis(),
            units_analyzed,
            units_failed,
            skipped_pairs,
        }
    }

    fn analyze_unit(&self, outcome: BuildOutcome, cancel: &CancelToken) -> UnitOutput {
        let ir = match outcome {
            Ok(ir) => ir,
            Err(failure) => {
                return UnitOutput {
                    diagnostics: vec![Diagnostic {
                        rule: RuleId::Ingest,
                        severity: Severity::Error,
                        confidence: Confidence::High,
                        location: Location {
                            unit: failure.unit,
                            line: 0,
                        },
                        message: failure.message,
                        suppressed: false,
                        suppression_note: None,
                    }],
                    failed: true,
                    analyzed: false,
                    skipped: 0,
                }
            }
        };

        let unit_start = Instant::now();
        let mut diagnostics = Vec::new();
        let mut analyzed = false;
        let mut skipped = 0;

        for (i, rule) in self.rules.iter().enumerate() {
            if cancel.is_triggered() {
                skipped = self.rules.len() - i;
                break;
            }
            if let Some(budget) = self.unit_budget {
                if unit_start.elapsed() >= budget {
                    diagnostics.push(self.internal(
                        &ir.name,
                        format!(
                            "analysis budget exceeded after {}ms; {} rules skipped",
                            budget.as_millis(),
                            self.rules.len() - i
                        ),
                    ));
                    break;
                }
            }

            analyzed = true;
            match (rule.spec.eval)(&ir, &self.cx) {
                Ok(candidates) => {
                    for c in candidates {
                        diagnostics.push(self.finish(&ir, rule, c));
                    }
                }
                // Isolated: one malformed traversal poisons only this
                // (unit, rule) pair.
                Err(e) => diagnostics.push(self.internal(
                    &ir.name,
                    format!("detector {} failed: {e}", rule.spec.id),
                )),
            }
        }

        UnitOutput {
            diagnostics,
            failed: false,
            analyzed,
            skipped,
        }
    }

    fn finish(&self, ir: &UnitIr, rule: &ResolvedRule, candidate: Candidate) -> Diagnostic {
        let suppression = ir.suppression_for(candidate.line, candidate.rule);
        Diagnostic {
            rule: candidate.rule,
            severity: rule.severity,
            confidence: rule.confidence,
            location: Location {
                unit: ir.name.clone(),
                line: candidate.line,
            },
            message: candidate.message,
            suppressed: suppression.is_some(),
            suppression_note: suppression.map(|s| s.justification.clone()),
        }
    }

    fn internal(&self, unit: &str, message: String) -> Diagnostic {
        Diagnostic {
            rule: RuleId::Internal,
            severity: Severity::Error,
            confidence: Confidence::High,
            location: Location {
                unit: unit.to_string(),
                line: 0,
            },
            message,
            suppressed: false,
            suppression_note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::UnitBuilder;
    use crate::ir::Capacity;

    fn zero_channel_unit(name: &str) -> crate::ir::UnitIr {
        let mut u = UnitBuilder::new(name);
        u.channel("sync", Capacity::Zero, 5);
        u.build()
    }

    #[test]
    fn default_engine_builds() {
        let engine = Engine::with_defaults();
        assert_eq!(engine.rules.len(), 10);
    }

    #[test]
    fn disabled_rule_is_not_run() {
        let config = CatalogConfig::from_toml_str("[rules.\"Sc.1\"]\nenabled = false\n").unwrap();
        let engine = Engine::new(config).unwrap();
        let report = engine.run(vec![Ok(zero_channel_unit("u"))]);
        assert!(report.diagnostics.is_empty());
        assert_eq!(report.outcome, RunOutcome::Clean);
    }

    #[test]
    fn overrides_change_severity_and_confidence() {
        let config = CatalogConfig::from_toml_str(
            "[rules.\"Sc.1\"]\nseverity = \"high\"\nconfidence = \"high\"\n",
        )
        .unwrap();
        let engine = Engine::new(config).unwrap();
        let report = engine.run(vec![Ok(zero_channel_unit("u"))]);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].severity, Severity::High);
        assert_eq!(report.diagnostics[0].confidence, Confidence::High);
    }

    #[test]
    fn bad_handler_pattern_fails_construction() {
        let config =
            CatalogConfig::from_toml_str("[handlers]\npatterns = [\"(unclosed\"]\n").unwrap();
        assert!(matches!(
            Engine::new(config),
            Err(WardenError::HandlerPattern { .. })
        ));
    }

    #[test]
    fn cancelled_token_yields_partial_result_diagnostic() {
        let engine = Engine::with_defaults();
        let token = CancelToken::new();
        token.cancel();
        let report = engine.run_cancellable(vec![Ok(zero_channel_unit("u"))], &token);
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].rule, RuleId::Internal);
        assert!(report.skipped_pairs > 0);
    }

    #[test]
    fn skipped_units_are_not_counted_as_analyzed() {
        let engine = Engine::with_defaults();
        let token = CancelToken::new();
        token.cancel();
        let units = vec![Ok(zero_channel_unit("a")), Ok(zero_channel_unit("b"))];
        let report = engine.run_cancellable(units, &token);
        assert_eq!(report.units_analyzed, 0);
        assert_eq!(report.units_failed, 0);
    }
}
