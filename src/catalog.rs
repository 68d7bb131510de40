// src/catalog.rs
//! The rule catalog: the closed, static registry of detectors.
//!
//! There is no global mutable state here — the table is a constant, and
//! every engine invocation receives its own configured view of it.

use crate::detectors::{atomic_map, races, scalability, time, timers, DetectorFn};
use crate::types::{Confidence, RuleId, Severity};

/// One catalog entry: identity, defaults, and the evaluator.
pub struct RuleSpec {
    pub id: RuleId,
    pub severity: Severity,
    pub confidence: Confidence,
    pub summary: &'static str,
    pub eval: DetectorFn,
}

/// Catalog order is also evaluation order within a unit, which keeps
/// per-unit diagnostics deterministic before the final sort.
pub const CATALOG: &[RuleSpec] = &[
    RuleSpec {
        id: RuleId::Rc1,
        severity: Severity::High,
        confidence: Confidence::High,
        summary: "request handler touches shared mutable state unguarded",
        eval: races::detect_rc1,
    },
    RuleSpec {
        id: RuleId::Rc2,
        severity: Severity::High,
        confidence: Confidence::High,
        summary: "mutable binding shared across tasks with an unguarded access",
        eval: races::detect_rc2,
    },
    RuleSpec {
        id: RuleId::Rc3,
        severity: Severity::High,
        confidence: Confidence::Medium,
        summary: "accessor leaks an aliasing reference out of its critical section",
        eval: races::detect_rc3,
    },
    RuleSpec {
        id: RuleId::Rc4,
        severity: Severity::High,
        confidence: Confidence::Medium,
        summary: "load-then-store race on a concurrent map",
        eval: atomic_map::detect_rc4,
    },
    RuleSpec {
        id: RuleId::Sc1,
        severity: Severity::Medium,
        confidence: Confidence::Low,
        summary: "zero-capacity channel",
        eval: scalability::detect_sc1,
    },
    RuleSpec {
        id: RuleId::Sc2,
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        summary: "read/write lock over a short critical section",
        eval: scalability::detect_sc2,
    },
    RuleSpec {
        id: RuleId::Tm1,
        severity: Severity::High,
        confidence: Confidence::High,
        summary: "repeating timer not stopped on every exit path",
        eval: timers::detect_tm1,
    },
    RuleSpec {
        id: RuleId::Tm2,
        severity: Severity::Medium,
        confidence: Confidence::High,
        summary: "structural equality between instants",
        eval: time::detect_tm2,
    },
    RuleSpec {
        id: RuleId::Tm3,
        severity: Severity::High,
        confidence: Confidence::High,
        summary: "elapsed duration from a wall-only instant",
        eval: time::detect_tm3,
    },
    RuleSpec {
        id: RuleId::Tm4,
        severity: Severity::Medium,
        confidence: Confidence::Medium,
        summary: "ordering comparison with mixed monotonic state",
        eval: time::detect_tm4,
    },
];

/// Looks up a detector rule. Reserved ids (`ingest`, `internal`) have no
/// catalog entry.
#[must_use]
pub fn spec(id: RuleId) -> Option<&'static RuleSpec> {
    CATALOG.iter().find(|s| s.id == id)
}
