// src/detectors/time.rs
//! Tm.2/Tm.3/Tm.4: monotonic-clock misuse.
//!
//! A captured instant may carry a monotonic reading alongside the wall
//! reading. Structural equality sees both and is therefore meaningless
//! (Tm.2); elapsed math without the monotonic reading goes negative when
//! the wall clock steps (Tm.3); and ordering a monotonic-bearing instant
//! against a persisted wall-only one compares different clocks (Tm.4).

use crate::ir::{CompareOp, IrError, UnitIr};
use crate::types::{Candidate, RuleId};

use super::RuleCx;

/// Tm.2: `==` between two instants instead of the designated
/// instant-equals operation.
pub fn detect_tm2(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for cmp in &ir.comparisons {
        if cmp.op == CompareOp::Equals && cmp.structural {
            let lhs = ir.instant(cmp.lhs)?;
            let rhs = ir.instant(cmp.rhs)?;
            out.push(Candidate::new(
                RuleId::Tm2,
                cmp.line,
                format!(
                    "structural equality between instants `{}` and `{}`; \
                     use the instant-equals operation",
                    lhs.name, rhs.name
                ),
            ));
        }
    }
    Ok(out)
}

/// Tm.3: elapsed-duration math over an instant with no monotonic reading.
pub fn detect_tm3(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for op in &ir.elapsed {
        let instant = ir.instant(op.instant)?;
        if instant.monotonic {
            continue;
        }
        let cause = instant
            .derived
            .as_ref()
            .map(|d| format!(" (monotonic reading stripped by `{}`)", d.transform))
            .unwrap_or_default();
        out.push(Candidate::new(
            RuleId::Tm3,
            op.line,
            format!(
                "elapsed duration computed from wall-only instant `{}`{}; \
                 the result can be negative if the clock steps",
                instant.name, cause
            ),
        ));
    }
    Ok(out)
}

/// Tm.4: before/after with mixed monotonic state against a persisted
/// instant. Whichever operand still carries a monotonic reading is ordered
/// by a different clock than the stored one.
pub fn detect_tm4(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for cmp in &ir.comparisons {
        if !matches!(cmp.op, CompareOp::Before | CompareOp::After) {
            continue;
        }
        if !cmp.against_persisted {
            continue;
        }
        let lhs = ir.instant(cmp.lhs)?;
        let rhs = ir.instant(cmp.rhs)?;
        if lhs.monotonic != rhs.monotonic {
            out.push(Candidate::new(
                RuleId::Tm4,
                cmp.line,
                format!(
                    "ordering `{}` against `{}` mixes monotonic and wall-only \
                     instants; strip the monotonic reading from both uniformly",
                    lhs.name, rhs.name
                ),
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::UnitBuilder;

    fn cx() -> RuleCx {
        RuleCx {
            short_section_stmts: 12,
            handler_patterns: Vec::new(),
        }
    }

    #[test]
    fn tm2_flags_structural_equality() {
        let mut u = UnitBuilder::new("u");
        let a = u.instant("deadline", true, 3);
        let b = u.instant("now", true, 4);
        u.comparison(CompareOp::Equals, a, b, 5, true, false);
        u.comparison(CompareOp::Equals, a, b, 6, false, false); // instant-equals

        let cands = detect_tm2(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 5);
    }

    #[test]
    fn tm3_flags_wall_only_elapsed() {
        let mut u = UnitBuilder::new("u");
        let start = u.instant("start", true, 3);
        let rounded = u.derived_instant("start_s", start, "round", false, 4);
        u.elapsed(rounded, 6);
        u.elapsed(start, 7);

        let cands = detect_tm3(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 6);
        assert!(
            cands[0].message.contains("`round`"),
            "derivation chain is named: {}",
            cands[0].message
        );
    }

    #[test]
    fn tm4_flags_mixed_ordering_against_persisted() {
        let mut u = UnitBuilder::new("u");
        let live = u.instant("now", true, 3);
        let stored = u.instant("last_seen", false, 4);
        u.comparison(CompareOp::After, live, stored, 5, false, true);

        let cands = detect_tm4(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 5);
    }

    #[test]
    fn tm4_silent_when_flags_agree_or_comparison_is_live() {
        let mut u = UnitBuilder::new("u");
        let a = u.instant("now", true, 3);
        let b = u.instant("then", true, 4);
        let stored = u.instant("last_seen", false, 5);
        u.comparison(CompareOp::Before, a, b, 6, false, true); // both monotonic
        u.comparison(CompareOp::After, a, stored, 7, false, false); // not persisted

        assert!(detect_tm4(&u.build(), &cx()).unwrap().is_empty());
    }
}
