// src/detectors/scalability.rs
//! Sc.1/Sc.2: scalability anti-patterns.
//!
//! Both are intent-sensitive: a zero-capacity channel may be a deliberate
//! rendezvous, and a read/write lock may be benchmarked as a win. The
//! detectors report regardless; the engine marks findings suppressed when a
//! front-end annotation at the site says so.

use crate::ir::{Capacity, IrError, LockKind, UnitIr};
use crate::types::{Candidate, RuleId};

use super::RuleCx;

/// Sc.1: zero-capacity channels serialize sender and receiver. Low
/// confidence by default.
pub fn detect_sc1(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    Ok(ir
        .channels
        .iter()
        .filter(|c| c.capacity == Capacity::Zero)
        .map(|c| {
            Candidate::new(
                RuleId::Sc1,
                c.line,
                format!(
                    "channel `{}` has zero capacity; every send blocks until \
                     a receiver is ready",
                    c.name
                ),
            )
        })
        .collect())
}

/// Sc.2: a read/write lock over a short critical section usually loses to a
/// plain mutex — the reader bookkeeping costs more than the exclusion.
pub fn detect_sc2(ir: &UnitIr, cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for sec in &ir.sections {
        let lock = ir.lock(sec.lock)?;
        if lock.kind != LockKind::ReadWrite {
            continue;
        }
        let short = !sec.has_io
            && !sec.has_unbounded_loop
            && sec.stmt_count < cx.short_section_stmts;
        if short {
            out.push(Candidate::new(
                RuleId::Sc2,
                sec.line,
                format!(
                    "read/write lock `{}` guards a short section ({} statements); \
                     a plain mutex is likely faster unless benchmarked otherwise",
                    lock.name, sec.stmt_count
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
    fn sc1_flags_zero_capacity_only() {
        let mut u = UnitBuilder::new("u");
        u.channel("sync", Capacity::Zero, 5);
        u.channel("buffered", Capacity::Bounded(16), 6);
        u.channel("firehose", Capacity::Unbounded, 7);

        let cands = detect_sc1(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 5);
    }

    #[test]
    fn sc2_flags_short_rw_section() {
        let mut u = UnitBuilder::new("u");
        let b = u.binding("cache", true, crate::ir::TypeCategory::Compound, 1);
        let rw = u.lock("rw", LockKind::ReadWrite, &[b]);
        u.section_with(rw, 10, 4, false, false);

        let cands = detect_sc2(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 10);
    }

    #[test]
    fn sc2_spares_long_or_io_sections() {
        let mut u = UnitBuilder::new("u");
        let b = u.binding("cache", true, crate::ir::TypeCategory::Compound, 1);
        let rw = u.lock("rw", LockKind::ReadWrite, &[b]);
        u.section_with(rw, 10, 40, false, false);
        u.section_with(rw, 20, 4, true, false);
        u.section_with(rw, 30, 4, false, true);

        assert!(detect_sc2(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn sc2_ignores_exclusive_locks() {
        let mut u = UnitBuilder::new("u");
        let b = u.binding("cache", true, crate::ir::TypeCategory::Compound, 1);
        let mu = u.lock("mu", LockKind::Exclusive, &[b]);
        u.section_with(mu, 10, 2, false, false);
        assert!(detect_sc2(&u.build(), &cx()).unwrap().is_empty());
    }
}
