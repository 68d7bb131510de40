// src/detectors/timers.rs
//! Tm.1: repeating timers that can leak.
//!
//! A repeating timer keeps its callback and captures alive until stopped.
//! The rule walks the creation scope's CFG from the start event: any
//! function exit reachable without passing a stop for that timer is an
//! escape hatch that leaks it.

use crate::ir::cfg::{self, Event};
use crate::ir::{IrError, TimerKind, UnitIr};
use crate::types::{Candidate, RuleId};

use super::RuleCx;

pub fn detect_tm1(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for (ti, timer) in ir.timers.iter().enumerate() {
        if timer.kind != TimerKind::Repeating {
            continue;
        }
        let func = ir.function(timer.func)?;
        let starts = func
            .cfg
            .find_nodes(|e| matches!(e, Event::TimerStart(t) if t.index() == ti));

        for start in starts {
            let leaks = cfg::exits_missing_stop(
                &func.cfg,
                start,
                crate::ir::TimerId(ti as u32),
            )?;
            if leaks.is_empty() {
                continue;
            }
            let mut exits = Vec::new();
            for id in leaks {
                let node = func.cfg.node(id)?;
                if let Event::FnExit { kind, .. } = node.event {
                    exits.push(format!("{} at line {}", kind.describe(), node.line));
                }
            }
            out.push(Candidate::new(
                RuleId::Tm1,
                timer.line,
                format!(
                    "repeating timer `{}` is not stopped on every exit of `{}` ({})",
                    timer.name,
                    func.name,
                    exits.join(", ")
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
    use crate::ir::cfg::{Event, ExitKind};
    use crate::ir::TimerId;

    fn cx() -> RuleCx {
        RuleCx {
            short_section_stmts: 12,
            handler_patterns: Vec::new(),
        }
    }

    fn exit(kind: ExitKind) -> Event {
        Event::FnExit { kind, value: None }
    }

    #[test]
    fn tm1_names_the_unstopped_early_return() {
        let mut u = UnitBuilder::new("u");
        let f = u.function("poll_loop", 10);
        let t = u.timer("ticker", TimerKind::Repeating, f, 11);
        let branch = u.node(f, Event::Nop, 12);
        u.node(f, exit(ExitKind::Return), 13); // early return, no stop
        let stop = u.node_from(f, branch, Event::TimerStop(t), 15);
        u.node_from(f, stop, exit(ExitKind::Return), 16);

        let cands = detect_tm1(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 11, "flagged at the creation site");
        assert!(
            cands[0].message.contains("line 13"),
            "message names the leaking exit: {}",
            cands[0].message
        );
    }

    #[test]
    fn tm1_silent_when_stop_guards_every_exit() {
        let mut u = UnitBuilder::new("u");
        let f = u.function("poll_loop", 10);
        let t = u.timer("ticker", TimerKind::Repeating, f, 11);
        // Stop registered right after creation covers all later exits,
        // the shape a run-on-exit mechanism lowers to.
        u.node(f, Event::TimerStop(t), 12);
        let branch = u.node(f, Event::Nop, 13);
        u.node(f, exit(ExitKind::Return), 14);
        u.node_from(f, branch, exit(ExitKind::EndOfScope), 18);

        assert!(detect_tm1(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn tm1_ignores_one_shot_timers() {
        let mut u = UnitBuilder::new("u");
        let f = u.function("delay", 10);
        u.timer("alarm", TimerKind::OneShot, f, 11);
        u.node(f, exit(ExitKind::Return), 12);
        assert!(detect_tm1(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn tm1_flags_propagated_failure_paths() {
        let mut u = UnitBuilder::new("u");
        let f = u.function("poll_loop", 10);
        let t = u.timer("ticker", TimerKind::Repeating, f, 11);
        let branch = u.node(f, Event::Nop, 12);
        u.node(f, exit(ExitKind::ErrorPropagation), 13);
        let stop = u.node_from(f, branch, Event::TimerStop(t), 15);
        u.node_from(f, stop, exit(ExitKind::Return), 16);

        let cands = detect_tm1(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert!(cands[0].message.contains("propagated failure"));
    }
}
