// src/detectors/races.rs
//! RC.1/RC.2/RC.3: shared-state race rules.
//!
//! All three consume the same dominance fact: the set of critical sections
//! held on every path to a CFG node (`ir::cfg::held_sections`). An access is
//! guarded only if one of those sections' locks is declared to protect the
//! accessed binding.

use std::collections::BTreeSet;

use crate::ir::cfg::{self, Event};
use crate::ir::{AccessKind, BindingId, FuncId, IrError, TypeCategory, UnitIr};
use crate::types::{Candidate, RuleId};

use super::RuleCx;

struct AccessSite {
    func: FuncId,
    line: u32,
    binding: BindingId,
    kind: AccessKind,
    guarded: bool,
}

fn collect_accesses(ir: &UnitIr) -> Result<Vec<AccessSite>, IrError> {
    let mut out = Vec::new();
    for (fi, f) in ir.functions.iter().enumerate() {
        let held = cfg::held_sections(&f.cfg)?;
        for (ni, node) in f.cfg.nodes.iter().enumerate() {
            if let Event::Access { binding, kind } = node.event {
                // Unreachable nodes carry no dominance fact; skip them.
                let Some(h) = &held[ni] else { continue };
                out.push(AccessSite {
                    func: FuncId(fi as u32),
                    line: node.line,
                    binding,
                    kind,
                    guarded: ir.guarded_by_any(h, binding)?,
                });
            }
        }
    }
    Ok(out)
}

fn task_reach(ir: &UnitIr) -> Result<Vec<BTreeSet<FuncId>>, IrError> {
    ir.tasks
        .iter()
        .map(|t| ir.reachable_funcs(t.body))
        .collect()
}

const fn verb(kind: AccessKind) -> &'static str {
    match kind {
        AccessKind::Read => "read",
        AccessKind::Write => "write",
    }
}

/// RC.2: a mutable, non-atomic binding touched by two or more concurrent
/// tasks must be guarded at every access site. One finding per unguarded
/// site.
pub fn detect_rc2(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let sites = collect_accesses(ir)?;
    let reach = task_reach(ir)?;

    let mut out = Vec::new();
    for (bi, b) in ir.bindings.iter().enumerate() {
        if !b.mutable || b.category == TypeCategory::AtomicWrapper {
            continue;
        }
        let bid = BindingId(bi as u32);
        let bsites: Vec<&AccessSite> = sites.iter().filter(|s| s.binding == bid).collect();

        let touching: BTreeSet<usize> = reach
            .iter()
            .enumerate()
            .filter(|(_, r)| bsites.iter().any(|s| r.contains(&s.func)))
            .map(|(ti, _)| ti)
            .collect();
        if touching.len() < 2 {
            continue;
        }

        for s in &bsites {
            let concurrent = reach.iter().any(|r| r.contains(&s.func));
            if concurrent && !s.guarded {
                out.push(Candidate::new(
                    RuleId::Rc2,
                    s.line,
                    format!(
                        "unguarded {} of `{}`, shared by {} concurrent tasks; \
                         hold the protecting lock at every access",
                        verb(s.kind),
                        b.name,
                        touching.len()
                    ),
                ));
            }
        }
    }
    Ok(out)
}

/// RC.1: a registered request handler touching mutable state that another
/// handler or background task also touches, outside any critical section.
pub fn detect_rc1(ir: &UnitIr, cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let sites = collect_accesses(ir)?;
    let reach = task_reach(ir)?;

    let handlers: Vec<FuncId> = ir
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| {
            f.registered_via
                .as_deref()
                .is_some_and(|callee| cx.is_handler_registration(callee))
        })
        .map(|(i, _)| FuncId(i as u32))
        .collect();

    let mut flagged: BTreeSet<(u32, BindingId)> = BTreeSet::new();
    let mut out = Vec::new();

    for &h in &handlers {
        let hreach = ir.reachable_funcs(h)?;
        for s in sites.iter().filter(|s| hreach.contains(&s.func)) {
            if s.guarded {
                continue;
            }
            let b = ir.binding(s.binding)?;
            if !b.mutable || b.category == TypeCategory::AtomicWrapper {
                continue;
            }

            let mut shared = reach.iter().any(|r| {
                sites
                    .iter()
                    .any(|o| o.binding == s.binding && r.contains(&o.func))
            });
            if !shared {
                for &other in &handlers {
                    if other == h {
                        continue;
                    }
                    let oreach = ir.reachable_funcs(other)?;
                    if sites
                        .iter()
                        .any(|o| o.binding == s.binding && oreach.contains(&o.func))
                    {
                        shared = true;
                        break;
                    }
                }
            }
            if !shared {
                continue;
            }

            if flagged.insert((s.line, s.binding)) {
                let handler_name = &ir.function(h)?.name;
                out.push(Candidate::new(
                    RuleId::Rc1,
                    s.line,
                    format!(
                        "handler `{}` accesses shared mutable `{}` without a critical section",
                        handler_name, b.name
                    ),
                ));
            }
        }
    }
    Ok(out)
}

/// RC.3: an accessor running under a critical section must not return an
/// alias of a compound binding that section protects — the guarantee ends
/// at the region boundary.
pub fn detect_rc3(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for f in &ir.functions {
        let held = cfg::held_sections(&f.cfg)?;
        for (ni, node) in f.cfg.nodes.iter().enumerate() {
            let Event::FnExit {
                value: Some(rv), ..
            } = node.event
            else {
                continue;
            };
            if !rv.aliased {
                continue;
            }
            let Some(h) = &held[ni] else { continue };
            let b = ir.binding(rv.binding)?;
            if b.category == TypeCategory::Compound && ir.guarded_by_any(h, rv.binding)? {
                out.push(Candidate::new(
                    RuleId::Rc3,
                    node.line,
                    format!(
                        "accessor `{}` returns an alias of protected `{}`; \
                         return a copy or a value type",
                        f.name, b.name
                    ),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::UnitBuilder;
    use crate::ir::cfg::{Event, ExitKind, ReturnValue};
    use crate::ir::{LockKind, TypeCategory};

    fn cx() -> RuleCx {
        RuleCx {
            short_section_stmts: 12,
            handler_patterns: vec![regex::Regex::new("(?i)handle").unwrap()],
        }
    }

    #[test]
    fn rc2_flags_each_unguarded_site() {
        let mut u = UnitBuilder::new("u");
        let counter = u.binding("counter", true, TypeCategory::Primitive, 3);
        let f1 = u.function("writer", 10);
        u.node(
            f1,
            Event::Access {
                binding: counter,
                kind: AccessKind::Write,
            },
            11,
        );
        let f2 = u.function("reader", 20);
        u.node(
            f2,
            Event::Access {
                binding: counter,
                kind: AccessKind::Read,
            },
            21,
        );
        u.task(5, f1, Vec::new());
        u.task(6, f2, Vec::new());

        let cands = detect_rc2(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 2);
        let lines: Vec<u32> = cands.iter().map(|c| c.line).collect();
        assert!(lines.contains(&11) && lines.contains(&21));
    }

    #[test]
    fn rc2_silent_when_both_sites_guarded() {
        let mut u = UnitBuilder::new("u");
        let counter = u.binding("counter", true, TypeCategory::Primitive, 3);
        let lock = u.lock("mu", LockKind::Exclusive, &[counter]);

        for (name, line) in [("writer", 10), ("reader", 20)] {
            let f = u.function(name, line);
            let sec = u.section(lock, line + 1);
            u.node(f, Event::LockEnter(sec), line + 1);
            u.node(
                f,
                Event::Access {
                    binding: counter,
                    kind: AccessKind::Write,
                },
                line + 2,
            );
            u.node(f, Event::LockExit(sec), line + 3);
            u.task(line, f, Vec::new());
        }

        let cands = detect_rc2(&u.build(), &cx()).unwrap();
        assert!(cands.is_empty());
    }

    #[test]
    fn rc2_ignores_atomic_wrappers() {
        let mut u = UnitBuilder::new("u");
        let hits = u.binding("hits", true, TypeCategory::AtomicWrapper, 3);
        let f1 = u.function("a", 10);
        u.node(
            f1,
            Event::Access {
                binding: hits,
                kind: AccessKind::Write,
            },
            11,
        );
        let f2 = u.function("b", 20);
        u.node(
            f2,
            Event::Access {
                binding: hits,
                kind: AccessKind::Write,
            },
            21,
        );
        u.task(5, f1, Vec::new());
        u.task(6, f2, Vec::new());
        assert!(detect_rc2(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn rc1_flags_handler_sharing_with_task() {
        let mut u = UnitBuilder::new("u");
        let state = u.binding("sessions", true, TypeCategory::Compound, 2);
        let h = u.function("serve_login", 10);
        u.registered(h, "router.handle_func");
        u.node(
            h,
            Event::Access {
                binding: state,
                kind: AccessKind::Write,
            },
            12,
        );
        let bg = u.function("sweeper", 30);
        u.node(
            bg,
            Event::Access {
                binding: state,
                kind: AccessKind::Write,
            },
            31,
        );
        u.task(29, bg, Vec::new());

        let cands = detect_rc1(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 12);
    }

    #[test]
    fn rc1_ignores_unregistered_functions() {
        let mut u = UnitBuilder::new("u");
        let state = u.binding("sessions", true, TypeCategory::Compound, 2);
        let f = u.function("helper", 10);
        u.node(
            f,
            Event::Access {
                binding: state,
                kind: AccessKind::Write,
            },
            12,
        );
        let bg = u.function("sweeper", 30);
        u.node(
            bg,
            Event::Access {
                binding: state,
                kind: AccessKind::Write,
            },
            31,
        );
        u.task(29, bg, Vec::new());
        assert!(detect_rc1(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn rc3_flags_aliased_return_of_protected_compound() {
        let mut u = UnitBuilder::new("u");
        let table = u.binding("table", true, TypeCategory::Compound, 2);
        let lock = u.lock("mu", LockKind::Exclusive, &[table]);
        let f = u.function("get_table", 10);
        let sec = u.section(lock, 11);
        u.node(f, Event::LockEnter(sec), 11);
        u.node(
            f,
            Event::FnExit {
                kind: ExitKind::Return,
                value: Some(ReturnValue {
                    binding: table,
                    aliased: true,
                }),
            },
            13,
        );

        let cands = detect_rc3(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 13);
    }

    #[test]
    fn rc3_silent_when_returning_a_copy() {
        let mut u = UnitBuilder::new("u");
        let table = u.binding("table", true, TypeCategory::Compound, 2);
        let lock = u.lock("mu", LockKind::Exclusive, &[table]);
        let f = u.function("get_table", 10);
        let sec = u.section(lock, 11);
        u.node(f, Event::LockEnter(sec), 11);
        u.node(
            f,
            Event::FnExit {
                kind: ExitKind::Return,
                value: Some(ReturnValue {
                    binding: table,
                    aliased: false,
                }),
            },
            13,
        );
        assert!(detect_rc3(&u.build(), &cx()).unwrap().is_empty());
    }
}
