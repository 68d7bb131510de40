// src/detectors/atomic_map.rs
//! RC.4: check-then-act on a concurrent map.
//!
//! A `Load(k)` whose miss is tested, followed by a conditional `Store(k)`,
//! is racy when the enclosing function runs from two or more tasks: another
//! task can store between the load and the store. The atomic `LoadOrStore`
//! primitive exists for exactly this; using it anywhere in the function for
//! that key clears the pattern.

use crate::ir::{IrError, MapOpKind, UnitIr};
use crate::types::{Candidate, RuleId};

use super::RuleCx;

pub fn detect_rc4(ir: &UnitIr, _cx: &RuleCx) -> Result<Vec<Candidate>, IrError> {
    let mut out = Vec::new();
    for map in &ir.maps {
        // Distinct functions touching this map, in first-op order.
        let mut funcs = Vec::new();
        for op in &map.ops {
            if !funcs.contains(&op.func) {
                funcs.push(op.func);
            }
        }

        for func in funcs {
            if ir.tasks_reaching(func)?.len() < 2 {
                continue;
            }
            let ops: Vec<_> = map.ops.iter().filter(|o| o.func == func).collect();

            for (i, store) in ops.iter().enumerate() {
                if store.kind != MapOpKind::Store {
                    continue;
                }
                let atomic_used = ops.iter().any(|o| {
                    o.key == store.key
                        && matches!(o.kind, MapOpKind::LoadOrStore | MapOpKind::LoadAndDelete)
                });
                if atomic_used {
                    continue;
                }
                let miss_checked_load = ops[..i].iter().any(|o| {
                    o.key == store.key && o.kind == (MapOpKind::Load { miss_checked: true })
                });
                if miss_checked_load {
                    out.push(Candidate::new(
                        RuleId::Rc4,
                        store.line,
                        format!(
                            "load-then-store race on key `{}` of `{}`; \
                             use LoadOrStore for an atomic check-then-act",
                            store.key, map.name
                        ),
                    ));
                }
            }
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

    fn two_task_unit() -> (UnitBuilder, crate::ir::FuncId, crate::ir::MapId) {
        let mut u = UnitBuilder::new("u");
        let f = u.function("ensure_entry", 10);
        u.task(3, f, Vec::new());
        u.task(4, f, Vec::new());
        let m = u.map("registry");
        (u, f, m)
    }

    #[test]
    fn rc4_flags_load_miss_then_store() {
        let (mut u, f, m) = two_task_unit();
        u.map_op(m, f, "cfg", MapOpKind::Load { miss_checked: true }, 11);
        u.map_op(m, f, "cfg", MapOpKind::Store, 13);

        let cands = detect_rc4(&u.build(), &cx()).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].line, 13, "finding points at the store site");
    }

    #[test]
    fn rc4_silent_with_load_or_store() {
        let (mut u, f, m) = two_task_unit();
        u.map_op(m, f, "cfg", MapOpKind::LoadOrStore, 11);
        assert!(detect_rc4(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn rc4_silent_when_single_task() {
        let mut u = UnitBuilder::new("u");
        let f = u.function("ensure_entry", 10);
        u.task(3, f, Vec::new());
        let m = u.map("registry");
        u.map_op(m, f, "cfg", MapOpKind::Load { miss_checked: true }, 11);
        u.map_op(m, f, "cfg", MapOpKind::Store, 13);
        assert!(detect_rc4(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn rc4_silent_when_miss_not_checked() {
        let (mut u, f, m) = two_task_unit();
        u.map_op(m, f, "cfg", MapOpKind::Load { miss_checked: false }, 11);
        u.map_op(m, f, "cfg", MapOpKind::Store, 13);
        assert!(detect_rc4(&u.build(), &cx()).unwrap().is_empty());
    }

    #[test]
    fn rc4_keys_must_match() {
        let (mut u, f, m) = two_task_unit();
        u.map_op(m, f, "a", MapOpKind::Load { miss_checked: true }, 11);
        u.map_op(m, f, "b", MapOpKind::Store, 13);
        assert!(detect_rc4(&u.build(), &cx()).unwrap().is_empty());
    }
}
