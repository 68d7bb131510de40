// src/ir/mod.rs
//! The intermediate representation: concurrency-relevant facts for one
//! compilation unit, extracted by an external front-end.
//!
//! Everything here is passive data. Detectors only ever read it; the few
//! methods on [`UnitIr`] are deterministic structural queries, so identical
//! IR always produces identical findings.

pub mod build;
pub mod cfg;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::RuleId;

use self::cfg::Cfg;

/// A reference into the IR that does not resolve. Detectors surface this
/// instead of panicking; the engine records it as an isolated internal
/// failure for the (unit, rule) pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dangling {entity} reference #{index}")]
pub struct IrError {
    pub entity: &'static str,
    pub index: u32,
}

macro_rules! ir_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            #[must_use]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

ir_id!(BindingId);
ir_id!(LockId);
ir_id!(SectionId);
ir_id!(FuncId);
ir_id!(TaskId);
ir_id!(ChannelId);
ir_id!(MapId);
ir_id!(TimerId);
ir_id!(InstantId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    Primitive,
    Compound,
    AtomicWrapper,
}

/// A named storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    pub mutable: bool,
    pub category: TypeCategory,
    pub scope: String,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockKind {
    Exclusive,
    ReadWrite,
}

/// A mutual-exclusion or read/write guard and the bindings it is declared
/// to protect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub name: String,
    pub kind: LockKind,
    pub protects: Vec<BindingId>,
}

/// A guarded region. Entry/exit points live in the owning function's CFG as
/// `LockEnter`/`LockExit` events; the fields here are the static body facts
/// Sc.2 needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalSection {
    pub lock: LockId,
    pub line: u32,
    pub stmt_count: u32,
    pub has_io: bool,
    pub has_unbounded_loop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureMode {
    ByRef,
    ByValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capture {
    pub binding: BindingId,
    pub mode: CaptureMode,
}

/// A unit of work runnable concurrently with others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub spawn_line: u32,
    pub body: FuncId,
    pub captures: Vec<Capture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capacity {
    Zero,
    Bounded(u32),
    Unbounded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub capacity: Capacity,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapOpKind {
    /// `miss_checked` records that the caller tested the result for absence.
    Load { miss_checked: bool },
    Store,
    Delete,
    LoadOrStore,
    LoadAndDelete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapOp {
    pub func: FuncId,
    pub line: u32,
    pub key: String,
    pub kind: MapOpKind,
}

/// A map offering atomic compound operations. Ops are kept in program
/// order per function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicMap {
    pub name: String,
    pub ops: Vec<MapOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerKind {
    OneShot,
    Repeating,
}

/// A recurring or one-shot alarm. Start and stop sites are CFG events in
/// the owning function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub name: String,
    pub kind: TimerKind,
    pub func: FuncId,
    pub line: u32,
}

/// How a time point came to lose (or keep) its monotonic reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Derivation {
    pub source: InstantId,
    pub transform: String,
}

/// A captured point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimePoint {
    pub name: String,
    pub monotonic: bool,
    pub line: u32,
    pub derived: Option<Derivation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Equals,
    Before,
    After,
}

/// A relational or equality check between two time points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub op: CompareOp,
    pub lhs: InstantId,
    pub rhs: InstantId,
    pub line: u32,
    /// Performed via the generic structural operator rather than the
    /// designated instant-equals operation.
    pub structural: bool,
    /// The result feeds a branch against a stored/persisted instant.
    pub against_persisted: bool,
}

/// An elapsed-duration computation over a captured time point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElapsedOp {
    pub instant: InstantId,
    pub line: u32,
}

/// A front-end surfaced marker: mark findings of `rule` (or all rules) at
/// this line as suppressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suppression {
    pub line: u32,
    pub rule: Option<RuleId>,
    pub justification: String,
}

/// One function: call edges, an optional handler-registration fact, and the
/// control-flow graph carrying access/lock/timer/exit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub line: u32,
    pub calls: Vec<FuncId>,
    /// Callee name of the registration call that installed this function as
    /// a request handler, if any (e.g. `router.handle`).
    pub registered_via: Option<String>,
    pub cfg: Cfg,
}

/// All concurrency-relevant facts for one compilation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitIr {
    pub name: String,
    pub bindings: Vec<Binding>,
    pub locks: Vec<Lock>,
    pub sections: Vec<CriticalSection>,
    pub functions: Vec<Function>,
    pub tasks: Vec<Task>,
    pub channels: Vec<Channel>,
    pub maps: Vec<AtomicMap>,
    pub timers: Vec<Timer>,
    pub instants: Vec<TimePoint>,
    pub comparisons: Vec<Comparison>,
    pub elapsed: Vec<ElapsedOp>,
    pub suppressions: Vec<Suppression>,
}

impl UnitIr {
    pub fn binding(&self, id: BindingId) -> Result<&Binding, IrError> {
        self.bindings.get(id.index()).ok_or(IrError {
            entity: "binding",
            index: id.0,
        })
    }

    pub fn lock(&self, id: LockId) -> Result<&Lock, IrError> {
        self.locks.get(id.index()).ok_or(IrError {
            entity: "lock",
            index: id.0,
        })
    }

    pub fn section(&self, id: SectionId) -> Result<&CriticalSection, IrError> {
        self.sections.get(id.index()).ok_or(IrError {
            entity: "section",
            index: id.0,
        })
    }

    pub fn function(&self, id: FuncId) -> Result<&Function, IrError> {
        self.functions.get(id.index()).ok_or(IrError {
            entity: "function",
            index: id.0,
        })
    }

    pub fn instant(&self, id: InstantId) -> Result<&TimePoint, IrError> {
        self.instants.get(id.index()).ok_or(IrError {
            entity: "instant",
            index: id.0,
        })
    }

    /// Does some lock in `held` protect `binding`?
    pub fn guarded_by_any(
        &self,
        held: &BTreeSet<SectionId>,
        binding: BindingId,
    ) -> Result<bool, IrError> {
        for &sec in held {
            let lock = self.lock(self.section(sec)?.lock)?;
            if lock.protects.contains(&binding) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Functions reachable from `entry` over call edges. Explicit worklist;
    /// cycles in the call graph are fine.
    pub fn reachable_funcs(&self, entry: FuncId) -> Result<BTreeSet<FuncId>, IrError> {
        let mut seen = BTreeSet::new();
        let mut work = vec![entry];
        while let Some(f) = work.pop() {
            if !seen.insert(f) {
                continue;
            }
            for &callee in &self.function(f)?.calls {
                if !seen.contains(&callee) {
                    work.push(callee);
                }
            }
        }
        Ok(seen)
    }

    /// Tasks whose body can reach `func`, in task order.
    pub fn tasks_reaching(&self, func: FuncId) -> Result<Vec<TaskId>, IrError> {
        let mut out = Vec::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if self.reachable_funcs(task.body)?.contains(&func) {
                out.push(TaskId(i as u32));
            }
        }
        Ok(out)
    }

    /// The suppression marker covering `rule` at `line`, if any. A marker
    /// with no rule id covers every rule.
    #[must_use]
    pub fn suppression_for(&self, line: u32, rule: RuleId) -> Option<&Suppression> {
        self.suppressions
            .iter()
            .find(|s| s.line == line && s.rule.map_or(true, |r| r == rule))
    }
}
