// src/ir/build.rs
//! Programmatic construction of [`UnitIr`] values.
//!
//! Parsing real source into IR is a front-end concern; this module only
//! fixes the contract ([`Frontend`]) and provides the builder the tests and
//! front-ends assemble units with.

use serde::{Deserialize, Serialize};

use crate::types::RuleId;

use super::cfg::{Cfg, CfgNode, Event, NodeId};
use super::{
    AtomicMap, Binding, BindingId, Capacity, Capture, Channel, ChannelId, Comparison, CompareOp,
    CriticalSection, Derivation, ElapsedOp, FuncId, Function, InstantId, Lock, LockId, LockKind,
    MapId, MapOp, MapOpKind, SectionId, Suppression, Task, TaskId, TimePoint, Timer, TimerId,
    TimerKind, TypeCategory, UnitIr,
};

/// The front-end could not produce an IR for a unit. Recorded as a
/// unit-level diagnostic; never aborts the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFailure {
    pub unit: String,
    pub message: String,
}

/// Outcome of building one compilation unit.
pub type BuildOutcome = Result<UnitIr, ParseFailure>;

/// Contract for external IR builders: one unit in, an IR or a recorded
/// failure out. The engine never sees source text.
pub trait Frontend {
    fn build(&self, unit: &str) -> BuildOutcome;
}

/// Fluent constructor for one unit's IR.
///
/// CFG nodes added with [`UnitBuilder::node`] chain linearly from the
/// previous node of the same function; use [`UnitBuilder::node_from`] and
/// [`UnitBuilder::edge`] for branches and loops.
#[derive(Debug)]
pub struct UnitBuilder {
    ir: UnitIr,
    cursors: Vec<NodeId>,
}

impl UnitBuilder {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            ir: UnitIr {
                name: name.to_string(),
                bindings: Vec::new(),
                locks: Vec::new(),
                sections: Vec::new(),
                functions: Vec::new(),
                tasks: Vec::new(),
                channels: Vec::new(),
                maps: Vec::new(),
                timers: Vec::new(),
                instants: Vec::new(),
                comparisons: Vec::new(),
                elapsed: Vec::new(),
                suppressions: Vec::new(),
            },
            cursors: Vec::new(),
        }
    }

    pub fn binding(
        &mut self,
        name: &str,
        mutable: bool,
        category: TypeCategory,
        line: u32,
    ) -> BindingId {
        self.ir.bindings.push(Binding {
            name: name.to_string(),
            mutable,
            category,
            scope: String::from("unit"),
            line,
        });
        BindingId(self.ir.bindings.len() as u32 - 1)
    }

    pub fn lock(&mut self, name: &str, kind: LockKind, protects: &[BindingId]) -> LockId {
        self.ir.locks.push(Lock {
            name: name.to_string(),
            kind,
            protects: protects.to_vec(),
        });
        LockId(self.ir.locks.len() as u32 - 1)
    }

    pub fn section(&mut self, lock: LockId, line: u32) -> SectionId {
        self.section_with(lock, line, 3, false, false)
    }

    pub fn section_with(
        &mut self,
        lock: LockId,
        line: u32,
        stmt_count: u32,
        has_io: bool,
        has_unbounded_loop: bool,
    ) -> SectionId {
        self.ir.sections.push(CriticalSection {
            lock,
            line,
            stmt_count,
            has_io,
            has_unbounded_loop,
        });
        SectionId(self.ir.sections.len() as u32 - 1)
    }

    /// Adds a function with an entry node at its declaration line.
    pub fn function(&mut self, name: &str, line: u32) -> FuncId {
        self.ir.functions.push(Function {
            name: name.to_string(),
            line,
            calls: Vec::new(),
            registered_via: None,
            cfg: Cfg {
                nodes: vec![CfgNode {
                    line,
                    event: Event::Nop,
                    succs: Vec::new(),
                }],
            },
        });
        self.cursors.push(NodeId(0));
        FuncId(self.ir.functions.len() as u32 - 1)
    }

    fn check_func(&self, func: FuncId) {
        debug_assert!(
            func.index() < self.ir.functions.len(),
            "stale FuncId #{}",
            func.0
        );
    }

    fn check_node(cfg: &Cfg, node: NodeId) {
        debug_assert!(
            node.index() < cfg.nodes.len(),
            "stale NodeId #{}",
            node.0
        );
    }

    /// Marks `func` as installed via a handler-registration call.
    pub fn registered(&mut self, func: FuncId, callee: &str) {
        self.check_func(func);
        self.ir.functions[func.index()].registered_via = Some(callee.to_string());
    }

    pub fn call(&mut self, caller: FuncId, callee: FuncId) {
        self.check_func(caller);
        self.check_func(callee);
        self.ir.functions[caller.index()].calls.push(callee);
    }

    /// Appends a node chained from the function's current cursor.
    pub fn node(&mut self, func: FuncId, event: Event, line: u32) -> NodeId {
        self.check_func(func);
        let from = self.cursors[func.index()];
        self.node_from(func, from, event, line)
    }

    /// Appends a node chained from an explicit predecessor (branch arms).
    pub fn node_from(&mut self, func: FuncId, from: NodeId, event: Event, line: u32) -> NodeId {
        self.check_func(func);
        let cfg = &mut self.ir.functions[func.index()].cfg;
        Self::check_node(cfg, from);
        cfg.nodes.push(CfgNode {
            line,
            event,
            succs: Vec::new(),
        });
        let id = NodeId(cfg.nodes.len() as u32 - 1);
        cfg.nodes[from.index()].succs.push(id);
        self.cursors[func.index()] = id;
        id
    }

    /// Adds an extra edge (joins, back-edges).
    pub fn edge(&mut self, func: FuncId, from: NodeId, to: NodeId) {
        self.check_func(func);
        let cfg = &mut self.ir.functions[func.index()].cfg;
        Self::check_node(cfg, from);
        Self::check_node(cfg, to);
        cfg.nodes[from.index()].succs.push(to);
    }

    pub fn task(&mut self, spawn_line: u32, body: FuncId, captures: Vec<Capture>) -> TaskId {
        self.check_func(body);
        self.ir.tasks.push(Task {
            spawn_line,
            body,
            captures,
        });
        TaskId(self.ir.tasks.len() as u32 - 1)
    }

    pub fn channel(&mut self, name: &str, capacity: Capacity, line: u32) -> ChannelId {
        self.ir.channels.push(Channel {
            name: name.to_string(),
            capacity,
            line,
        });
        ChannelId(self.ir.channels.len() as u32 - 1)
    }

    pub fn map(&mut self, name: &str) -> MapId {
        self.ir.maps.push(AtomicMap {
            name: name.to_string(),
            ops: Vec::new(),
        });
        MapId(self.ir.maps.len() as u32 - 1)
    }

    pub fn map_op(&mut self, map: MapId, func: FuncId, key: &str, kind: MapOpKind, line: u32) {
        debug_assert!(map.index() < self.ir.maps.len(), "stale MapId #{}", map.0);
        self.check_func(func);
        self.ir.maps[map.index()].ops.push(MapOp {
            func,
            line,
            key: key.to_string(),
            kind,
        });
    }

    /// Adds a timer and its start event at the function's cursor.
    pub fn timer(&mut self, name: &str, kind: TimerKind, func: FuncId, line: u32) -> TimerId {
        self.ir.timers.push(Timer {
            name: name.to_string(),
            kind,
            func,
            line,
        });
        let id = TimerId(self.ir.timers.len() as u32 - 1);
        self.node(func, Event::TimerStart(id), line);
        id
    }

    pub fn instant(&mut self, name: &str, monotonic: bool, line: u32) -> InstantId {
        self.ir.instants.push(TimePoint {
            name: name.to_string(),
            monotonic,
            line,
            derived: None,
        });
        InstantId(self.ir.instants.len() as u32 - 1)
    }

    /// A time point derived from another by a monotonic-stripping (or
    /// preserving) transformation.
    pub fn derived_instant(
        &mut self,
        name: &str,
        source: InstantId,
        transform: &str,
        monotonic: bool,
        line: u32,
    ) -> InstantId {
        self.ir.instants.push(TimePoint {
            name: name.to_string(),
            monotonic,
            line,
            derived: Some(Derivation {
                source,
                transform: transform.to_string(),
            }),
        });
        InstantId(self.ir.instants.len() as u32 - 1)
    }

    pub fn comparison(
        &mut self,
        op: CompareOp,
        lhs: InstantId,
        rhs: InstantId,
        line: u32,
        structural: bool,
        against_persisted: bool,
    ) {
        self.ir.comparisons.push(Comparison {
            op,
            lhs,
            rhs,
            line,
            structural,
            against_persisted,
        });
    }

    pub fn elapsed(&mut self, instant: InstantId, line: u32) {
        self.ir.elapsed.push(ElapsedOp { instant, line });
    }

    pub fn suppress(&mut self, line: u32, rule: Option<RuleId>, justification: &str) {
        self.ir.suppressions.push(Suppression {
            line,
            rule,
            justification: justification.to_string(),
        });
    }

    #[must_use]
    pub fn build(self) -> UnitIr {
        self.ir
    }
}
