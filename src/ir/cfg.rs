// src/ir/cfg.rs
//! Per-function control-flow graphs and the shared worklist traversals.
//!
//! Everything here is iterative over an arena of indexed nodes. Back-edges
//! (loops) and joins are handled by fixpoint/visited-set logic, never by
//! recursion, so deep or cyclic graphs cannot blow the stack.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::{AccessKind, BindingId, IrError, SectionId, TimerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a function exit looks like; Tm.1 names this in its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    Return,
    ErrorPropagation,
    EndOfScope,
}

impl ExitKind {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Return => "return",
            Self::ErrorPropagation => "propagated failure",
            Self::EndOfScope => "end of scope",
        }
    }
}

/// What a returned value carries back to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReturnValue {
    pub binding: BindingId,
    /// True when the value shares identity with the binding rather than
    /// being a copy.
    pub aliased: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Nop,
    LockEnter(SectionId),
    LockExit(SectionId),
    Access { binding: BindingId, kind: AccessKind },
    TimerStart(TimerId),
    /// Covers both direct stop calls and stops registered with a
    /// guaranteed-run-on-exit mechanism.
    TimerStop(TimerId),
    FnExit { kind: ExitKind, value: Option<ReturnValue> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub line: u32,
    pub event: Event,
    pub succs: Vec<NodeId>,
}

/// Arena-style CFG. Node 0 is the entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cfg {
    pub nodes: Vec<CfgNode>,
}

impl Cfg {
    pub fn node(&self, id: NodeId) -> Result<&CfgNode, IrError> {
        self.nodes.get(id.index()).ok_or(IrError {
            entity: "cfg node",
            index: id.0,
        })
    }

    /// Node ids whose event satisfies `pred`, in arena order.
    pub fn find_nodes(&self, mut pred: impl FnMut(&Event) -> bool) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| pred(&n.event))
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }
}

/// Critical sections known to be held at each node on *every* path from the
/// entry — the dominance fact RC.1/RC.2/RC.3 consume.
///
/// Forward must-analysis: the incoming set of a node is the intersection of
/// its predecessors' outgoing sets; `LockEnter`/`LockExit` transfer. `None`
/// means the node is unreachable from the entry.
pub fn held_sections(cfg: &Cfg) -> Result<Vec<Option<BTreeSet<SectionId>>>, IrError> {
    let n = cfg.nodes.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    for node in &cfg.nodes {
        for succ in &node.succs {
            if succ.index() >= n {
                return Err(IrError {
                    entity: "cfg node",
                    index: succ.0,
                });
            }
        }
    }

    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, node) in cfg.nodes.iter().enumerate() {
        for succ in &node.succs {
            preds[succ.index()].push(i);
        }
    }

    let mut inset: Vec<Option<BTreeSet<SectionId>>> = vec![None; n];
    inset[0] = Some(BTreeSet::new());

    let mut work: VecDeque<usize> = VecDeque::new();
    work.push_back(0);
    while let Some(i) = work.pop_front() {
        let Some(current) = inset[i].clone() else {
            continue;
        };
        let out = transfer(&current, &cfg.nodes[i].event);
        for succ in &cfg.nodes[i].succs {
            let s = succ.index();
            let merged = match &inset[s] {
                None => out.clone(),
                Some(existing) => existing.intersection(&out).copied().collect(),
            };
            if inset[s].as_ref() != Some(&merged) {
                inset[s] = Some(merged);
                work.push_back(s);
            }
        }
    }

    Ok(inset)
}

fn transfer(held: &BTreeSet<SectionId>, event: &Event) -> BTreeSet<SectionId> {
    let mut out = held.clone();
    match event {
        Event::LockEnter(s) => {
            out.insert(*s);
        }
        Event::LockExit(s) => {
            out.remove(s);
        }
        _ => {}
    }
    out
}

/// Function exits reachable from `start` without passing a stop for
/// `timer`. Stop events are absorbing; a non-empty result is a Tm.1 leak.
pub fn exits_missing_stop(
    cfg: &Cfg,
    start: NodeId,
    timer: TimerId,
) -> Result<Vec<NodeId>, IrError> {
    let mut leaks = Vec::new();
    let mut seen = BTreeSet::new();
    let mut work = vec![start];
    while let Some(id) = work.pop() {
        if !seen.insert(id) {
            continue;
        }
        let node = cfg.node(id)?;
        if matches!(node.event, Event::TimerStop(t) if t == timer) {
            continue;
        }
        if matches!(node.event, Event::FnExit { .. }) {
            leaks.push(id);
            continue;
        }
        for &succ in &node.succs {
            if !seen.contains(&succ) {
                work.push(succ);
            }
        }
    }
    leaks.sort();
    Ok(leaks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(events: Vec<Event>) -> Cfg {
        let n = events.len();
        Cfg {
            nodes: events
                .into_iter()
                .enumerate()
                .map(|(i, event)| CfgNode {
                    line: i as u32 + 1,
                    event,
                    succs: if i + 1 < n {
                        vec![NodeId(i as u32 + 1)]
                    } else {
                        Vec::new()
                    },
                })
                .collect(),
        }
    }

    #[test]
    fn held_tracks_enter_and_exit() {
        let cfg = linear(vec![
            Event::Nop,
            Event::LockEnter(SectionId(0)),
            Event::Access {
                binding: BindingId(0),
                kind: AccessKind::Write,
            },
            Event::LockExit(SectionId(0)),
            Event::Access {
                binding: BindingId(0),
                kind: AccessKind::Read,
            },
        ]);
        let held = held_sections(&cfg).unwrap();
        assert!(held[2].as_ref().unwrap().contains(&SectionId(0)));
        assert!(held[4].as_ref().unwrap().is_empty());
    }

    #[test]
    fn held_meets_at_joins() {
        // Diamond: only one arm enters the lock, so the join holds nothing.
        let mut cfg = linear(vec![Event::Nop, Event::Nop, Event::Nop, Event::Nop]);
        cfg.nodes[0].succs = vec![NodeId(1), NodeId(2)];
        cfg.nodes[1].event = Event::LockEnter(SectionId(0));
        cfg.nodes[1].succs = vec![NodeId(3)];
        cfg.nodes[2].succs = vec![NodeId(3)];
        cfg.nodes[3].succs = Vec::new();

        let held = held_sections(&cfg).unwrap();
        assert!(held[3].as_ref().unwrap().is_empty());
    }

    #[test]
    fn held_reaches_fixpoint_on_loops() {
        // 0 -> 1 -> 2 -> 1 (back-edge), 2 -> 3
        let mut cfg = linear(vec![
            Event::LockEnter(SectionId(0)),
            Event::Nop,
            Event::Nop,
            Event::Nop,
        ]);
        cfg.nodes[2].succs = vec![NodeId(1), NodeId(3)];
        let held = held_sections(&cfg).unwrap();
        assert!(held[3].as_ref().unwrap().contains(&SectionId(0)));
    }

    #[test]
    fn unreachable_nodes_stay_none() {
        let mut cfg = linear(vec![Event::Nop, Event::Nop]);
        cfg.nodes[0].succs = Vec::new();
        let held = held_sections(&cfg).unwrap();
        assert!(held[1].is_none());
    }

    #[test]
    fn dangling_successor_is_an_error() {
        let mut cfg = linear(vec![Event::Nop]);
        cfg.nodes[0].succs = vec![NodeId(7)];
        assert!(held_sections(&cfg).is_err());
    }

    #[test]
    fn stop_on_every_path_means_no_leak() {
        let cfg = linear(vec![
            Event::TimerStart(TimerId(0)),
            Event::TimerStop(TimerId(0)),
            Event::FnExit {
                kind: ExitKind::Return,
                value: None,
            },
        ]);
        let leaks = exits_missing_stop(&cfg, NodeId(0), TimerId(0)).unwrap();
        assert!(leaks.is_empty());
    }

    #[test]
    fn early_return_without_stop_leaks() {
        // start -> branch: early return | stop -> return
        let mut cfg = linear(vec![
            Event::TimerStart(TimerId(0)),
            Event::Nop,
            Event::FnExit {
                kind: ExitKind::Return,
                value: None,
            },
            Event::TimerStop(TimerId(0)),
            Event::FnExit {
                kind: ExitKind::Return,
                value: None,
            },
        ]);
        cfg.nodes[1].succs = vec![NodeId(2), NodeId(3)];
        cfg.nodes[3].succs = vec![NodeId(4)];
        let leaks = exits_missing_stop(&cfg, NodeId(0), TimerId(0)).unwrap();
        assert_eq!(leaks, vec![NodeId(2)]);
    }
}
