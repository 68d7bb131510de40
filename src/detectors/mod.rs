// src/detectors/mod.rs
//! The detectors: one pure pattern match per rule, no state, no output
//! ordering requirements (the engine sorts the merged stream).
//!
//! Every detector has the same shape: `fn(&UnitIr, &RuleCx) ->
//! Result<Vec<Candidate>, IrError>`. An `Err` means the IR itself was
//! malformed for that rule's traversal; the engine isolates it to the
//! (unit, rule) pair.

pub mod atomic_map;
pub mod races;
pub mod scalability;
pub mod time;
pub mod timers;

use regex::Regex;

use crate::ir::{IrError, UnitIr};
use crate::types::Candidate;

/// Resolved per-run knobs the detectors read. Built once by the engine from
/// the validated configuration.
#[derive(Debug)]
pub struct RuleCx {
    /// Sc.2: sections below this many statements count as "short".
    pub short_section_stmts: u32,
    /// RC.1: registration callee names matching any of these are handlers.
    pub handler_patterns: Vec<Regex>,
}

impl RuleCx {
    #[must_use]
    pub fn is_handler_registration(&self, callee: &str) -> bool {
        self.handler_patterns.iter().any(|re| re.is_match(callee))
    }
}

pub type DetectorFn = fn(&UnitIr, &RuleCx) -> Result<Vec<Candidate>, IrError>;
