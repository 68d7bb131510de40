// src/types.rs
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a rule in the catalog, plus the two engine-reserved ids
/// (`ingest` for front-end failures, `internal` for contained engine faults).
///
/// The derived `Ord` gives the tie-break order of the diagnostic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "RC.1")]
    Rc1,
    #[serde(rename = "RC.2")]
    Rc2,
    #[serde(rename = "RC.3")]
    Rc3,
    #[serde(rename = "RC.4")]
    Rc4,
    #[serde(rename = "Sc.1")]
    Sc1,
    #[serde(rename = "Sc.2")]
    Sc2,
    #[serde(rename = "Tm.1")]
    Tm1,
    #[serde(rename = "Tm.2")]
    Tm2,
    #[serde(rename = "Tm.3")]
    Tm3,
    #[serde(rename = "Tm.4")]
    Tm4,
    #[serde(rename = "ingest")]
    Ingest,
    #[serde(rename = "internal")]
    Internal,
}

impl RuleId {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rc1 => "RC.1",
            Self::Rc2 => "RC.2",
            Self::Rc3 => "RC.3",
            Self::Rc4 => "RC.4",
            Self::Sc1 => "Sc.1",
            Self::Sc2 => "Sc.2",
            Self::Tm1 => "Tm.1",
            Self::Tm2 => "Tm.2",
            Self::Tm3 => "Tm.3",
            Self::Tm4 => "Tm.4",
            Self::Ingest => "ingest",
            Self::Internal => "internal",
        }
    }

    /// Parses a rule id as it appears in configuration keys.
    /// The reserved ids are not parseable: they cannot be configured.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RC.1" => Some(Self::Rc1),
            "RC.2" => Some(Self::Rc2),
            "RC.3" => Some(Self::Rc3),
            "RC.4" => Some(Self::Rc4),
            "Sc.1" => Some(Self::Sc1),
            "Sc.2" => Some(Self::Sc2),
            "Tm.1" => Some(Self::Tm1),
            "Tm.2" => Some(Self::Tm2),
            "Tm.3" => Some(Self::Tm3),
            "Tm.4" => Some(Self::Tm4),
            _ => None,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Where a finding points: compilation unit plus 1-based line.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub unit: String,
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.line)
    }
}

/// Raw detector output. Severity and confidence are resolved later by the
/// engine from the catalog defaults plus configuration overrides.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub rule: RuleId,
    pub line: u32,
    pub message: String,
}

impl Candidate {
    #[must_use]
    pub fn new(rule: RuleId, line: u32, message: String) -> Self {
        Self { rule, line, message }
    }
}

/// A finding, ready for a reporter. Suppressed findings stay in the stream
/// with `suppressed = true`; they are never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule: RuleId,
    pub severity: Severity,
    pub confidence: Confidence,
    pub location: Location,
    pub message: String,
    pub suppressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression_note: Option<String>,
}

/// Overall verdict of one engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Clean,
    Findings,
    EngineError,
}

/// Aggregated results of one engine run over a set of units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub diagnostics: Vec<Diagnostic>,
    pub outcome: RunOutcome,
    pub duration_ms: u128,
    /// Units over which at least one detector ran. Failed or
    /// cancellation-skipped units are not counted.
    pub units_analyzed: usize,
    pub units_failed: usize,
    pub skipped_pairs: usize,
}

impl RunReport {
    /// Returns true if nothing actionable was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.outcome == RunOutcome::Clean
    }

    /// Findings a reporter would surface by default.
    #[must_use]
    pub fn unsuppressed(&self) -> impl Iterator<Item = &Diagnostic> + '_ {
        self.diagnostics.iter().filter(|d| !d.suppressed)
    }

    #[must_use]
    pub fn unsuppressed_count(&self) -> usize {
        self.unsuppressed().count()
    }
}
