//! racewarden — a heuristic concurrency-hazard rule engine.
//!
//! A front-end builds one [`ir::UnitIr`] per compilation unit; the
//! [`engine::Engine`] runs the fixed [`catalog`] of detectors over it and
//! emits an ordered, suppressible stream of [`types::Diagnostic`]s.

pub mod catalog;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod ir;
pub mod types;

pub use engine::{CancelToken, Engine};
pub use error::{Result, WardenError};
pub use types::{Diagnostic, RunOutcome, RunReport};
