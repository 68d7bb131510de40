// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Only configuration problems abort a run; parse and
/// detector failures are contained and reported as diagnostics instead.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("unknown rule id `{0}` in catalog configuration")]
    UnknownRule(String),

    #[error("threshold `{name}` out of range: {value}")]
    Threshold { name: &'static str, value: u64 },

    #[error("invalid handler pattern `{pattern}`: {source}")]
    HandlerPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("malformed config document: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;

// Allow `?` on std::io::Error by converting to WardenError::Io with unknown path.
impl From<std::io::Error> for WardenError {
    fn from(source: std::io::Error) -> Self {
        WardenError::Io {
            source,
            path: PathBuf::from("<unknown>"),
        }
    }
}
