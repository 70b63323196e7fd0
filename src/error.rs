//! Typed engine errors.
//!
//! Every error belongs to one [`ErrorCategory`]; the category decides whether
//! the caller may retry the directive, must regenerate a queue, or has to stop.

use std::path::PathBuf;

use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad template, mode, weight table or dependency graph. Nothing was created.
    Configuration,
    /// Rejected transition. State is unchanged and the caller may retry.
    Transition,
    /// The queue expired and has to be regenerated.
    StaleQueue,
    /// A read or write failed. The logical state did not advance.
    Persistence,
    /// The referenced instance does not exist.
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Transition => write!(f, "transition"),
            ErrorCategory::StaleQueue => write!(f, "stale-queue"),
            ErrorCategory::Persistence => write!(f, "persistence"),
            ErrorCategory::NotFound => write!(f, "not-found"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("cyclic dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("gate not satisfied for phase '{phase}': {reason}")]
    GateNotSatisfied { phase: String, reason: String },

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("unit '{unit}' does not belong to active phase '{phase}'")]
    UnknownUnit { unit: String, phase: String },

    #[error("workflow '{0}' has reached its terminal phase")]
    WorkflowTerminal(String),

    #[error("gate '{0}' is required and cannot be skipped without --override")]
    GateNotSkippable(String),

    #[error("malformed directive: {message}")]
    MalformedDirective { message: String, guidance: String },

    #[error("candidate '{id}' is blocked by: {}", .blocked_by.join(", "))]
    CandidateBlocked { id: String, blocked_by: Vec<String> },

    #[error("rank {rank} is out of range (queue has {len} entries)")]
    RankOutOfRange { rank: usize, len: usize },

    #[error("queue expired at {0}")]
    StaleQueue(chrono::DateTime<chrono::Utc>),

    #[error("workflow instance not found: {0}")]
    NotFound(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode or decode {what}: {message}")]
    Serialization { what: String, message: String },

    #[error("archive write failed: {0}")]
    Archive(String),
}

impl EngineError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::InvalidTemplate(_)
            | EngineError::InvalidWeights(_)
            | EngineError::CyclicDependency(_)
            | EngineError::InvalidConfig(_) => ErrorCategory::Configuration,
            EngineError::GateNotSatisfied { .. }
            | EngineError::InvalidTransition(_)
            | EngineError::UnknownPhase(_)
            | EngineError::UnknownUnit { .. }
            | EngineError::WorkflowTerminal(_)
            | EngineError::GateNotSkippable(_)
            | EngineError::MalformedDirective { .. }
            | EngineError::CandidateBlocked { .. }
            | EngineError::RankOutOfRange { .. } => ErrorCategory::Transition,
            EngineError::StaleQueue(_) => ErrorCategory::StaleQueue,
            EngineError::Io { .. } | EngineError::Serialization { .. } | EngineError::Archive(_) => {
                ErrorCategory::Persistence
            }
            EngineError::NotFound(_) => ErrorCategory::NotFound,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transition | ErrorCategory::StaleQueue | ErrorCategory::NotFound
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(what: impl Into<String>, err: impl std::fmt::Display) -> Self {
        EngineError::Serialization {
            what: what.into(),
            message: err.to_string(),
        }
    }
}
