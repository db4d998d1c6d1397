use crate::error::FailureKind;
use serde::Serialize;
use std::fmt;

/// States visited by one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkflowState {
    Init,
    SchemaFetched,
    Generated,
    Validating,
    Valid,
    Invalid,
    Fixing,
    Executed,
    Failed(FailureKind),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Executed | WorkflowState::Failed(_))
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Init => write!(f, "Init"),
            WorkflowState::SchemaFetched => write!(f, "SchemaFetched"),
            WorkflowState::Generated => write!(f, "Generated"),
            WorkflowState::Validating => write!(f, "Validating"),
            WorkflowState::Valid => write!(f, "Valid"),
            WorkflowState::Invalid => write!(f, "Invalid"),
            WorkflowState::Fixing => write!(f, "Fixing"),
            WorkflowState::Executed => write!(f, "Executed"),
            WorkflowState::Failed(kind) => write!(f, "Failed({})", kind),
        }
    }
}

/// The candidate being validated and how many repairs it has consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowAttempt {
    pub candidate: String,
    pub diagnostic: Option<String>,
    pub attempts: u32,
}

impl WorkflowAttempt {
    pub fn new(candidate: String) -> Self {
        Self {
            candidate,
            diagnostic: None,
            attempts: 0,
        }
    }

    pub fn can_repair(&self, max_fix_attempts: u32) -> bool {
        self.attempts < max_fix_attempts
    }

    /// Swap in a repaired candidate, consuming one attempt.
    pub fn replace(&mut self, candidate: String) {
        self.candidate = candidate;
        self.attempts += 1;
    }
}
