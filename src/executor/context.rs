//! Per-call execution state
//!
//! Created at the start of every `Coordinator::execute` and dropped when the
//! call returns. Nothing in here outlives one logical query.

use std::fmt;

use tracing::debug;

/// Phase of one compile-and-execute call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    Idle,
    Planning,
    AutoIncrementProbe,
    TransactionStart,
    Executing,
    TypeInference,
    RowDecode,
    Commit,
    Rollback,
}

impl ExecutionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Idle => "idle",
            ExecutionPhase::Planning => "planning",
            ExecutionPhase::AutoIncrementProbe => "auto_increment_probe",
            ExecutionPhase::TransactionStart => "transaction_start",
            ExecutionPhase::Executing => "executing",
            ExecutionPhase::TypeInference => "type_inference",
            ExecutionPhase::RowDecode => "row_decode",
            ExecutionPhase::Commit => "commit",
            ExecutionPhase::Rollback => "rollback",
        }
    }

    /// Whether `next` may follow this phase
    pub fn can_advance_to(&self, next: ExecutionPhase) -> bool {
        use ExecutionPhase::*;
        matches!(
            (*self, next),
            (Idle, Planning)
                | (Planning, AutoIncrementProbe)
                | (Planning, TransactionStart)
                | (Planning, Executing)
                | (AutoIncrementProbe, TransactionStart)
                | (AutoIncrementProbe, Executing)
                | (TransactionStart, Executing)
                | (Executing, TypeInference)
                | (Executing, RowDecode)
                | (TypeInference, RowDecode)
                | (Executing | TypeInference | RowDecode, Commit)
                | (_, Rollback)
                | (_, Idle)
        )
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State threaded through one call
#[derive(Debug)]
pub struct ExecutionContext {
    phase: ExecutionPhase,
    history: Vec<ExecutionPhase>,
    /// Key generated by the auto-increment probe, if one ran
    pub last_insert_id: Option<i64>,
    /// Whether this call opened the transaction it runs in
    pub owns_transaction: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            phase: ExecutionPhase::Idle,
            history: vec![ExecutionPhase::Idle],
            last_insert_id: None,
            owns_transaction: false,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Every phase entered so far, starting with `Idle`
    pub fn history(&self) -> &[ExecutionPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: ExecutionPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal phase transition {} -> {}",
            self.phase,
            next
        );
        debug!(from = %self.phase, to = %next, "execution phase");
        self.phase = next;
        self.history.push(next);
    }
}
