//! Query execution
//!
//! The coordinator turns a query tree into rows: it plans the statement,
//! emulates auto-increment keys, brackets the commands in a transaction,
//! validates every store response and decodes SELECT results.
//!
//! # Execution Phases
//!
//! `Idle → Planning → [AutoIncrementProbe] → [TransactionStart] → Executing
//! → [TypeInference → RowDecode] → Commit | Rollback → Idle`

mod autoincrement;
mod context;
mod coordinator;
mod response;

pub use autoincrement::{max_key_query, next_key, FIRST_KEY};
pub use context::{ExecutionContext, ExecutionPhase};
pub use coordinator::{Coordinator, AFFECTED_ROWS, LAST_INSERT_ID};
pub use response::{affected_count, check_response, CursorBatch};
