//! # Document Store Boundary
//!
//! Everything the gateway needs from a document database: run one command
//! document against a database and get the response document back, plus
//! session-level transaction control and a liveness ping.
//!
//! Command rejections arrive as `{ok: 0, ...}` responses, not as `Err`.
//! `Err` is reserved for calls that never produced a response.

mod errors;
mod memory;

use std::time::Duration;

use bson::Document;

pub use errors::{CommandFailure, StoreError, StoreResult};
pub use memory::{MemoryStore, DEFAULT_BATCH_SIZE};

/// A document database reachable through command documents
pub trait DocumentStore {
    /// Runs `command` against `database` and returns the raw response
    fn run_command(&mut self, database: &str, command: &Document) -> StoreResult<Document>;

    fn start_transaction(&mut self) -> StoreResult<()>;

    fn commit_transaction(&mut self) -> StoreResult<()>;

    fn abort_transaction(&mut self) -> StoreResult<()>;

    fn in_transaction(&self) -> bool;

    /// Fails when the store does not answer within `timeout`
    fn ping(&mut self, timeout: Duration) -> StoreResult<()>;
}
