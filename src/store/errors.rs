//! # Store Errors
//!
//! Two failure channels exist at the store boundary:
//! - `StoreError`: the command never produced a response (unreachable
//!   store, ping timeout, session misuse)
//! - `CommandFailure`: the store answered `{ok: 0, errmsg, code, codeName}`

use std::time::Duration;

use bson::{doc, Document};
use thiserror::Error;

use crate::errors::GatewayError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Transport and session errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unreachable: {0}")]
    Unreachable(String),

    #[error("Ping timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Malformed command: {0}")]
    Malformed(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::execution_failed(format!("store call failed: {}", err)).with_source(err)
    }
}

/// A command the store rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code_name} ({code}): {message}")]
pub struct CommandFailure {
    pub code: i32,
    pub code_name: &'static str,
    pub message: String,
}

impl CommandFailure {
    pub fn new(code: i32, code_name: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            code_name,
            message: message.into(),
        }
    }

    pub fn bad_value(message: impl Into<String>) -> Self {
        Self::new(2, "BadValue", message)
    }

    pub fn failed_to_parse(message: impl Into<String>) -> Self {
        Self::new(9, "FailedToParse", message)
    }

    pub fn illegal_operation(message: impl Into<String>) -> Self {
        Self::new(20, "IllegalOperation", message)
    }

    pub fn namespace_not_found(message: impl Into<String>) -> Self {
        Self::new(26, "NamespaceNotFound", message)
    }

    pub fn index_not_found(message: impl Into<String>) -> Self {
        Self::new(27, "IndexNotFound", message)
    }

    pub fn cursor_not_found(id: i64) -> Self {
        Self::new(43, "CursorNotFound", format!("cursor id {} not found", id))
    }

    pub fn namespace_exists(message: impl Into<String>) -> Self {
        Self::new(48, "NamespaceExists", message)
    }

    pub fn command_not_found(verb: &str) -> Self {
        Self::new(59, "CommandNotFound", format!("no such command: '{}'", verb))
    }

    pub fn invalid_pipeline_operator(message: impl Into<String>) -> Self {
        Self::new(168, "InvalidPipelineOperator", message)
    }

    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::new(11000, "DuplicateKey", message)
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(14, "TypeMismatch", message)
    }

    /// Wire form of the failure
    pub fn to_response(&self) -> Document {
        doc! {
            "ok": 0.0,
            "errmsg": self.message.clone(),
            "code": self.code,
            "codeName": self.code_name,
        }
    }

    /// Entry of a `writeErrors` array
    pub fn to_write_error(&self, index: usize) -> Document {
        doc! {
            "index": index as i32,
            "code": self.code,
            "errmsg": self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_failure_response_shape() {
        let response = CommandFailure::namespace_exists("Collection already exists").to_response();
        assert_eq!(response.get_f64("ok").unwrap(), 0.0);
        assert_eq!(response.get_i32("code").unwrap(), 48);
        assert_eq!(response.get_str("codeName").unwrap(), "NamespaceExists");
    }

    #[test]
    fn test_store_error_converts_to_execution_failure() {
        let err: GatewayError = StoreError::Unreachable("offline".into()).into();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
        assert!(err.to_string().contains("offline"));
    }
}
