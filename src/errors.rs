//! Gateway error types
//!
//! Error codes:
//! - AERO_SQL_INVALID_GATEWAY (ERROR)
//! - AERO_SQL_UNSUPPORTED_STATEMENT (ERROR)
//! - AERO_SQL_UNSUPPORTED_FILTER (ERROR)
//! - AERO_SQL_UNSUPPORTED_JOIN (ERROR)
//! - AERO_SQL_UNSUPPORTED_AGGREGATION (ERROR)
//! - AERO_SQL_NON_NUMERIC_AUTO_INCREMENT (ERROR)
//! - AERO_SQL_MISSING_METADATA (ERROR)
//! - AERO_SQL_UNKNOWN_COLUMN_TYPE (ERROR)
//! - AERO_SQL_EXECUTION_FAILED (ERROR)
//! - AERO_SQL_INVALID_CONFIG (FATAL)
//!
//! No error is recovered from. The coordinator rolls back an auto-commit
//! transaction and surfaces the error unchanged.

use std::error::Error as StdError;
use std::fmt;

/// Severity levels for gateway errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The call failed; the connection is still usable
    Error,
    /// The gateway cannot be used until the cause is fixed
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Every way a compile-and-execute call can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Statement was routed here with a non document-store target
    InvalidGateway,
    /// More than one statement in a single call
    UnsupportedStatementShape,
    /// XOR connective, nested or unmatched brackets, unconditional DELETE
    UnsupportedFilter,
    /// More than one join, or a join with more than one relation
    UnsupportedJoin,
    /// Aggregated column that is also join-sourced
    UnsupportedAggregation,
    /// Sampled maximum key is not an integer
    NonNumericAutoIncrement,
    /// Type probe returned nothing for a projected field
    MissingMetadata,
    /// Sampled type tag has no decode rule
    UnknownColumnType,
    /// Store rejected a command or could not be reached
    ExecutionFailure,
    /// Configuration file is missing fields or holds invalid values
    InvalidConfiguration,
}

impl ErrorKind {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidGateway => "AERO_SQL_INVALID_GATEWAY",
            ErrorKind::UnsupportedStatementShape => "AERO_SQL_UNSUPPORTED_STATEMENT",
            ErrorKind::UnsupportedFilter => "AERO_SQL_UNSUPPORTED_FILTER",
            ErrorKind::UnsupportedJoin => "AERO_SQL_UNSUPPORTED_JOIN",
            ErrorKind::UnsupportedAggregation => "AERO_SQL_UNSUPPORTED_AGGREGATION",
            ErrorKind::NonNumericAutoIncrement => "AERO_SQL_NON_NUMERIC_AUTO_INCREMENT",
            ErrorKind::MissingMetadata => "AERO_SQL_MISSING_METADATA",
            ErrorKind::UnknownColumnType => "AERO_SQL_UNKNOWN_COLUMN_TYPE",
            ErrorKind::ExecutionFailure => "AERO_SQL_EXECUTION_FAILED",
            ErrorKind::InvalidConfiguration => "AERO_SQL_INVALID_CONFIG",
        }
    }

    /// Returns the severity level for this kind
    pub fn severity(&self) -> Severity {
        match self {
            ErrorKind::InvalidConfiguration => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Returns true if the failure was detected before anything reached the store
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidGateway
                | ErrorKind::UnsupportedStatementShape
                | ErrorKind::UnsupportedFilter
                | ErrorKind::UnsupportedJoin
                | ErrorKind::UnsupportedAggregation
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Gateway error with full context
#[derive(Debug)]
pub struct GatewayError {
    kind: ErrorKind,
    message: String,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl GatewayError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Statement targets a relational dialect instead of the document store
    pub fn invalid_gateway(target: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidGateway,
            format!("statement targets '{}', expected the document store", target),
        )
    }

    /// Statement shape cannot be executed in one call
    pub fn unsupported_statement(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedStatementShape, reason)
    }

    /// Filter cannot be expressed as a document-store filter
    pub fn unsupported_filter(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFilter, reason)
    }

    /// Join shape cannot be expressed as a lookup
    pub fn unsupported_join(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedJoin, reason)
    }

    /// Aggregation shape cannot be expressed as a group stage
    pub fn unsupported_aggregation(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedAggregation, reason)
    }

    /// Sampled key value is not an integer
    pub fn non_numeric_auto_increment(column: &str, sampled: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::NonNumericAutoIncrement,
            format!(
                "auto-increment column '{}' holds non-numeric value '{}'",
                column, sampled
            ),
        )
    }

    /// Type information is missing for a field
    pub fn missing_metadata(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingMetadata, reason)
    }

    /// Type tag has no decode rule
    pub fn unknown_column_type(field: &str, tag: &str) -> Self {
        Self::new(
            ErrorKind::UnknownColumnType,
            format!("column '{}' has unsupported type '{}'", field, tag),
        )
    }

    /// Store reported a failure
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailure, reason)
    }

    /// Configuration is invalid
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration, reason)
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.kind.severity(),
            self.kind.code(),
            self.message
        )?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl StdError for GatewayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
