//! Gateway configuration
//!
//! Loaded from a JSON file. Only `database` is required:
//!
//! ```json
//! { "database": "app", "auto_commit": true, "ping_timeout_ms": 1000 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{GatewayError, GatewayResult};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Characters the store refuses in a database name
const FORBIDDEN_NAME_CHARS: [char; 6] = ['/', '\\', '.', ' ', '"', '$'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Database every command runs against
    pub database: String,

    /// Wrap each call in its own transaction when the caller does not say
    #[serde(default = "default_auto_commit")]
    pub auto_commit: bool,

    /// Bound on the connection health probe (default: 1000)
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// Log filter directive (default: "info")
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Make the in-process store refuse transactions like a
    /// non-replicated deployment
    #[serde(default)]
    pub standalone: bool,
}

fn default_auto_commit() -> bool {
    true
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatewayConfig {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            auto_commit: default_auto_commit(),
            ping_timeout_ms: default_ping_timeout_ms(),
            log_level: default_log_level(),
            standalone: false,
        }
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }

    pub fn with_ping_timeout_ms(mut self, ping_timeout_ms: u64) -> Self {
        self.ping_timeout_ms = ping_timeout_ms;
        self
    }

    pub fn with_standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    /// Reads, parses and validates a configuration file
    pub fn load(path: &Path) -> GatewayResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::invalid_config(format!(
                "failed to read config {}: {}",
                path.display(),
                e
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> GatewayResult<Self> {
        let config: GatewayConfig = serde_json::from_str(content).map_err(|e| {
            GatewayError::invalid_config(format!("invalid config JSON: {}", e)).with_source(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.database.is_empty() {
            return Err(GatewayError::invalid_config("database must not be empty"));
        }
        if let Some(bad) = self
            .database
            .chars()
            .find(|c| *c == '\0' || FORBIDDEN_NAME_CHARS.contains(c))
        {
            return Err(GatewayError::invalid_config(format!(
                "database name '{}' contains forbidden character {:?}",
                self.database, bad
            )));
        }
        if self.ping_timeout_ms == 0 {
            return Err(GatewayError::invalid_config("ping_timeout_ms must be > 0"));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(GatewayError::invalid_config(format!(
                "unknown log_level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }
}
