//! CLI module for aerosql
//!
//! Provides command-line interface for:
//! - query: execute query trees read as JSON lines from stdin
//! - explain: print the wire commands of each query tree

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{explain, query, run, run_command, serve_explain, serve_queries, Request};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_lines, write_error, write_response};
