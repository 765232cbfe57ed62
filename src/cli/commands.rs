//! CLI command implementations
//!
//! Both commands load the configuration, install logging and then serve
//! request lines from stdin until EOF. A failing request produces an error
//! response; only configuration and I/O failures end the process.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::config::GatewayConfig;
use crate::executor::Coordinator;
use crate::observability::init_logging;
use crate::query::QueryTree;
use crate::store::{DocumentStore, MemoryStore};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{read_lines, write_error, write_response};

/// One request line
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub tree: QueryTree,
    /// Overrides the configured auto-commit for this request
    #[serde(default)]
    pub auto_commit: Option<bool>,
}

impl Request {
    pub fn parse(line: &str) -> CliResult<Self> {
        serde_json::from_str(line).map_err(|e| CliError::bad_request(format!("invalid request: {}", e)))
    }
}

/// Entry point used by `main`
pub fn run() -> CliResult<()> {
    run_command(Cli::parse_args().command)
}

pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Query { config } => query(&config),
        Command::Explain { config } => explain(&config),
    }
}

/// Execute every request against one in-process store
pub fn query(config_path: &Path) -> CliResult<()> {
    let config = load(config_path)?;
    let mut store = MemoryStore::new();
    if config.standalone {
        store = store.standalone();
    }
    let mut coordinator = Coordinator::new(store, config);
    if !coordinator.test_connection() {
        return Err(CliError::io_error("document store did not answer the ping"));
    }
    serve_queries(&mut coordinator, io::stdin().lock(), &mut io::stdout().lock())
}

/// Print the compiled plan of every request
pub fn explain(config_path: &Path) -> CliResult<()> {
    let config = load(config_path)?;
    let coordinator = Coordinator::new(MemoryStore::new(), config);
    serve_explain(&coordinator, io::stdin().lock(), &mut io::stdout().lock())
}

fn load(config_path: &Path) -> CliResult<GatewayConfig> {
    let config = GatewayConfig::load(config_path)?;
    init_logging(&config.log_level);
    info!(config = %config_path.display(), database = %config.database, "configuration loaded");
    Ok(config)
}

pub fn serve_queries<S, R, W>(
    coordinator: &mut Coordinator<S>,
    input: R,
    out: &mut W,
) -> CliResult<()>
where
    S: DocumentStore,
    R: BufRead,
    W: Write,
{
    for line in read_lines(input) {
        let request = match Request::parse(&line?) {
            Ok(request) => request,
            Err(err) => {
                write_error(out, err.code_str(), err.message())?;
                continue;
            }
        };
        let auto_commit = request
            .auto_commit
            .unwrap_or(coordinator.config().auto_commit);
        match coordinator.execute(&request.tree, auto_commit) {
            Ok(rows) => write_response(out, serde_json::to_value(&rows)?)?,
            Err(err) => write_error(out, err.kind().code(), &err.to_string())?,
        }
    }
    Ok(())
}

pub fn serve_explain<S, R, W>(coordinator: &Coordinator<S>, input: R, out: &mut W) -> CliResult<()>
where
    S: DocumentStore,
    R: BufRead,
    W: Write,
{
    for line in read_lines(input) {
        let request = match Request::parse(&line?) {
            Ok(request) => request,
            Err(err) => {
                write_error(out, err.code_str(), err.message())?;
                continue;
            }
        };
        match coordinator.explain(&request.tree) {
            Ok(plan) => write_response(out, plan.explain())?,
            Err(err) => write_error(out, err.kind().code(), &err.to_string())?,
        }
    }
    Ok(())
}
