//! CLI argument definitions using clap
//!
//! Commands:
//! - aerosql query --config <path>
//! - aerosql explain --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerosql - relational statements over a document store
#[derive(Parser, Debug)]
#[command(name = "aerosql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute query trees read from stdin, one JSON request per line
    Query {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosql.json")]
        config: PathBuf,
    },

    /// Print the wire commands each query tree compiles to
    Explain {
        /// Path to configuration file
        #[arg(long, default_value = "./aerosql.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::try_parse_from(["aerosql", "query"]).unwrap();
        match cli.command {
            Command::Query { config } => assert_eq!(config, PathBuf::from("./aerosql.json")),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_explicit_config_path() {
        let cli = Cli::try_parse_from(["aerosql", "explain", "--config", "/etc/a.json"]).unwrap();
        assert!(matches!(cli.command, Command::Explain { config } if config == PathBuf::from("/etc/a.json")));
    }
}
