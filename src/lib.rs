//! aerosql - relational statements over a schemaless document store
//!
//! Compiles relational query trees into document-store wire commands,
//! executes them inside optional transactions and decodes the results
//! into typed rows.
//!
//! # Subsystems
//!
//! - `query`: the relational statement tree consumed by the compiler
//! - `codec`: literal and scalar conversion to and from BSON
//! - `compiler`: filter, projection and sort compilation
//! - `planner`: statement to wire-command plans
//! - `schema`: column type sampling
//! - `materializer`: result documents to rows
//! - `executor`: the coordinator driving a plan against a store
//! - `store`: the document store boundary and an in-process store
//! - `config`, `observability`, `cli`: configuration, logging and the
//!   JSON-lines command line

pub mod cli;
pub mod codec;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod executor;
pub mod materializer;
pub mod observability;
pub mod planner;
pub mod query;
pub mod schema;
pub mod store;

pub use config::GatewayConfig;
pub use errors::{ErrorKind, GatewayError, GatewayResult};
pub use executor::Coordinator;
pub use materializer::{CellValue, Row};
pub use query::QueryTree;
pub use store::{DocumentStore, MemoryStore};
