//! Schema inference
//!
//! Documents carry no declared column types, so the type of every result
//! column is sampled from the store once per query.
//!
//! - Tags are the names reported by the `$type` operator
//! - Only the first document of a collection is sampled
//! - Nothing is cached between queries

mod inference;
mod types;

pub use inference::{infer_types, probe_command};
pub use types::{TypeMap, TypeTag};
