//! Clause compilers
//!
//! Leaf components of statement planning:
//! - `filter`: WHERE / HAVING lists into one filter document
//! - `projection`: column lists, ORDER BY and LIMIT into projection,
//!   sort and skip/limit clauses
//! - `naming`: aggregation and join qualification of column names

mod filter;
mod naming;
mod projection;

pub use filter::{
    lower, merge_document, merge_field, Condition, FilterCompiler, FilterItem, FilterTerm,
    FilterTree,
};
pub use naming::{aggregated_name, join_prefix, strip_aggregation_prefix, NameResolver};
pub use projection::{ProjectionCompiler, Window, ID_FIELD};
