//! Statement planner
//!
//! Turns one relational statement into the ordered wire commands that
//! implement it against the document store.
//!
//! # SELECT strategies (priority order)
//!
//! 1. Distinct: `distinct` over a single column
//! 2. Find: `find` with filter / projection / sort / skip / limit
//! 3. Join-only: `$lookup` + `$unwind` pipeline
//! 4. Grouping: `$group` + `$replaceRoot` pipeline, optionally after a join
//!
//! # Other statements
//!
//! - INSERT: one `insert` of one generated document
//! - UPDATE / DELETE / TRUNCATE: `update` / `delete` over every match
//! - CREATE / ALTER / DROP: collection and unique-index management

mod command;
mod ddl;
mod dml;
mod plan;
mod planner;
mod select;

pub use command::{Command, Verb};
pub use ddl::index_name;
pub use plan::{
    AutoIncrementSlot, JoinedCollection, Plan, PlanShape, ProbeColumn, ProbeTarget, SelectShape,
};
pub use planner::Planner;
pub use select::RECORD_FIELD;
