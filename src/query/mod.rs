//! Relational query tree
//!
//! The statement tree is owned by callers and shared by every SQL dialect.
//! This crate only consumes it: statements targeting the document store are
//! compiled into wire commands by the planner.

mod ast;
mod literal;

pub use ast::{
    Aggregation, Alter, AlterAction, ColumnDef, ColumnRename, CompareOp, Column, Connective,
    ConstraintDef, ConstraintKind, Create, Delete, Dialect, Insert, Join, JoinKind, Limit,
    OrderBy, OrderTerm, QueryTree, Relation, Select, Statement, Update, Where, WILDCARD,
};
pub use literal::{Literal, LiteralTag};
