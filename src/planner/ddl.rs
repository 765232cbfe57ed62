//! CREATE / ALTER / DROP planning
//!
//! PRIMARY KEY and UNIQUE constraints become unique single-field indexes
//! named `<collection>_<column>_puk`. Other constraints have no store-side
//! representation and compile to nothing.

use bson::{doc, Bson, Document};
use tracing::debug;

use super::command::{Command, Verb};
use super::plan::{Plan, PlanShape};
use crate::codec::literal_to_bson;
use crate::errors::{GatewayError, GatewayResult};
use crate::query::{Alter, AlterAction, ColumnDef, ConstraintDef, Create};

/// Name of the unique index backing a key constraint
pub fn index_name(collection: &str, column: &str) -> String {
    format!("{}_{}_puk", collection, column)
}

pub(super) fn plan_create(create: &Create) -> GatewayResult<Plan> {
    let indexed: Vec<&str> = create
        .columns
        .iter()
        .filter(|c| c.is_indexed())
        .map(|c| c.name.as_str())
        .collect();

    let mut plan = Plan::new("create", PlanShape::Definition)
        .with_command(Command::new(Verb::Create, &create.collection));
    if let Some(command) = create_indexes(&create.collection, &indexed) {
        plan = plan.with_command(command);
    }
    Ok(plan)
}

pub(super) fn plan_drop(collection: &str) -> GatewayResult<Plan> {
    Ok(Plan::new("drop", PlanShape::Definition)
        .with_command(Command::new(Verb::Drop, collection)))
}

pub(super) fn plan_alter(alter: &Alter) -> GatewayResult<Plan> {
    if alter.actions.is_empty() {
        return Err(GatewayError::unsupported_statement(format!(
            "ALTER of '{}' has no actions",
            alter.collection
        )));
    }

    let collection = alter.collection.as_str();
    let mut commands = Vec::new();
    for action in &alter.actions {
        match action {
            AlterAction::AddColumns { columns } => {
                let defaults: Document = columns
                    .iter()
                    .map(|c| {
                        let value = c.default.as_ref().map(literal_to_bson).unwrap_or(Bson::Null);
                        (c.name.clone(), value)
                    })
                    .collect();
                commands.push(Command::update_many(
                    collection,
                    Document::new(),
                    doc! { "$set": defaults },
                ));
                commands.extend(create_indexes(collection, &indexed_names(columns)));
            }
            AlterAction::RenameColumns { renames } => {
                let from: Vec<&str> = renames
                    .iter()
                    .filter(|r| r.indexed)
                    .map(|r| r.from.as_str())
                    .collect();
                let to: Vec<&str> = renames
                    .iter()
                    .filter(|r| r.indexed)
                    .map(|r| r.to.as_str())
                    .collect();
                let renamed: Document = renames
                    .iter()
                    .map(|r| (r.from.clone(), Bson::String(r.to.clone())))
                    .collect();
                commands.extend(drop_indexes(collection, &from));
                commands.push(Command::update_many(
                    collection,
                    Document::new(),
                    doc! { "$rename": renamed },
                ));
                commands.extend(create_indexes(collection, &to));
            }
            AlterAction::DropColumns { columns } => {
                let removed: Document = columns
                    .iter()
                    .map(|c| (c.name.clone(), Bson::String(String::new())))
                    .collect();
                commands.extend(drop_indexes(collection, &indexed_names(columns)));
                commands.push(Command::update_many(
                    collection,
                    Document::new(),
                    doc! { "$unset": removed },
                ));
            }
            AlterAction::AddConstraint { constraint } => {
                commands.extend(create_indexes(collection, &constraint_column(constraint)));
            }
            AlterAction::DropConstraint { constraint } => {
                commands.extend(drop_indexes(collection, &constraint_column(constraint)));
            }
            AlterAction::RenameConstraint { from, to } => {
                commands.extend(drop_indexes(collection, &constraint_column(from)));
                commands.extend(create_indexes(collection, &constraint_column(to)));
            }
        }
    }

    debug!(collection, commands = commands.len(), "planned alter");
    Ok(Plan::new("alter", PlanShape::Definition).with_commands(commands))
}

fn indexed_names(columns: &[ColumnDef]) -> Vec<&str> {
    columns
        .iter()
        .filter(|c| c.is_indexed())
        .map(|c| c.name.as_str())
        .collect()
}

fn constraint_column(constraint: &ConstraintDef) -> Vec<&str> {
    if constraint.kind.is_indexed() {
        vec![constraint.column.as_str()]
    } else {
        Vec::new()
    }
}

fn create_indexes(collection: &str, columns: &[&str]) -> Option<Command> {
    if columns.is_empty() {
        return None;
    }
    let indexes: Vec<Document> = columns
        .iter()
        .map(|column| {
            let mut key = Document::new();
            key.insert(*column, 1);
            doc! {
                "key": key,
                "name": index_name(collection, column),
                "unique": true,
            }
        })
        .collect();
    Some(Command::new(Verb::CreateIndexes, collection).with("indexes", indexes))
}

fn drop_indexes(collection: &str, columns: &[&str]) -> Option<Command> {
    if columns.is_empty() {
        return None;
    }
    let names: Vec<String> = columns
        .iter()
        .map(|column| index_name(collection, column))
        .collect();
    Some(Command::new(Verb::DropIndexes, collection).with("index", names))
}
