//! INSERT / UPDATE / DELETE / TRUNCATE planning

use bson::{doc, oid::ObjectId, Bson, Document};

use super::command::{Command, Verb};
use super::plan::{AutoIncrementSlot, Plan, PlanShape};
use crate::codec::literal_to_bson;
use crate::compiler::{FilterCompiler, NameResolver, ID_FIELD};
use crate::errors::{GatewayError, GatewayResult};
use crate::query::{Delete, Insert, Literal, Update};

pub(super) fn plan_insert(insert: &Insert) -> GatewayResult<Plan> {
    let mut document = Document::new();
    document.insert(ID_FIELD, ObjectId::new());
    if let Some(column) = &insert.auto_increment {
        // substituted once the next key has been sampled
        document.insert(column.clone(), Bson::Null);
    }
    for (column, value) in &insert.values {
        if insert.auto_increment.as_deref() == Some(column.as_str()) {
            continue;
        }
        document.insert(column.clone(), literal_to_bson(value));
    }

    let command = Command::new(Verb::Insert, &insert.collection)
        .with("documents", vec![document])
        .with("ordered", true);
    let mut plan = Plan::new("insert", PlanShape::Insert).with_command(command);
    if let Some(column) = &insert.auto_increment {
        plan = plan.with_auto_increment(AutoIncrementSlot {
            collection: insert.collection.clone(),
            column: column.clone(),
        });
    }
    Ok(plan)
}

pub(super) fn plan_update(update: &Update) -> GatewayResult<Plan> {
    if update.values.is_empty() {
        return Err(GatewayError::unsupported_statement(format!(
            "UPDATE of '{}' assigns no columns",
            update.collection
        )));
    }
    let filter = FilterCompiler::new(NameResolver::default())
        .compile(&update.wheres)?
        .unwrap_or_default();
    let command = Command::update_many(
        &update.collection,
        filter,
        doc! { "$set": assignments(&update.values) },
    );
    Ok(Plan::new("update", PlanShape::Update).with_command(command))
}

pub(super) fn plan_delete(delete: &Delete) -> GatewayResult<Plan> {
    let filter = FilterCompiler::new(NameResolver::default())
        .compile(&delete.wheres)?
        .filter(|filter| !filter.is_empty())
        .ok_or_else(|| {
            GatewayError::unsupported_filter(format!(
                "DELETE from '{}' without a filter; use TRUNCATE to empty a collection",
                delete.collection
            ))
        })?;
    Ok(Plan::new("delete", PlanShape::Delete)
        .with_command(Command::delete_many(&delete.collection, filter)))
}

pub(super) fn plan_truncate(collection: &str) -> GatewayResult<Plan> {
    Ok(Plan::new("truncate", PlanShape::Delete)
        .with_command(Command::delete_many(collection, Document::new())))
}

pub(super) fn assignments(values: &[(String, Literal)]) -> Document {
    values
        .iter()
        .map(|(column, value)| (column.clone(), literal_to_bson(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::query::{CompareOp, Where};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn inserted(plan: &Plan) -> Document {
        plan.commands[0].document().get_array("documents").unwrap()[0]
            .as_document()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_insert_generates_identity() {
        let plan = plan_insert(&Insert::into("users").value("name", "ada")).unwrap();
        assert_eq!(plan.shape, PlanShape::Insert);
        assert!(plan.auto_increment.is_none());
        let document = inserted(&plan);
        let id = document.get_object_id("_id").unwrap();
        assert_eq!(id.to_hex().len(), 24);
        assert_eq!(document.get_str("name").unwrap(), "ada");
        assert_eq!(plan.commands[0].document().get_bool("ordered").unwrap(), true);
    }

    #[test]
    fn test_insert_coerces_literals() {
        let insert = Insert::into("users")
            .value("age", 36)
            .value("score", 1.5)
            .value("balance", Decimal::new(1234, 2))
            .value("born", NaiveDate::from_ymd_opt(1990, 1, 2).unwrap())
            .value("nick", Literal::Null);
        let document = inserted(&plan_insert(&insert).unwrap());
        assert_eq!(document.get("age"), Some(&Bson::Int32(36)));
        assert_eq!(document.get("score"), Some(&Bson::Double(1.5)));
        assert!(matches!(document.get("balance"), Some(Bson::Decimal128(_))));
        assert!(matches!(document.get("born"), Some(Bson::DateTime(_))));
        assert_eq!(document.get("nick"), Some(&Bson::Null));
    }

    #[test]
    fn test_insert_reserves_auto_increment_slot() {
        let insert = Insert::into("users").auto_increment("id").value("name", "ada");
        let plan = plan_insert(&insert).unwrap();
        assert_eq!(
            plan.auto_increment,
            Some(AutoIncrementSlot {
                collection: "users".into(),
                column: "id".into()
            })
        );
        assert_eq!(inserted(&plan).get("id"), Some(&Bson::Null));
    }

    #[test]
    fn test_update_sets_values() {
        let update = Update::table("users")
            .set("age", 37)
            .filter(Where::eq("name", "ada"));
        let plan = plan_update(&update).unwrap();
        assert_eq!(
            plan.commands[0].document(),
            &doc! {
                "update": "users",
                "updates": [{
                    "q": { "name": { "$eq": "ada" } },
                    "u": { "$set": { "age": 37 } },
                    "multi": true,
                }],
            }
        );
    }

    #[test]
    fn test_update_without_assignments_rejected() {
        let err = plan_update(&Update::table("users")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedStatementShape);
    }

    #[test]
    fn test_delete_requires_filter() {
        let err = plan_delete(&Delete::from("users")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);

        let plan = plan_delete(
            &Delete::from("users").filter(Where::new("age", CompareOp::Lt, 18)),
        )
        .unwrap();
        assert_eq!(
            plan.commands[0].document(),
            &doc! { "delete": "users", "deletes": [{ "q": { "age": { "$lt": 18 } }, "limit": 0 }] }
        );
    }

    #[test]
    fn test_truncate_is_unconditional() {
        let plan = plan_truncate("users").unwrap();
        assert_eq!(plan.shape, PlanShape::Delete);
        assert_eq!(
            plan.commands[0].document(),
            &doc! { "delete": "users", "deletes": [{ "q": {}, "limit": 0 }] }
        );
    }
}
