//! Statement planner
//!
//! Planning is a pure function of the query tree: no store access, no
//! state carried between calls.

use tracing::debug;

use super::ddl::{plan_alter, plan_create, plan_drop};
use super::dml::{plan_delete, plan_insert, plan_truncate, plan_update};
use super::plan::Plan;
use super::select::plan_select;
use crate::errors::{GatewayError, GatewayResult};
use crate::query::{Dialect, QueryTree, Statement};

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Plans a whole query tree, which must target the document store and
    /// hold exactly one statement
    pub fn plan(&self, tree: &QueryTree) -> GatewayResult<Plan> {
        if tree.target != Dialect::Document {
            return Err(GatewayError::invalid_gateway(tree.target.as_str()));
        }
        match tree.statements.as_slice() {
            [statement] => self.plan_statement(statement),
            statements => Err(GatewayError::unsupported_statement(format!(
                "expected exactly one statement, got {}",
                statements.len()
            ))),
        }
    }

    pub fn plan_statement(&self, statement: &Statement) -> GatewayResult<Plan> {
        let plan = match statement {
            Statement::Select(select) => plan_select(select),
            Statement::Insert(insert) => plan_insert(insert),
            Statement::Update(update) => plan_update(update),
            Statement::Delete(delete) => plan_delete(delete),
            Statement::Create(create) => plan_create(create),
            Statement::Alter(alter) => plan_alter(alter),
            Statement::Drop { collection } => plan_drop(collection),
            Statement::Truncate { collection } => plan_truncate(collection),
        }?;
        debug!(
            statement = plan.statement,
            collection = statement.collection(),
            commands = plan.commands.len(),
            "planned statement"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::planner::{PlanShape, SelectShape, Verb};
    use crate::query::{Column, Delete, Select};

    #[test]
    fn test_wrong_target_rejected() {
        let mut tree = QueryTree::document(Select::from("users").all());
        tree.target = Dialect::PostgreSql;
        let err = Planner::new().plan(&tree).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidGateway);
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let mut tree = QueryTree::document(Select::from("users").all());
        tree.statements.push(Statement::drop("users"));
        let err = Planner::new().plan(&tree).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedStatementShape);

        tree.statements.clear();
        let err = Planner::new().plan(&tree).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedStatementShape);
    }

    #[test]
    fn test_dispatch_by_statement_kind() {
        let planner = Planner::new();
        let select = planner
            .plan(&QueryTree::document(
                Select::from("users").column(Column::new("name")),
            ))
            .unwrap();
        assert_eq!(select.shape, PlanShape::Select(SelectShape::Find));

        let truncate = planner
            .plan(&QueryTree::document(Statement::truncate("users")))
            .unwrap();
        assert_eq!(truncate.verbs(), vec![Verb::Delete]);

        let drop = planner
            .plan(&QueryTree::document(Statement::drop("users")))
            .unwrap();
        assert_eq!(drop.verbs(), vec![Verb::Drop]);
    }

    #[test]
    fn test_planning_is_repeatable() {
        let planner = Planner::new();
        let tree = QueryTree::document(Delete::from("users").filter(crate::query::Where::eq("a", 1)));
        assert_eq!(planner.plan(&tree).unwrap(), planner.plan(&tree).unwrap());
    }
}
