//! Execution and transaction coordinator
//!
//! Execution flow of one call (strict order):
//!
//! 1. Plan the statement
//! 2. Sample the next auto-increment key, outside any transaction
//! 3. Open a transaction when auto-commit is requested and none is open
//! 4. Run the plan's commands in order
//! 5. SELECT: follow the cursor, probe column types, decode rows
//! 6. Commit, or roll back on any failure in 4-5
//!
//! A coordinator owns one store session and serves one call at a time.

use std::time::Duration;

use bson::{doc, Bson, Document};
use tracing::{debug, info, warn};

use super::autoincrement::{max_key_query, next_key};
use super::context::{ExecutionContext, ExecutionPhase};
use super::response::{affected_count, check_response, distinct_values, CursorBatch};
use crate::config::GatewayConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::materializer::{decode_value, CellValue, Row, RowMaterializer};
use crate::planner::{AutoIncrementSlot, Command, Plan, PlanShape, Planner, SelectShape};
use crate::query::{QueryTree, Statement};
use crate::schema::{infer_types, TypeTag};
use crate::store::DocumentStore;

/// Output column of every non-SELECT statement
pub const AFFECTED_ROWS: &str = "AffectedRows";
/// Output column carrying the generated key of an INSERT
pub const LAST_INSERT_ID: &str = "LastInsertId";

/// Reported when a write response does not say how many documents it touched
const UNKNOWN_AFFECTED: i64 = -1;

pub struct Coordinator<S: DocumentStore> {
    store: S,
    config: GatewayConfig,
    planner: Planner,
}

impl<S: DocumentStore> Coordinator<S> {
    pub fn new(store: S, config: GatewayConfig) -> Self {
        Self {
            store,
            config,
            planner: Planner::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Compiles `tree` without touching the store
    pub fn explain(&self, tree: &QueryTree) -> GatewayResult<Plan> {
        self.planner.plan(tree)
    }

    /// Compiles and executes `tree`, returning its rows.
    ///
    /// With `auto_commit` the call runs in its own transaction unless the
    /// caller already opened one.
    pub fn execute(&mut self, tree: &QueryTree, auto_commit: bool) -> GatewayResult<Vec<Row>> {
        let mut ctx = ExecutionContext::new();
        let result = self.execute_in(tree, auto_commit, &mut ctx);

        if let Err(err) = &result {
            if ctx.owns_transaction && self.store.in_transaction() {
                ctx.advance(ExecutionPhase::Rollback);
                if let Err(abort) = self.store.abort_transaction() {
                    warn!(error = %abort, "rollback after failure did not complete");
                }
            }
            warn!(code = err.kind().code(), error = %err, phase = %ctx.phase(), "statement failed");
        }
        ctx.advance(ExecutionPhase::Idle);
        result
    }

    fn execute_in(
        &mut self,
        tree: &QueryTree,
        auto_commit: bool,
        ctx: &mut ExecutionContext,
    ) -> GatewayResult<Vec<Row>> {
        ctx.advance(ExecutionPhase::Planning);
        let mut plan = self.planner.plan(tree)?;

        if let Some(slot) = plan.auto_increment.clone() {
            ctx.advance(ExecutionPhase::AutoIncrementProbe);
            let key = self.sample_next_key(&slot)?;
            for command in plan.commands.iter_mut() {
                command.set_inserted_field(&slot.column, Bson::Int64(key));
            }
            ctx.last_insert_id = Some(key);
        }

        if auto_commit && !self.store.in_transaction() {
            ctx.advance(ExecutionPhase::TransactionStart);
            self.store.start_transaction()?;
            ctx.owns_transaction = true;
        }

        ctx.advance(ExecutionPhase::Executing);
        let rows = match &plan.shape {
            PlanShape::Select(shape) => self.run_select(&plan, shape, ctx)?,
            _ => vec![self.run_writes(&plan, ctx)?],
        };

        if ctx.owns_transaction {
            ctx.advance(ExecutionPhase::Commit);
            self.store.commit_transaction()?;
            ctx.owns_transaction = false;
        }
        info!(
            statement = plan.statement,
            rows = rows.len(),
            "statement executed"
        );
        Ok(rows)
    }

    fn sample_next_key(&mut self, slot: &AutoIncrementSlot) -> GatewayResult<i64> {
        let plan = self
            .planner
            .plan_statement(&Statement::Select(max_key_query(slot)))?;
        let command = single_command(&plan)?;
        let documents = self.fetch(command)?;
        let key = next_key(&slot.column, documents.first())?;
        debug!(collection = %slot.collection, column = %slot.column, key, "sampled auto-increment key");
        Ok(key)
    }

    fn run_select(
        &mut self,
        plan: &Plan,
        shape: &SelectShape,
        ctx: &mut ExecutionContext,
    ) -> GatewayResult<Vec<Row>> {
        let command = single_command(plan)?;

        if let SelectShape::Distinct { output } = shape {
            let response = self.dispatch(command)?;
            ctx.advance(ExecutionPhase::RowDecode);
            return distinct_values(&response)?
                .iter()
                .map(|value| {
                    let cell = decode_value(output, &TypeTag::of(value), value)?;
                    Ok(Row::new().with(output.clone(), cell))
                })
                .collect();
        }

        let documents = self.fetch(command)?;
        let Some(sample) = documents.first() else {
            return Ok(Vec::new());
        };

        ctx.advance(ExecutionPhase::TypeInference);
        let target = plan.probe.as_ref().ok_or_else(|| {
            GatewayError::missing_metadata("select plan carries no type probe target")
        })?;
        let types = infer_types(target, sample, |probe| self.fetch(&probe))?;

        ctx.advance(ExecutionPhase::RowDecode);
        let mut materializer = RowMaterializer::new(&types);
        if let Some(join) = &target.join {
            materializer = materializer.with_join_prefix(&join.prefix);
        }
        materializer.materialize_all(&documents)
    }

    fn run_writes(&mut self, plan: &Plan, ctx: &ExecutionContext) -> GatewayResult<Row> {
        let mut affected = 0;
        for command in &plan.commands {
            let response = self.dispatch(command)?;
            if !command.verb().is_write() || affected == UNKNOWN_AFFECTED {
                continue;
            }
            match affected_count(&response) {
                Some(n) => affected += n,
                None => {
                    warn!(verb = %command.verb(), "write response carries no affected count");
                    affected = UNKNOWN_AFFECTED;
                }
            }
        }

        let mut row = Row::new().with(AFFECTED_ROWS, CellValue::Long(affected));
        if plan.shape == PlanShape::Insert {
            row.insert(LAST_INSERT_ID, CellValue::Long(ctx.last_insert_id.unwrap_or(0)));
        }
        debug!(statement = plan.statement, affected, "write statement applied");
        Ok(row)
    }

    /// Runs one command and validates its response
    fn dispatch(&mut self, command: &Command) -> GatewayResult<Document> {
        debug!(verb = %command.verb(), collection = command.collection(), "dispatching command");
        let response = self
            .store
            .run_command(&self.config.database, command.document())?;
        check_response(command.verb().as_str(), &response)?;
        Ok(response)
    }

    /// Runs a cursor-returning command and drains the cursor
    fn fetch(&mut self, command: &Command) -> GatewayResult<Vec<Document>> {
        if !command.verb().returns_cursor() {
            return Err(GatewayError::execution_failed(format!(
                "'{}' does not return a cursor",
                command.verb()
            )));
        }
        let response = self.dispatch(command)?;
        let mut batch = CursorBatch::first(&response)?;
        let mut documents = std::mem::take(&mut batch.documents);
        while batch.id != 0 {
            let get_more = doc! { "getMore": batch.id, "collection": command.collection() };
            let response = self.store.run_command(&self.config.database, &get_more)?;
            check_response("getMore", &response)?;
            batch = CursorBatch::next(&response)?;
            documents.append(&mut batch.documents);
        }
        Ok(documents)
    }

    /// Opens a transaction the caller commits or rolls back
    pub fn start_transaction(&mut self) -> GatewayResult<()> {
        self.store.start_transaction()?;
        info!("transaction started");
        Ok(())
    }

    pub fn commit(&mut self) -> GatewayResult<()> {
        self.store.commit_transaction()?;
        info!("transaction committed");
        Ok(())
    }

    pub fn rollback(&mut self) -> GatewayResult<()> {
        self.store.abort_transaction()?;
        info!("transaction rolled back");
        Ok(())
    }

    /// Bounded liveness probe; never fails
    pub fn test_connection(&mut self) -> bool {
        let timeout = Duration::from_millis(self.config.ping_timeout_ms);
        match self.store.ping(timeout) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "connection test failed");
                false
            }
        }
    }
}

fn single_command(plan: &Plan) -> GatewayResult<&Command> {
    match plan.commands.as_slice() {
        [command] => Ok(command),
        commands => Err(GatewayError::execution_failed(format!(
            "select plan must hold one command, got {}",
            commands.len()
        ))),
    }
}
