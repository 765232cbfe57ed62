//! Relational statement tree
//!
//! The dialect-neutral input consumed by the planner. The tree is built by
//! the caller; this crate never parses SQL text.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::literal::Literal;

/// Column name that selects every field
pub const WILDCARD: &str = "*";

/// Target store of a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    MariaDb,
    Sqlite,
    MsSql,
    PostgreSql,
    Oracle,
    /// The schemaless document store served by this crate
    Document,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::MariaDb => "mariadb",
            Dialect::Sqlite => "sqlite",
            Dialect::MsSql => "mssql",
            Dialect::PostgreSql => "postgresql",
            Dialect::Oracle => "oracle",
            Dialect::Document => "document",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregation applied to a selected column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Avg,
        Aggregation::Count,
        Aggregation::Max,
        Aggregation::Min,
        Aggregation::Sum,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Avg => "AVG",
            Aggregation::Count => "COUNT",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
            Aggregation::Sum => "SUM",
        }
    }

    /// Group accumulator implementing this aggregation
    pub fn accumulator(&self) -> &'static str {
        match self {
            Aggregation::Avg => "$avg",
            // cardinality is read back with $size at projection time
            Aggregation::Count => "$addToSet",
            Aggregation::Max => "$max",
            Aggregation::Min => "$min",
            Aggregation::Sum => "$sum",
        }
    }
}

/// Boolean operator joining a predicate to its predecessor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connective {
    And,
    Or,
    Xor,
}

impl Connective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
            Connective::Xor => "XOR",
        }
    }
}

/// Comparison operator of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<>")]
    Ne,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "NOT LIKE")]
    NotLike,
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT IN")]
    NotIn,
    #[serde(rename = "IS")]
    Is,
    #[serde(rename = "IS NOT")]
    IsNot,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Ne => "<>",
            CompareOp::Like => "LIKE",
            CompareOp::NotLike => "NOT LIKE",
            CompareOp::In => "IN",
            CompareOp::NotIn => "NOT IN",
            CompareOp::Is => "IS",
            CompareOp::IsNot => "IS NOT",
        }
    }
}

/// A column reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
    /// Column lives on the joined collection
    #[serde(default)]
    pub join_sourced: bool,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            aggregation: None,
            join_sourced: false,
        }
    }

    /// The `*` column
    pub fn wildcard() -> Self {
        Self::new(WILDCARD)
    }

    pub fn aggregated(aggregation: Aggregation, name: impl Into<String>) -> Self {
        Self::new(name).with_aggregation(aggregation)
    }

    pub fn joined(name: impl Into<String>) -> Self {
        let mut column = Self::new(name);
        column.join_sourced = true;
        column
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = Some(aggregation);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == WILDCARD
    }
}

/// One WHERE / HAVING predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Where {
    pub column: Column,
    pub op: CompareOp,
    pub value: Literal,
    /// Joins this node to the previous one; ignored on the first node
    #[serde(default)]
    pub connective: Option<Connective>,
    #[serde(default)]
    pub bracket_start: bool,
    #[serde(default)]
    pub bracket_end: bool,
}

impl Where {
    pub fn new(column: impl Into<String>, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self::on(Column::new(column), op, value)
    }

    pub fn on(column: Column, op: CompareOp, value: impl Into<Literal>) -> Self {
        Self {
            column,
            op,
            value: value.into(),
            connective: None,
            bracket_start: false,
            bracket_end: false,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self::new(column, CompareOp::Eq, value)
    }

    pub fn and(mut self) -> Self {
        self.connective = Some(Connective::And);
        self
    }

    pub fn or(mut self) -> Self {
        self.connective = Some(Connective::Or);
        self
    }

    pub fn with_connective(mut self, connective: Connective) -> Self {
        self.connective = Some(connective);
        self
    }

    pub fn open(mut self) -> Self {
        self.bracket_start = true;
        self
    }

    pub fn close(mut self) -> Self {
        self.bracket_end = true;
        self
    }

    /// Connective with the implicit AND applied
    pub fn effective_connective(&self) -> Connective {
        self.connective.unwrap_or(Connective::And)
    }
}

/// Join kind. Inner and left joins become a `$lookup` + `$unwind`; right and
/// full joins are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

/// Equality between a base column and a joined column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    pub collection: String,
    pub relations: Vec<Relation>,
}

impl Join {
    pub fn inner(
        collection: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self::new(JoinKind::Inner, collection, left, right)
    }

    /// Keeps base rows without a match
    pub fn left(
        collection: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self::new(JoinKind::Left, collection, left, right)
    }

    pub fn new(
        kind: JoinKind,
        collection: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            collection: collection.into(),
            relations: vec![Relation {
                left: left.into(),
                right: right.into(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTerm {
    pub column: Column,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub terms: Vec<OrderTerm>,
}

impl OrderBy {
    pub fn asc(column: Column) -> Self {
        Self::default().then(column, true)
    }

    pub fn desc(column: Column) -> Self {
        Self::default().then(column, false)
    }

    pub fn then(mut self, column: Column, ascending: bool) -> Self {
        self.terms.push(OrderTerm { column, ascending });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    pub offset: u64,
    pub count: u64,
}

/// Column constraint declared by DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    AutoIncrement,
    NotNull,
}

impl ConstraintKind {
    /// Constraints backed by a unique index
    pub fn is_indexed(&self) -> bool {
        matches!(self, ConstraintKind::PrimaryKey | ConstraintKind::Unique)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub constraints: Vec<ConstraintKind>,
    /// Value written into existing documents when the column is added
    #[serde(default)]
    pub default: Option<Literal>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: None,
            constraints: Vec::new(),
            default: None,
        }
    }

    pub fn with_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    pub fn with_constraint(mut self, constraint: ConstraintKind) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_default(mut self, value: impl Into<Literal>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// True if a unique index backs this column
    pub fn is_indexed(&self) -> bool {
        self.constraints.iter().any(ConstraintKind::is_indexed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRename {
    pub from: String,
    pub to: String,
    /// The column is backed by a unique index that must follow the rename
    #[serde(default)]
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub column: String,
    pub kind: ConstraintKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlterAction {
    AddColumns { columns: Vec<ColumnDef> },
    RenameColumns { renames: Vec<ColumnRename> },
    DropColumns { columns: Vec<ColumnDef> },
    AddConstraint { constraint: ConstraintDef },
    DropConstraint { constraint: ConstraintDef },
    RenameConstraint { from: ConstraintDef, to: ConstraintDef },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub collection: String,
    #[serde(default)]
    pub distinct: bool,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub wheres: Vec<Where>,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default)]
    pub group_by: Vec<Column>,
    #[serde(default)]
    pub having: Vec<Where>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<Limit>,
}

impl Select {
    pub fn from(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn all(self) -> Self {
        self.column(Column::wildcard())
    }

    pub fn filter(mut self, predicate: Where) -> Self {
        self.wheres.push(predicate);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn group_by(mut self, column: Column) -> Self {
        self.group_by.push(column);
        self
    }

    pub fn having(mut self, predicate: Where) -> Self {
        self.having.push(predicate);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn limit(mut self, offset: u64, count: u64) -> Self {
        self.limit = Some(Limit { offset, count });
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn has_aggregation(&self) -> bool {
        self.columns.iter().any(|c| c.aggregation.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub collection: String,
    /// Column whose value is generated from the current maximum
    #[serde(default)]
    pub auto_increment: Option<String>,
    pub values: Vec<(String, Literal)>,
}

impl Insert {
    pub fn into(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn value(mut self, column: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn auto_increment(mut self, column: impl Into<String>) -> Self {
        self.auto_increment = Some(column.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub collection: String,
    pub values: Vec<(String, Literal)>,
    #[serde(default)]
    pub wheres: Vec<Where>,
}

impl Update {
    pub fn table(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, predicate: Where) -> Self {
        self.wheres.push(predicate);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub collection: String,
    #[serde(default)]
    pub wheres: Vec<Where>,
}

impl Delete {
    pub fn from(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            wheres: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Where) -> Self {
        self.wheres.push(predicate);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Create {
    pub collection: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl Create {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alter {
    pub collection: String,
    pub actions: Vec<AlterAction>,
}

impl Alter {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            actions: Vec::new(),
        }
    }

    pub fn action(mut self, action: AlterAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// A single relational statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Create(Create),
    Alter(Alter),
    Drop { collection: String },
    Truncate { collection: String },
}

impl Statement {
    pub fn drop(collection: impl Into<String>) -> Self {
        Statement::Drop {
            collection: collection.into(),
        }
    }

    pub fn truncate(collection: impl Into<String>) -> Self {
        Statement::Truncate {
            collection: collection.into(),
        }
    }

    /// Target collection
    pub fn collection(&self) -> &str {
        match self {
            Statement::Select(s) => &s.collection,
            Statement::Insert(s) => &s.collection,
            Statement::Update(s) => &s.collection,
            Statement::Delete(s) => &s.collection,
            Statement::Create(s) => &s.collection,
            Statement::Alter(s) => &s.collection,
            Statement::Drop { collection } | Statement::Truncate { collection } => collection,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::Create(_) => "CREATE",
            Statement::Alter(_) => "ALTER",
            Statement::Drop { .. } => "DROP",
            Statement::Truncate { .. } => "TRUNCATE",
        }
    }

    pub fn is_select(&self) -> bool {
        matches!(self, Statement::Select(_))
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}

impl From<Create> for Statement {
    fn from(s: Create) -> Self {
        Statement::Create(s)
    }
}

impl From<Alter> for Statement {
    fn from(s: Alter) -> Self {
        Statement::Alter(s)
    }
}

/// Everything handed to one compile-and-execute call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTree {
    pub target: Dialect,
    pub statements: Vec<Statement>,
}

impl QueryTree {
    /// A single statement routed to the document store
    pub fn document(statement: impl Into<Statement>) -> Self {
        Self {
            target: Dialect::Document,
            statements: vec![statement.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_builder() {
        let select = Select::from("users")
            .column(Column::new("name"))
            .column(Column::aggregated(Aggregation::Sum, "amt"))
            .filter(Where::eq("dept", "A"))
            .limit(0, 10);

        assert_eq!(select.collection, "users");
        assert!(select.has_aggregation());
        assert_eq!(select.limit, Some(Limit { offset: 0, count: 10 }));
    }

    #[test]
    fn test_effective_connective_defaults_to_and() {
        assert_eq!(Where::eq("a", 1).effective_connective(), Connective::And);
        assert_eq!(Where::eq("a", 1).or().effective_connective(), Connective::Or);
    }

    #[test]
    fn test_indexed_constraints() {
        let pk = ColumnDef::new("id").with_constraint(ConstraintKind::PrimaryKey);
        let plain = ColumnDef::new("name").with_constraint(ConstraintKind::NotNull);
        assert!(pk.is_indexed());
        assert!(!plain.is_indexed());
    }

    #[test]
    fn test_statement_json_shape() {
        let json = serde_json::json!({
            "kind": "select",
            "collection": "users",
            "columns": [{"name": "*"}],
            "wheres": [{"column": {"name": "age"}, "op": ">=", "value": {"type": "integer", "value": 18}}]
        });
        let statement: Statement = serde_json::from_value(json).unwrap();
        match statement {
            Statement::Select(select) => {
                assert!(select.columns[0].is_wildcard());
                assert_eq!(select.wheres[0].op, CompareOp::Gte);
                assert_eq!(select.wheres[0].value, Literal::Integer(18));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }
}
