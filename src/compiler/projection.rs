//! Projection, sort and limit compilation

use bson::{Bson, Document};

use super::naming::NameResolver;
use crate::errors::GatewayResult;
use crate::query::{Aggregation, Column, Limit, OrderBy};

/// Internal identity field of every stored document
pub const ID_FIELD: &str = "_id";

/// Skip/limit pair, only produced for a positive count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: i64,
    pub limit: i64,
}

impl Window {
    pub fn from_limit(limit: Option<&Limit>) -> Option<Window> {
        let limit = limit?;
        if limit.count == 0 {
            return None;
        }
        Some(Window {
            skip: i64::try_from(limit.offset).unwrap_or(i64::MAX),
            limit: i64::try_from(limit.count).unwrap_or(i64::MAX),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionCompiler<'a> {
    resolver: NameResolver<'a>,
}

impl<'a> ProjectionCompiler<'a> {
    pub fn new(resolver: NameResolver<'a>) -> Self {
        Self { resolver }
    }

    /// `{output: "$source"}` per selected column, identity always suppressed
    pub fn projection(&self, columns: &[Column]) -> GatewayResult<Document> {
        let mut projection = Document::new();
        for column in columns.iter().filter(|c| !c.is_wildcard()) {
            let output = self.resolver.output_name(column)?;
            let source = format!("${}", self.resolver.field(column)?);
            let expression = match column.aggregation {
                Some(Aggregation::Count) => {
                    let mut size = Document::new();
                    size.insert("$size", source);
                    Bson::Document(size)
                }
                _ => Bson::String(source),
            };
            projection.insert(output, expression);
        }
        projection.insert(ID_FIELD, 0);
        Ok(projection)
    }

    /// `{field: 1 | -1}` in ORDER BY order
    pub fn sort(&self, order: &OrderBy) -> GatewayResult<Document> {
        let mut sort = Document::new();
        for term in &order.terms {
            let field = self.resolver.field(&term.column)?;
            sort.insert(field, if term.ascending { 1 } else { -1 });
        }
        Ok(sort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Join;
    use bson::doc;

    #[test]
    fn test_plain_projection_suppresses_identity() {
        let compiler = ProjectionCompiler::new(NameResolver::new(None));
        let projection = compiler
            .projection(&[Column::new("name"), Column::new("age").with_alias("years")])
            .unwrap();
        assert_eq!(
            projection,
            doc! { "name": "$name", "years": "$age", "_id": 0 }
        );
    }

    #[test]
    fn test_wildcard_only_projection() {
        let compiler = ProjectionCompiler::new(NameResolver::new(None));
        let projection = compiler.projection(&[Column::wildcard()]).unwrap();
        assert_eq!(projection, doc! { "_id": 0 });
    }

    #[test]
    fn test_count_reads_set_cardinality() {
        let compiler = ProjectionCompiler::new(NameResolver::new(None));
        let projection = compiler
            .projection(&[
                Column::new("dept"),
                Column::aggregated(Aggregation::Count, "id"),
                Column::aggregated(Aggregation::Sum, "amt"),
            ])
            .unwrap();
        assert_eq!(
            projection,
            doc! {
                "dept": "$dept",
                "COUNT_id": { "$size": "$COUNT_id" },
                "SUM_amt": "$SUM_amt",
                "_id": 0
            }
        );
    }

    #[test]
    fn test_join_qualified_projection() {
        let join = Join::inner("orders", "id", "user_id");
        let compiler = ProjectionCompiler::new(NameResolver::new(Some(&join)));
        let projection = compiler.projection(&[Column::joined("total")]).unwrap();
        assert_eq!(
            projection,
            doc! { "join_orders.total": "$join_orders.total", "_id": 0 }
        );
    }

    #[test]
    fn test_sort_preserves_order() {
        let compiler = ProjectionCompiler::new(NameResolver::new(None));
        let order = OrderBy::desc(Column::new("b")).then(Column::new("a"), true);
        let sort = compiler.sort(&order).unwrap();
        let keys: Vec<_> = sort.keys().cloned().collect();
        assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
        assert_eq!(sort, doc! { "b": -1, "a": 1 });
    }

    #[test]
    fn test_window_requires_positive_count() {
        assert_eq!(Window::from_limit(None), None);
        assert_eq!(
            Window::from_limit(Some(&Limit { offset: 5, count: 0 })),
            None
        );
        assert_eq!(
            Window::from_limit(Some(&Limit { offset: 5, count: 10 })),
            Some(Window { skip: 5, limit: 10 })
        );
    }
}
