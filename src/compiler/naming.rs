//! Column-name resolution
//!
//! Aggregated columns are addressed as `<AGG>_<name>`, join-sourced
//! columns as `join_<collection>.<name>`, everything else by its bare name.

use crate::errors::{GatewayError, GatewayResult};
use crate::query::{Aggregation, Column, Join};

/// Prefix of the sub-document holding a joined row
pub fn join_prefix(collection: &str) -> String {
    format!("join_{}", collection)
}

/// Field name of an aggregated column
pub fn aggregated_name(aggregation: Aggregation, name: &str) -> String {
    format!("{}_{}", aggregation.as_str(), name)
}

/// Removes a known aggregation prefix, if present
pub fn strip_aggregation_prefix(name: &str) -> &str {
    for aggregation in Aggregation::ALL {
        if let Some(rest) = name
            .strip_prefix(aggregation.as_str())
            .and_then(|r| r.strip_prefix('_'))
        {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    name
}

/// Resolves column references against the (optional) join of a statement
#[derive(Debug, Clone, Copy, Default)]
pub struct NameResolver<'a> {
    join: Option<&'a Join>,
}

impl<'a> NameResolver<'a> {
    pub fn new(join: Option<&'a Join>) -> Self {
        Self { join }
    }

    /// Field name used by filters, sorts and projections
    pub fn field(&self, column: &Column) -> GatewayResult<String> {
        match (column.aggregation, column.join_sourced) {
            (Some(_), true) => Err(GatewayError::unsupported_aggregation(format!(
                "column '{}' cannot be both aggregated and join-sourced",
                column.name
            ))),
            (Some(aggregation), false) => Ok(aggregated_name(aggregation, &column.name)),
            (None, true) => Ok(format!("{}.{}", self.join_prefix()?, column.name)),
            (None, false) => Ok(column.name.clone()),
        }
    }

    /// Name the column carries in result rows
    pub fn output_name(&self, column: &Column) -> GatewayResult<String> {
        match &column.alias {
            Some(alias) => {
                // aliases never bypass the aggregation/join check
                self.field(column)?;
                Ok(alias.clone())
            }
            None => self.field(column),
        }
    }

    /// Prefix under which the joined document is embedded
    pub fn join_prefix(&self) -> GatewayResult<String> {
        self.join
            .map(|j| join_prefix(&j.collection))
            .ok_or_else(|| GatewayError::unsupported_join("join-sourced column without a join"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_plain_and_aggregated_names() {
        let resolver = NameResolver::new(None);
        assert_eq!(resolver.field(&Column::new("total")).unwrap(), "total");
        assert_eq!(
            resolver
                .field(&Column::aggregated(Aggregation::Sum, "total"))
                .unwrap(),
            "SUM_total"
        );
    }

    #[test]
    fn test_join_sourced_name() {
        let join = Join::inner("orders", "id", "user_id");
        let resolver = NameResolver::new(Some(&join));
        assert_eq!(
            resolver.field(&Column::joined("amount")).unwrap(),
            "join_orders.amount"
        );
    }

    #[test]
    fn test_aggregated_join_column_rejected() {
        let join = Join::inner("orders", "id", "user_id");
        let resolver = NameResolver::new(Some(&join));
        let column = Column::joined("amount").with_aggregation(Aggregation::Max);
        let err = resolver.field(&column).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAggregation);
    }

    #[test]
    fn test_join_column_without_join_rejected() {
        let err = NameResolver::new(None)
            .field(&Column::joined("amount"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedJoin);
    }

    #[test]
    fn test_alias_wins_for_output() {
        let resolver = NameResolver::new(None);
        let column = Column::aggregated(Aggregation::Avg, "age").with_alias("mean_age");
        assert_eq!(resolver.output_name(&column).unwrap(), "mean_age");
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_aggregation_prefix("SUM_amt"), "amt");
        assert_eq!(strip_aggregation_prefix("COUNT_id"), "id");
        assert_eq!(strip_aggregation_prefix("SUMMARY"), "SUMMARY");
        assert_eq!(strip_aggregation_prefix("MAX_"), "MAX_");
        assert_eq!(strip_aggregation_prefix("name"), "name");
    }
}
