//! Auto-increment emulation
//!
//! The store has no sequences. The next key is the current maximum of the
//! column plus one, read with an ordinary SELECT just before the insert.
//! Two writers sampling the same maximum will generate the same key.

use bson::{Bson, Document};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::codec::from_decimal128;
use crate::errors::{GatewayError, GatewayResult};
use crate::planner::AutoIncrementSlot;
use crate::query::{Column, OrderBy, Select};

/// Key used when the collection holds no value for the column yet
pub const FIRST_KEY: i64 = 1;

/// SELECT column FROM collection ORDER BY column DESC LIMIT 1
pub fn max_key_query(slot: &AutoIncrementSlot) -> Select {
    Select::from(&slot.collection)
        .column(Column::new(&slot.column))
        .order_by(OrderBy::desc(Column::new(&slot.column)))
        .limit(0, 1)
}

/// Next key given the sampled row, if any
pub fn next_key(column: &str, sampled: Option<&Document>) -> GatewayResult<i64> {
    let value = match sampled.and_then(|d| d.get(column)) {
        None | Some(Bson::Null) => return Ok(FIRST_KEY),
        Some(value) => value,
    };
    let current = integral(value)
        .ok_or_else(|| GatewayError::non_numeric_auto_increment(column, value))?;
    current
        .checked_add(1)
        .ok_or_else(|| GatewayError::non_numeric_auto_increment(column, "overflowing key"))
}

fn integral(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
        Bson::Decimal128(v) => from_decimal128(v)
            .filter(|d: &Decimal| d.fract().is_zero())
            .and_then(|d| d.to_i64()),
        Bson::String(v) => v.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::to_decimal128;
    use crate::errors::ErrorKind;
    use bson::doc;

    #[test]
    fn test_empty_collection_starts_at_one() {
        assert_eq!(next_key("id", None).unwrap(), 1);
        assert_eq!(next_key("id", Some(&doc! {})).unwrap(), 1);
        assert_eq!(next_key("id", Some(&doc! { "id": Bson::Null })).unwrap(), 1);
    }

    #[test]
    fn test_numeric_samples() {
        assert_eq!(next_key("id", Some(&doc! { "id": 4 })).unwrap(), 5);
        assert_eq!(next_key("id", Some(&doc! { "id": 9_i64 })).unwrap(), 10);
        assert_eq!(next_key("id", Some(&doc! { "id": 2.0 })).unwrap(), 3);
        assert_eq!(next_key("id", Some(&doc! { "id": "41" })).unwrap(), 42);
        let decimal = to_decimal128(Decimal::new(7, 0));
        assert_eq!(next_key("id", Some(&doc! { "id": decimal })).unwrap(), 8);
    }

    #[test]
    fn test_non_numeric_sample_rejected() {
        for value in [Bson::String("abc".into()), Bson::Double(1.5), Bson::Boolean(true)] {
            let err = next_key("id", Some(&doc! { "id": value })).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NonNumericAutoIncrement);
        }
    }

    #[test]
    fn test_max_key_query_shape() {
        let slot = AutoIncrementSlot {
            collection: "users".into(),
            column: "id".into(),
        };
        let select = max_key_query(&slot);
        assert_eq!(select.collection, "users");
        assert_eq!(select.columns.len(), 1);
        assert_eq!(select.limit.as_ref().map(|l| l.count), Some(1));
    }
}
