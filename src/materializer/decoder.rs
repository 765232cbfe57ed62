//! Result document decoding

use bson::{Bson, Document};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::row::{CellValue, Row};
use crate::codec::{bson_to_local, from_decimal128, parse_time_literal, timestamp_to_local};
use crate::compiler::ID_FIELD;
use crate::errors::{GatewayError, GatewayResult};
use crate::schema::{TypeMap, TypeTag};

/// String the store may hold in place of a real null
const NULL_LITERAL: &str = "NULL";

/// Decodes result documents into rows using one query's type map
#[derive(Debug, Clone, Copy)]
pub struct RowMaterializer<'a> {
    types: &'a TypeMap,
    join_prefix: Option<&'a str>,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(types: &'a TypeMap) -> Self {
        Self {
            types,
            join_prefix: None,
        }
    }

    /// Flattens the sub-document embedded under `prefix`
    pub fn with_join_prefix(mut self, prefix: &'a str) -> Self {
        self.join_prefix = Some(prefix);
        self
    }

    pub fn materialize(&self, document: &Document) -> GatewayResult<Row> {
        let mut row = Row::new();
        for (key, value) in document {
            if key == ID_FIELD {
                continue;
            }
            match (self.join_prefix, value) {
                (Some(prefix), Bson::Document(embedded)) if key == prefix => {
                    for (sub, value) in embedded {
                        if sub == ID_FIELD {
                            continue;
                        }
                        let qualified = format!("{}.{}", prefix, sub);
                        let cell = self.decode(&qualified, value)?;
                        // a base column of the same name keeps the bare name
                        if document.contains_key(sub) {
                            row.insert(qualified, cell);
                        } else {
                            row.insert(sub.clone(), cell);
                        }
                    }
                }
                _ => {
                    let cell = self.decode(key, value)?;
                    row.insert(key.clone(), cell);
                }
            }
        }
        Ok(row)
    }

    pub fn materialize_all(&self, documents: &[Document]) -> GatewayResult<Vec<Row>> {
        documents.iter().map(|d| self.materialize(d)).collect()
    }

    /// Columns no probe covered decode by the value's own tag
    fn decode(&self, column: &str, value: &Bson) -> GatewayResult<CellValue> {
        let nominal = self.types.get(column).unwrap_or(&TypeTag::Missing);
        decode_value(column, nominal, value)
    }
}

/// Decodes one value under its column's sampled type tag
pub fn decode_value(column: &str, nominal: &TypeTag, value: &Bson) -> GatewayResult<CellValue> {
    match value {
        Bson::Null | Bson::Undefined => return Ok(CellValue::Null),
        Bson::String(s) if s == NULL_LITERAL => return Ok(CellValue::Null),
        _ => {}
    }

    let tag = nominal.reconcile(&TypeTag::of(value));
    let mismatch = || {
        GatewayError::unknown_column_type(column, tag.as_str())
    };
    match (&tag, value) {
        (TypeTag::Int, Bson::Int32(v)) => Ok(CellValue::Int(*v)),
        (TypeTag::Long, Bson::Int64(v)) => Ok(CellValue::Long(*v)),
        (TypeTag::Double, Bson::Double(v)) => Ok(CellValue::Double(*v)),
        (TypeTag::Double, Bson::Int32(v)) => Ok(CellValue::Double(f64::from(*v))),
        (TypeTag::Double, Bson::Int64(v)) => Ok(CellValue::Double(*v as f64)),
        (TypeTag::Decimal, Bson::Decimal128(v)) => from_decimal128(v)
            .map(CellValue::Decimal)
            .ok_or_else(|| {
                GatewayError::execution_failed(format!(
                    "column '{}' holds a decimal outside the supported range",
                    column
                ))
            }),
        (TypeTag::Decimal, Bson::Int32(v)) => Ok(CellValue::Decimal(Decimal::from(*v))),
        (TypeTag::Decimal, Bson::Int64(v)) => Ok(CellValue::Decimal(Decimal::from(*v))),
        (TypeTag::Decimal, Bson::Double(v)) => Decimal::from_f64(*v)
            .map(CellValue::Decimal)
            .ok_or_else(mismatch),
        (TypeTag::Bool, Bson::Boolean(v)) => Ok(CellValue::Bool(*v)),
        (TypeTag::String, Bson::String(v)) => Ok(match parse_time_literal(v) {
            Some(time) => CellValue::Time(time),
            None => CellValue::String(v.clone()),
        }),
        (TypeTag::Date, Bson::DateTime(v)) => bson_to_local(v)
            .map(CellValue::DateTime)
            .ok_or_else(mismatch),
        (TypeTag::Timestamp, Bson::Timestamp(v)) => timestamp_to_local(v)
            .map(CellValue::DateTime)
            .ok_or_else(mismatch),
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{local_to_bson, to_decimal128};
    use crate::errors::ErrorKind;
    use bson::doc;
    use chrono::{NaiveDate, NaiveTime};

    fn types(entries: &[(&str, TypeTag)]) -> TypeMap {
        let mut map = TypeMap::new();
        for (column, tag) in entries {
            map.insert(*column, tag.clone());
        }
        map
    }

    #[test]
    fn test_decodes_native_scalars() {
        let map = types(&[
            ("name", TypeTag::String),
            ("age", TypeTag::Int),
            ("big", TypeTag::Long),
            ("score", TypeTag::Double),
            ("ok", TypeTag::Bool),
            ("price", TypeTag::Decimal),
        ]);
        let price = Decimal::new(1999, 2);
        let document = doc! {
            "_id": 1,
            "name": "ada",
            "age": 36,
            "big": 5_000_000_000_i64,
            "score": 1.5,
            "ok": true,
            "price": to_decimal128(price),
        };
        let row = RowMaterializer::new(&map).materialize(&document).unwrap();
        assert!(!row.contains("_id"));
        assert_eq!(row.get("name"), Some(&CellValue::String("ada".into())));
        assert_eq!(row.get("age"), Some(&CellValue::Int(36)));
        assert_eq!(row.get("big"), Some(&CellValue::Long(5_000_000_000)));
        assert_eq!(row.get("score"), Some(&CellValue::Double(1.5)));
        assert_eq!(row.get("ok"), Some(&CellValue::Bool(true)));
        assert_eq!(row.get("price"), Some(&CellValue::Decimal(price)));
    }

    #[test]
    fn test_dates_and_times() {
        let map = types(&[("at", TypeTag::Date), ("clock", TypeTag::String)]);
        let at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let document = doc! { "at": local_to_bson(&at), "clock": "08:15:00" };
        let row = RowMaterializer::new(&map).materialize(&document).unwrap();
        assert_eq!(row.get("at"), Some(&CellValue::DateTime(at)));
        assert_eq!(
            row.get("clock"),
            Some(&CellValue::Time(NaiveTime::from_hms_opt(8, 15, 0).unwrap()))
        );
    }

    #[test]
    fn test_null_forms() {
        let map = types(&[("a", TypeTag::Int), ("b", TypeTag::String)]);
        let document = doc! { "a": Bson::Null, "b": "NULL" };
        let row = RowMaterializer::new(&map).materialize(&document).unwrap();
        assert_eq!(row.get("a"), Some(&CellValue::Null));
        assert_eq!(row.get("b"), Some(&CellValue::Null));
    }

    #[test]
    fn test_mixed_numeric_column() {
        // sampled as int, this row stores a double
        let row = RowMaterializer::new(&types(&[("n", TypeTag::Int)]))
            .materialize(&doc! { "n": 2.5 })
            .unwrap();
        assert_eq!(row.get("n"), Some(&CellValue::Double(2.5)));

        // sampled as double, this row stores an int
        let row = RowMaterializer::new(&types(&[("n", TypeTag::Double)]))
            .materialize(&doc! { "n": 2 })
            .unwrap();
        assert_eq!(row.get("n"), Some(&CellValue::Double(2.0)));
    }

    #[test]
    fn test_count_over_string_column() {
        let row = RowMaterializer::new(&types(&[("COUNT_id", TypeTag::String)]))
            .materialize(&doc! { "COUNT_id": 3 })
            .unwrap();
        assert_eq!(row.get("COUNT_id"), Some(&CellValue::Int(3)));
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = RowMaterializer::new(&types(&[("tags", TypeTag::Array)]))
            .materialize(&doc! { "tags": [1, 2] })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownColumnType);
    }

    #[test]
    fn test_untyped_column_decodes_by_own_tag() {
        let row = RowMaterializer::new(&TypeMap::new())
            .materialize(&doc! { "x": 1, "y": "text" })
            .unwrap();
        assert_eq!(row.get("x"), Some(&CellValue::Int(1)));
        assert_eq!(row.get("y"), Some(&CellValue::String("text".into())));
    }

    #[test]
    fn test_join_flattening() {
        let map = types(&[
            ("name", TypeTag::String),
            ("join_orders.total", TypeTag::Double),
            ("join_orders.name", TypeTag::String),
        ]);
        let document = doc! {
            "name": "ada",
            "join_orders": { "_id": 9, "total": 9.5, "name": "book" },
        };
        let row = RowMaterializer::new(&map)
            .with_join_prefix("join_orders")
            .materialize(&document)
            .unwrap();
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["name", "total", "join_orders.name"]
        );
        assert_eq!(row.get("total"), Some(&CellValue::Double(9.5)));
        assert_eq!(
            row.get("join_orders.name"),
            Some(&CellValue::String("book".into()))
        );
    }
}
