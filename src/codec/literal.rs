//! Literal to store-native scalar coercion
//!
//! | literal | stored as |
//! |---|---|
//! | sbyte, short, integer, byte, ushort | int |
//! | long, uinteger | long |
//! | ulong | long, or decimal above `i64::MAX` |
//! | float, double | double |
//! | decimal | decimal |
//! | localdatetime, localdate | date |
//! | localtime | string `HH:MM:SS[.f]` |

use bson::Bson;
use rust_decimal::Decimal;

use super::decimal::to_decimal128;
use super::temporal::{date_to_bson, local_to_bson, time_to_string};
use crate::query::Literal;

/// Coerce a literal to the store's native scalar type
pub fn literal_to_bson(literal: &Literal) -> Bson {
    match literal {
        Literal::Null => Bson::Null,
        Literal::String(s) => Bson::String(s.clone()),
        Literal::Bool(b) => Bson::Boolean(*b),
        Literal::SByte(v) => Bson::Int32(i32::from(*v)),
        Literal::Short(v) => Bson::Int32(i32::from(*v)),
        Literal::Integer(v) => Bson::Int32(*v),
        Literal::Byte(v) => Bson::Int32(i32::from(*v)),
        Literal::UShort(v) => Bson::Int32(i32::from(*v)),
        Literal::Long(v) => Bson::Int64(*v),
        Literal::UInteger(v) => Bson::Int64(i64::from(*v)),
        Literal::ULong(v) => match i64::try_from(*v) {
            Ok(v) => Bson::Int64(v),
            Err(_) => Bson::Decimal128(to_decimal128(Decimal::from(*v))),
        },
        Literal::Float(v) => Bson::Double(f64::from(*v)),
        Literal::Double(v) => Bson::Double(*v),
        Literal::Decimal(v) => Bson::Decimal128(to_decimal128(*v)),
        Literal::LocalDateTime(v) => Bson::DateTime(local_to_bson(v)),
        Literal::LocalDate(v) => Bson::DateTime(date_to_bson(v)),
        Literal::LocalTime(v) => Bson::String(time_to_string(v)),
        Literal::List(items) => Bson::Array(items.iter().map(literal_to_bson).collect()),
    }
}
