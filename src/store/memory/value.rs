//! BSON value semantics of the in-process store
//!
//! Ordering rules:
//! - values of different types order by type class
//!   (minKey < null < numbers < strings < objects < arrays < binData <
//!   objectId < bool < date < timestamp < regex < maxKey)
//! - numbers compare by value across int/long/double/decimal

use std::cmp::Ordering;

use bson::{Bson, Document};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::codec::{from_decimal128, to_decimal128};

fn type_class(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::DbPointer(_) | Bson::JavaScriptCode(_) | Bson::JavaScriptCodeWithScope(_) => 12,
        Bson::MaxKey => 13,
    }
}

/// Whether two values belong to the same comparison class
pub fn type_class_matches(a: &Bson, b: &Bson) -> bool {
    type_class(a) == type_class(b)
}

/// Numeric view of a value
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
    Exact(Decimal),
}

impl Number {
    pub(crate) fn of(value: &Bson) -> Option<Number> {
        match value {
            Bson::Int32(v) => Some(Number::Int(i64::from(*v))),
            Bson::Int64(v) => Some(Number::Int(*v)),
            Bson::Double(v) => Some(Number::Float(*v)),
            Bson::Decimal128(v) => from_decimal128(v).map(Number::Exact),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
            Number::Exact(v) => v.to_f64().unwrap_or(f64::NAN),
        }
    }

    fn as_decimal(self) -> Option<Decimal> {
        match self {
            Number::Int(v) => Some(Decimal::from(v)),
            Number::Float(v) => Decimal::from_f64(v),
            Number::Exact(v) => Some(v),
        }
    }

    fn compare(self, other: Number) -> Ordering {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.cmp(&b),
            (Number::Exact(_), Number::Float(_)) | (Number::Float(_), Number::Exact(_)) => self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(Ordering::Equal),
            (Number::Exact(_), _) | (_, Number::Exact(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => Ordering::Equal,
                }
            }
            _ => self
                .as_f64()
                .partial_cmp(&other.as_f64())
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Total order over BSON values
pub fn compare(a: &Bson, b: &Bson) -> Ordering {
    let by_class = type_class(a).cmp(&type_class(b));
    if by_class != Ordering::Equal {
        return by_class;
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.cmp(y),
        (Bson::String(x), Bson::Symbol(y)) | (Bson::Symbol(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => compare_documents(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ordering = compare(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Binary(x), Bson::Binary(y)) => x.bytes.cmp(&y.bytes),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.timestamp_millis().cmp(&y.timestamp_millis()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => {
            (&x.pattern, &x.options).cmp(&(&y.pattern, &y.options))
        }
        _ => match (Number::of(a), Number::of(b)) {
            (Some(x), Some(y)) => x.compare(y),
            _ => Ordering::Equal,
        },
    }
}

fn compare_documents(x: &Document, y: &Document) -> Ordering {
    for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
        let ordering = compare(lv, rv).then_with(|| lk.cmp(rk));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    x.len().cmp(&y.len())
}

pub fn equals(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Ordering::Equal
}

/// Name reported by the `$type` operator
pub fn type_name(value: Option<&Bson>) -> &'static str {
    let Some(value) = value else {
        return "missing";
    };
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::DbPointer(_) => "dbPointer",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
    }
}

pub fn is_numeric(value: &Bson) -> bool {
    Number::of(value).is_some()
}

/// Sum of two numbers, widening int -> long -> double / decimal
pub fn add(a: &Bson, b: &Bson) -> Option<Bson> {
    let (x, y) = (Number::of(a)?, Number::of(b)?);
    let result = match (a, b, x, y) {
        (Bson::Int32(l), Bson::Int32(r), _, _) => match l.checked_add(*r) {
            Some(v) => Bson::Int32(v),
            None => Bson::Int64(i64::from(*l) + i64::from(*r)),
        },
        (_, _, Number::Int(l), Number::Int(r)) => match l.checked_add(r) {
            Some(v) => Bson::Int64(v),
            None => Bson::Double(l as f64 + r as f64),
        },
        (_, _, Number::Exact(_), _) | (_, _, _, Number::Exact(_)) => {
            let sum = x.as_decimal()?.checked_add(y.as_decimal()?)?;
            Bson::Decimal128(to_decimal128(sum))
        }
        _ => Bson::Double(x.as_f64() + y.as_f64()),
    };
    Some(result)
}

/// Quotient used by `$avg`: double, or decimal when any input was decimal
pub fn divide(total: &Bson, count: usize) -> Option<Bson> {
    match Number::of(total)? {
        Number::Exact(v) => {
            let quotient = v.checked_div(Decimal::from(count))?;
            Some(Bson::Decimal128(to_decimal128(quotient)))
        }
        other => Some(Bson::Double(other.as_f64() / count as f64)),
    }
}

/// Value at a dotted path
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = document.get(first)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a dotted path, creating intermediate documents
pub fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            let needs_document = !matches!(document.get(head), Some(Bson::Document(_)));
            if needs_document {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Removes a dotted path, returning the removed value
pub fn remove_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}
