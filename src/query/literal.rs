//! Typed literal values
//!
//! Literals arrive already discriminated by the upstream value extraction,
//! one variant per source tag. They are consumed directly by the planner
//! and never round-trip through text.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Source tag of a literal as produced by the upstream extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralTag {
    Object,
    String,
    Bool,
    SByte,
    Short,
    Integer,
    Long,
    Byte,
    UShort,
    UInteger,
    ULong,
    Float,
    Double,
    Decimal,
    LocalDateTime,
    LocalDate,
    LocalTime,
    List,
}

impl LiteralTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiteralTag::Object => "object",
            LiteralTag::String => "string",
            LiteralTag::Bool => "bool",
            LiteralTag::SByte => "sbyte",
            LiteralTag::Short => "short",
            LiteralTag::Integer => "integer",
            LiteralTag::Long => "long",
            LiteralTag::Byte => "byte",
            LiteralTag::UShort => "ushort",
            LiteralTag::UInteger => "uinteger",
            LiteralTag::ULong => "ulong",
            LiteralTag::Float => "float",
            LiteralTag::Double => "double",
            LiteralTag::Decimal => "decimal",
            LiteralTag::LocalDateTime => "localdatetime",
            LiteralTag::LocalDate => "localdate",
            LiteralTag::LocalTime => "localtime",
            LiteralTag::List => "list",
        }
    }
}

impl fmt::Display for LiteralTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A literal value carried by a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Literal {
    /// Untyped object slot; only ever null
    Null,
    String(String),
    Bool(bool),
    SByte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Byte(u8),
    UShort(u16),
    UInteger(u32),
    ULong(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    LocalDateTime(NaiveDateTime),
    LocalDate(NaiveDate),
    LocalTime(NaiveTime),
    /// Right-hand side of IN / NOT IN
    List(Vec<Literal>),
}

impl Literal {
    /// Returns the source tag of this literal
    pub fn tag(&self) -> LiteralTag {
        match self {
            Literal::Null => LiteralTag::Object,
            Literal::String(_) => LiteralTag::String,
            Literal::Bool(_) => LiteralTag::Bool,
            Literal::SByte(_) => LiteralTag::SByte,
            Literal::Short(_) => LiteralTag::Short,
            Literal::Integer(_) => LiteralTag::Integer,
            Literal::Long(_) => LiteralTag::Long,
            Literal::Byte(_) => LiteralTag::Byte,
            Literal::UShort(_) => LiteralTag::UShort,
            Literal::UInteger(_) => LiteralTag::UInteger,
            Literal::ULong(_) => LiteralTag::ULong,
            Literal::Float(_) => LiteralTag::Float,
            Literal::Double(_) => LiteralTag::Double,
            Literal::Decimal(_) => LiteralTag::Decimal,
            Literal::LocalDateTime(_) => LiteralTag::LocalDateTime,
            Literal::LocalDate(_) => LiteralTag::LocalDate,
            Literal::LocalTime(_) => LiteralTag::LocalTime,
            Literal::List(_) => LiteralTag::List,
        }
    }

    /// Returns true for the null literal
    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }

    /// Returns the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Integer(i)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Long(i)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Double(f)
    }
}

impl From<Decimal> for Literal {
    fn from(d: Decimal) -> Self {
        Literal::Decimal(d)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(dt: NaiveDateTime) -> Self {
        Literal::LocalDateTime(dt)
    }
}

impl From<NaiveDate> for Literal {
    fn from(d: NaiveDate) -> Self {
        Literal::LocalDate(d)
    }
}

impl From<NaiveTime> for Literal {
    fn from(t: NaiveTime) -> Self {
        Literal::LocalTime(t)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Literal::Null)
    }
}
