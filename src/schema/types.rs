//! Runtime type tags
//!
//! Names follow the store's `$type` aggregation operator.

use std::collections::HashMap;
use std::fmt;

use bson::Bson;

/// Sampled runtime type of a column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Double,
    String,
    Object,
    Array,
    BinData,
    Undefined,
    ObjectId,
    Bool,
    Date,
    Null,
    Regex,
    Int,
    Timestamp,
    Long,
    Decimal,
    Missing,
    /// Any other tag reported by the store
    Other(String),
}

impl TypeTag {
    pub fn parse(tag: &str) -> TypeTag {
        match tag {
            "double" => TypeTag::Double,
            "string" => TypeTag::String,
            "object" => TypeTag::Object,
            "array" => TypeTag::Array,
            "binData" => TypeTag::BinData,
            "undefined" => TypeTag::Undefined,
            "objectId" => TypeTag::ObjectId,
            "bool" => TypeTag::Bool,
            "date" => TypeTag::Date,
            "null" => TypeTag::Null,
            "regex" => TypeTag::Regex,
            "int" => TypeTag::Int,
            "timestamp" => TypeTag::Timestamp,
            "long" => TypeTag::Long,
            "decimal" => TypeTag::Decimal,
            "missing" => TypeTag::Missing,
            other => TypeTag::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TypeTag::Double => "double",
            TypeTag::String => "string",
            TypeTag::Object => "object",
            TypeTag::Array => "array",
            TypeTag::BinData => "binData",
            TypeTag::Undefined => "undefined",
            TypeTag::ObjectId => "objectId",
            TypeTag::Bool => "bool",
            TypeTag::Date => "date",
            TypeTag::Null => "null",
            TypeTag::Regex => "regex",
            TypeTag::Int => "int",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Long => "long",
            TypeTag::Decimal => "decimal",
            TypeTag::Missing => "missing",
            TypeTag::Other(tag) => tag,
        }
    }

    /// Tag of a concrete value, as `$type` would report it
    pub fn of(value: &Bson) -> TypeTag {
        match value {
            Bson::Double(_) => TypeTag::Double,
            Bson::String(_) => TypeTag::String,
            Bson::Document(_) => TypeTag::Object,
            Bson::Array(_) => TypeTag::Array,
            Bson::Binary(_) => TypeTag::BinData,
            Bson::Undefined => TypeTag::Undefined,
            Bson::ObjectId(_) => TypeTag::ObjectId,
            Bson::Boolean(_) => TypeTag::Bool,
            Bson::DateTime(_) => TypeTag::Date,
            Bson::Null => TypeTag::Null,
            Bson::RegularExpression(_) => TypeTag::Regex,
            Bson::Int32(_) => TypeTag::Int,
            Bson::Timestamp(_) => TypeTag::Timestamp,
            Bson::Int64(_) => TypeTag::Long,
            Bson::Decimal128(_) => TypeTag::Decimal,
            Bson::JavaScriptCode(_) => TypeTag::Other("javascript".into()),
            Bson::JavaScriptCodeWithScope(_) => TypeTag::Other("javascriptWithScope".into()),
            Bson::Symbol(_) => TypeTag::Other("symbol".into()),
            Bson::DbPointer(_) => TypeTag::Other("dbPointer".into()),
            Bson::MaxKey => TypeTag::Other("maxKey".into()),
            Bson::MinKey => TypeTag::Other("minKey".into()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeTag::Int | TypeTag::Long | TypeTag::Double | TypeTag::Decimal
        )
    }

    /// Reconciles the sampled tag of a column with the tag of one value.
    ///
    /// The value's own tag wins, except that integers keep a sampled
    /// double/decimal tag and are widened into it.
    pub fn reconcile(&self, actual: &TypeTag) -> TypeTag {
        match (self, actual) {
            (nominal, actual) if nominal == actual => nominal.clone(),
            (TypeTag::Double | TypeTag::Decimal, TypeTag::Int | TypeTag::Long) => self.clone(),
            (_, actual) => actual.clone(),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Column name -> sampled type tag, for one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeMap {
    tags: HashMap<String, TypeTag>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, tag: TypeTag) {
        self.tags.insert(column.into(), tag);
    }

    pub fn get(&self, column: &str) -> Option<&TypeTag> {
        self.tags.get(column)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
