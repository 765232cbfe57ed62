//! Aggregation expressions
//!
//! `"$a.b"` reads a field path, `"$$ROOT"` the whole document. Operator
//! documents support `$size`, `$type`, `$mergeObjects`, `$literal` and
//! `$ifNull`. Evaluation yields `None` for a missing value.

use bson::{Bson, Document};

use super::value::{get_path, type_name};
use crate::store::CommandFailure;

pub type ExprResult = Result<Option<Bson>, CommandFailure>;

const ROOT: &str = "$$ROOT";

pub fn evaluate(expr: &Bson, root: &Document) -> ExprResult {
    match expr {
        Bson::String(path) if path.starts_with("$$") => variable(path, root),
        Bson::String(path) if path.starts_with('$') => Ok(get_path(root, &path[1..]).cloned()),
        Bson::Document(document) => match operator_of(document) {
            Some((op, operand)) => apply(op, operand, root),
            None => {
                let mut result = Document::new();
                for (key, value) in document {
                    if let Some(value) = evaluate(value, root)? {
                        result.insert(key.clone(), value);
                    }
                }
                Ok(Some(Bson::Document(result)))
            }
        },
        Bson::Array(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(item, root).map(|v| v.unwrap_or(Bson::Null)))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Bson::Array(values)))
        }
        literal => Ok(Some(literal.clone())),
    }
}

fn variable(path: &str, root: &Document) -> ExprResult {
    if path == ROOT {
        return Ok(Some(Bson::Document(root.clone())));
    }
    match path.strip_prefix(ROOT).and_then(|rest| rest.strip_prefix('.')) {
        Some(rest) => Ok(get_path(root, rest).cloned()),
        None => Err(CommandFailure::failed_to_parse(format!(
            "use of undefined variable: {}",
            path
        ))),
    }
}

fn operator_of(document: &Document) -> Option<(&str, &Bson)> {
    let mut entries = document.iter();
    let (key, value) = entries.next()?;
    if key.starts_with('$') && entries.next().is_none() {
        Some((key.as_str(), value))
    } else {
        None
    }
}

/// Arguments of an operator; a lone argument may be given without an array
fn arguments(operand: &Bson) -> Vec<&Bson> {
    match operand {
        Bson::Array(items) => items.iter().collect(),
        single => vec![single],
    }
}

fn apply(op: &str, operand: &Bson, root: &Document) -> ExprResult {
    match op {
        "$literal" => Ok(Some(operand.clone())),
        "$size" => {
            let args = arguments(operand);
            let [arg] = args.as_slice() else {
                return Err(CommandFailure::failed_to_parse("$size takes exactly one argument"));
            };
            match evaluate(arg, root)? {
                Some(Bson::Array(items)) => Ok(Some(Bson::Int32(items.len() as i32))),
                other => Err(CommandFailure::type_mismatch(format!(
                    "The argument to $size must be an array. Type of argument: {}",
                    type_name(other.as_ref())
                ))),
            }
        }
        "$type" => {
            let args = arguments(operand);
            let [arg] = args.as_slice() else {
                return Err(CommandFailure::failed_to_parse("$type takes exactly one argument"));
            };
            let value = evaluate(arg, root)?;
            Ok(Some(Bson::String(type_name(value.as_ref()).to_string())))
        }
        "$mergeObjects" => {
            let mut merged = Document::new();
            for arg in arguments(operand) {
                match evaluate(arg, root)? {
                    Some(Bson::Document(document)) => {
                        for (key, value) in document {
                            merged.insert(key, value);
                        }
                    }
                    None | Some(Bson::Null) => {}
                    Some(other) => {
                        return Err(CommandFailure::type_mismatch(format!(
                            "$mergeObjects requires object inputs, but input is of type {}",
                            type_name(Some(&other))
                        )))
                    }
                }
            }
            Ok(Some(Bson::Document(merged)))
        }
        "$ifNull" => {
            let args = arguments(operand);
            for arg in &args {
                match evaluate(arg, root)? {
                    None | Some(Bson::Null) => continue,
                    value => return Ok(value),
                }
            }
            Ok(Some(Bson::Null))
        }
        other => Err(CommandFailure::invalid_pipeline_operator(format!(
            "Unrecognized expression '{}'",
            other
        ))),
    }
}
