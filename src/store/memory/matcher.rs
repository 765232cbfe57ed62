//! Query filter evaluation
//!
//! Supports top-level `$and` / `$or` / `$nor`, implicit equality and the
//! field operators `$eq $ne $gt $gte $lt $lte $in $nin $regex $options
//! $not $exists`. A field holding an array matches when any element does.

use std::cmp::Ordering;

use bson::{Bson, Document, Regex as BsonRegex};
use regex::{Regex, RegexBuilder};

use super::value::{compare, equals, get_path, type_class_matches};
use crate::store::CommandFailure;

type MatchResult = Result<bool, CommandFailure>;

/// Whether `document` satisfies `filter`
pub fn matches(document: &Document, filter: &Document) -> MatchResult {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => all_of(document, condition)?,
            "$or" => any_of(document, condition)?,
            "$nor" => !any_of(document, condition)?,
            op if op.starts_with('$') => {
                return Err(CommandFailure::bad_value(format!(
                    "unknown top level operator: {}",
                    op
                )))
            }
            field => field_matches(get_path(document, field), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn branches(condition: &Bson) -> Result<Vec<&Document>, CommandFailure> {
    let Bson::Array(items) = condition else {
        return Err(CommandFailure::bad_value("$and/$or/$nor must be an array"));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(document) => Ok(document),
            _ => Err(CommandFailure::bad_value(
                "$and/$or/$nor entries must be objects",
            )),
        })
        .collect()
}

fn all_of(document: &Document, condition: &Bson) -> MatchResult {
    for branch in branches(condition)? {
        if !matches(document, branch)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn any_of(document: &Document, condition: &Bson) -> MatchResult {
    for branch in branches(condition)? {
        if matches(document, branch)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn is_operator_document(condition: &Bson) -> bool {
    match condition {
        Bson::Document(document) => document
            .keys()
            .next()
            .map_or(false, |key| key.starts_with('$')),
        _ => false,
    }
}

fn field_matches(actual: Option<&Bson>, condition: &Bson) -> MatchResult {
    if !is_operator_document(condition) {
        return Ok(value_equals(actual, condition));
    }
    let Bson::Document(operators) = condition else {
        return Ok(false);
    };
    let options = operators.get_str("$options").unwrap_or("");
    for (op, operand) in operators {
        let satisfied = match op.as_str() {
            "$eq" => value_equals(actual, operand),
            "$ne" => !value_equals(actual, operand),
            "$gt" => ordered(actual, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(actual, operand, |o| o != Ordering::Less),
            "$lt" => ordered(actual, operand, |o| o == Ordering::Less),
            "$lte" => ordered(actual, operand, |o| o != Ordering::Greater),
            "$in" => in_list(actual, operand)?,
            "$nin" => !in_list(actual, operand)?,
            "$exists" => actual.is_some() == truthy(operand),
            "$regex" => regex_matches(actual, &compile_regex(operand, options)?),
            "$options" => true,
            "$not" => !field_matches(actual, operand)?,
            other => {
                return Err(CommandFailure::bad_value(format!(
                    "unknown operator: {}",
                    other
                )))
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Candidate values for a comparison: the value itself, plus array elements
fn candidates(actual: &Bson) -> Vec<&Bson> {
    let mut values = vec![actual];
    if let Bson::Array(items) = actual {
        values.extend(items.iter());
    }
    values
}

fn value_equals(actual: Option<&Bson>, expected: &Bson) -> bool {
    match actual {
        // missing fields equal null
        None => matches!(expected, Bson::Null),
        Some(actual) => candidates(actual).into_iter().any(|v| {
            if let Bson::RegularExpression(regex) = expected {
                if !matches!(v, Bson::RegularExpression(_)) {
                    return compile_bson_regex(regex).map_or(false, |r| string_matches(v, &r));
                }
            }
            equals(v, expected)
        }),
    }
}

fn ordered(actual: Option<&Bson>, bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(actual) = actual else {
        return matches!(bound, Bson::Null) && accept(Ordering::Equal);
    };
    candidates(actual)
        .into_iter()
        .filter(|v| type_class_matches(v, bound))
        .any(|v| accept(compare(v, bound)))
}

fn in_list(actual: Option<&Bson>, operand: &Bson) -> MatchResult {
    let Bson::Array(options) = operand else {
        return Err(CommandFailure::bad_value("$in/$nin needs an array"));
    };
    Ok(options.iter().any(|option| value_equals(actual, option)))
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        Bson::Int32(v) => *v != 0,
        Bson::Int64(v) => *v != 0,
        Bson::Double(v) => *v != 0.0,
        _ => true,
    }
}

fn compile_regex(operand: &Bson, options: &str) -> Result<Regex, CommandFailure> {
    match operand {
        Bson::String(pattern) => build_regex(pattern, options),
        Bson::RegularExpression(regex) => {
            let merged = if options.is_empty() {
                regex.options.as_str()
            } else {
                options
            };
            build_regex(&regex.pattern, merged)
        }
        _ => Err(CommandFailure::bad_value("$regex has to be a string")),
    }
}

fn compile_bson_regex(regex: &BsonRegex) -> Result<Regex, CommandFailure> {
    build_regex(&regex.pattern, &regex.options)
}

fn build_regex(pattern: &str, options: &str) -> Result<Regex, CommandFailure> {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map_err(|e| CommandFailure::bad_value(format!("invalid regular expression: {}", e)))
}

fn string_matches(value: &Bson, regex: &Regex) -> bool {
    match value {
        Bson::String(s) | Bson::Symbol(s) => regex.is_match(s),
        _ => false,
    }
}

fn regex_matches(actual: Option<&Bson>, regex: &Regex) -> bool {
    actual.map_or(false, |actual| {
        candidates(actual)
            .into_iter()
            .any(|v| string_matches(v, regex))
    })
}
