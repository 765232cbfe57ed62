//! Aggregation pipeline, projection and sort

use std::cmp::Ordering;

use bson::{Bson, Document};

use super::expr::evaluate;
use super::matcher::matches;
use super::value::{add, compare, divide, equals, get_path, remove_path, set_path};
use crate::store::CommandFailure;

type StageResult = Result<Vec<Document>, CommandFailure>;

/// Read access to sibling collections, for `$lookup`
pub trait CollectionSource {
    fn documents(&self, collection: &str) -> Vec<Document>;
}

pub fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    source: &dyn CollectionSource,
) -> StageResult {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(CommandFailure::failed_to_parse(
                "a pipeline stage specification object must contain exactly one field",
            ));
        };
        documents = match name.as_str() {
            "$match" => match_stage(documents, as_document(name, spec)?)?,
            "$project" => project_all(documents, as_document(name, spec)?)?,
            "$sort" => {
                sort_documents(&mut documents, as_document(name, spec)?)?;
                documents
            }
            "$skip" => documents.into_iter().skip(as_count(name, spec)?).collect(),
            "$limit" => {
                let limit = as_count(name, spec)?;
                if limit == 0 {
                    return Err(CommandFailure::bad_value("the limit must be positive"));
                }
                documents.into_iter().take(limit).collect()
            }
            "$lookup" => lookup(documents, as_document(name, spec)?, source)?,
            "$unwind" => unwind(documents, spec)?,
            "$group" => group(documents, as_document(name, spec)?)?,
            "$replaceRoot" => replace_root(documents, as_document(name, spec)?)?,
            "$count" => count(documents, spec)?,
            other => {
                return Err(CommandFailure::invalid_pipeline_operator(format!(
                    "Unrecognized pipeline stage name: '{}'",
                    other
                )))
            }
        };
    }
    Ok(documents)
}

fn as_document<'a>(stage: &str, spec: &'a Bson) -> Result<&'a Document, CommandFailure> {
    match spec {
        Bson::Document(document) => Ok(document),
        _ => Err(CommandFailure::failed_to_parse(format!(
            "{} specification must be an object",
            stage
        ))),
    }
}

fn as_count(stage: &str, spec: &Bson) -> Result<usize, CommandFailure> {
    let value = match spec {
        Bson::Int32(v) => i64::from(*v),
        Bson::Int64(v) => *v,
        Bson::Double(v) if v.fract() == 0.0 => *v as i64,
        _ => {
            return Err(CommandFailure::failed_to_parse(format!(
                "{} must be an integer",
                stage
            )))
        }
    };
    usize::try_from(value)
        .map_err(|_| CommandFailure::bad_value(format!("{} must be non-negative", stage)))
}

fn match_stage(documents: Vec<Document>, filter: &Document) -> StageResult {
    let mut kept = Vec::with_capacity(documents.len());
    for document in documents {
        if matches(&document, filter)? {
            kept.push(document);
        }
    }
    Ok(kept)
}

fn project_all(documents: Vec<Document>, spec: &Document) -> StageResult {
    documents.iter().map(|d| project(d, spec)).collect()
}

fn is_flag(value: &Bson) -> Option<bool> {
    match value {
        Bson::Boolean(b) => Some(*b),
        Bson::Int32(v) => Some(*v != 0),
        Bson::Int64(v) => Some(*v != 0),
        Bson::Double(v) => Some(*v != 0.0),
        _ => None,
    }
}

/// Applies a projection document.
///
/// Exclusion projections (`field: 0`) remove fields. Anything else is an
/// inclusion projection: `field: 1` copies, other values are expressions.
/// `_id` is kept unless excluded explicitly.
pub fn project(document: &Document, spec: &Document) -> Result<Document, CommandFailure> {
    let exclusion = spec
        .iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .all(|(_, value)| is_flag(value) == Some(false));

    if exclusion {
        let mut result = document.clone();
        for (key, value) in spec {
            if is_flag(value) == Some(false) {
                remove_path(&mut result, key);
            }
        }
        return Ok(result);
    }

    let mut result = Document::new();
    let keep_id = spec.get("_id").map_or(true, |v| is_flag(v) != Some(false));
    if keep_id {
        if let Some(id) = document.get("_id") {
            result.insert("_id", id.clone());
        }
    }
    for (key, value) in spec {
        if key == "_id" && is_flag(value).is_some() {
            continue;
        }
        match is_flag(value) {
            Some(true) => {
                if let Some(found) = get_path(document, key) {
                    set_path(&mut result, key, found.clone());
                }
            }
            Some(false) => {
                return Err(CommandFailure::new(
                    31254,
                    "Location31254",
                    format!("Cannot do exclusion on field {} in inclusion projection", key),
                ))
            }
            None => {
                if let Some(computed) = evaluate(value, document)? {
                    set_path(&mut result, key, computed);
                }
            }
        }
    }
    Ok(result)
}

/// Stable multi-key sort
pub fn sort_documents(documents: &mut [Document], spec: &Document) -> Result<(), CommandFailure> {
    let mut keys = Vec::with_capacity(spec.len());
    for (field, direction) in spec {
        let descending = match direction_of(direction) {
            Some(d) => d < 0,
            None => {
                return Err(CommandFailure::bad_value(format!(
                    "$sort key ordering must be 1 (for ascending) or -1 (for descending): {}",
                    field
                )))
            }
        };
        keys.push((field.as_str(), descending));
    }
    documents.sort_by(|a, b| {
        for (field, descending) in &keys {
            let left = get_path(a, field).unwrap_or(&Bson::Null);
            let right = get_path(b, field).unwrap_or(&Bson::Null);
            let ordering = compare(left, right);
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

fn direction_of(value: &Bson) -> Option<i64> {
    let direction = match value {
        Bson::Int32(v) => i64::from(*v),
        Bson::Int64(v) => *v,
        Bson::Double(v) => *v as i64,
        _ => return None,
    };
    matches!(direction, 1 | -1).then_some(direction)
}

fn lookup(
    documents: Vec<Document>,
    spec: &Document,
    source: &dyn CollectionSource,
) -> StageResult {
    let field = |name: &str| {
        spec.get_str(name).map_err(|_| {
            CommandFailure::failed_to_parse(format!("$lookup argument '{}' must be a string", name))
        })
    };
    let (from, local, foreign, target) = (
        field("from")?,
        field("localField")?,
        field("foreignField")?,
        field("as")?,
    );
    let foreign_documents = source.documents(from);

    let mut joined = Vec::with_capacity(documents.len());
    for mut document in documents {
        let key = get_path(&document, local).cloned().unwrap_or(Bson::Null);
        let matched: Vec<Bson> = foreign_documents
            .iter()
            .filter(|f| lookup_key_matches(&key, get_path(f, foreign).unwrap_or(&Bson::Null)))
            .map(|f| Bson::Document(f.clone()))
            .collect();
        set_path(&mut document, target, Bson::Array(matched));
        joined.push(document);
    }
    Ok(joined)
}

fn lookup_key_matches(local: &Bson, foreign: &Bson) -> bool {
    match local {
        Bson::Array(items) => items.iter().any(|item| equals(item, foreign)),
        local => equals(local, foreign),
    }
}

fn unwind(documents: Vec<Document>, spec: &Bson) -> StageResult {
    let (path, preserve) = match spec {
        Bson::String(path) => (path.as_str(), false),
        Bson::Document(options) => (
            options.get_str("path").map_err(|_| {
                CommandFailure::failed_to_parse("$unwind requires a 'path' option")
            })?,
            options
                .get_bool("preserveNullAndEmptyArrays")
                .unwrap_or(false),
        ),
        _ => {
            return Err(CommandFailure::failed_to_parse(
                "$unwind requires a string or object argument",
            ))
        }
    };
    let field = path.strip_prefix('$').ok_or_else(|| {
        CommandFailure::failed_to_parse("path option to $unwind stage should be prefixed with a '$'")
    })?;

    let mut unwound = Vec::new();
    for document in documents {
        match get_path(&document, field).cloned() {
            Some(Bson::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, field, item);
                    unwound.push(copy);
                }
            }
            Some(Bson::Array(_)) => {
                if preserve {
                    let mut copy = document.clone();
                    remove_path(&mut copy, field);
                    unwound.push(copy);
                }
            }
            None | Some(Bson::Null) => {
                if preserve {
                    unwound.push(document);
                }
            }
            Some(_) => unwound.push(document),
        }
    }
    Ok(unwound)
}

/// Running state of one accumulator
#[derive(Debug, Clone)]
enum Accumulator {
    Sum(Bson),
    Avg { total: Bson, count: usize },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
    AddToSet(Vec<Bson>),
    Push(Vec<Bson>),
}

impl Accumulator {
    fn new(op: &str) -> Result<Self, CommandFailure> {
        Ok(match op {
            "$sum" => Accumulator::Sum(Bson::Int32(0)),
            "$avg" => Accumulator::Avg {
                total: Bson::Int32(0),
                count: 0,
            },
            "$min" => Accumulator::Min(None),
            "$max" => Accumulator::Max(None),
            "$first" => Accumulator::First(None),
            "$last" => Accumulator::Last(Bson::Null),
            "$addToSet" => Accumulator::AddToSet(Vec::new()),
            "$push" => Accumulator::Push(Vec::new()),
            other => {
                return Err(CommandFailure::invalid_pipeline_operator(format!(
                    "unknown group operator '{}'",
                    other
                )))
            }
        })
    }

    fn accept(&mut self, value: Option<Bson>) {
        match self {
            Accumulator::Sum(total) => {
                if let Some(sum) = value.and_then(|v| add(total, &v)) {
                    *total = sum;
                }
            }
            Accumulator::Avg { total, count } => {
                if let Some(sum) = value.and_then(|v| add(total, &v)) {
                    *total = sum;
                    *count += 1;
                }
            }
            Accumulator::Min(current) => Self::extremum(current, value, Ordering::Less),
            Accumulator::Max(current) => Self::extremum(current, value, Ordering::Greater),
            Accumulator::First(first) => {
                if first.is_none() {
                    *first = Some(value.unwrap_or(Bson::Null));
                }
            }
            Accumulator::Last(last) => *last = value.unwrap_or(Bson::Null),
            Accumulator::AddToSet(set) => {
                if let Some(value) = value {
                    if !set.iter().any(|existing| equals(existing, &value)) {
                        set.push(value);
                    }
                }
            }
            Accumulator::Push(items) => items.push(value.unwrap_or(Bson::Null)),
        }
    }

    fn extremum(current: &mut Option<Bson>, value: Option<Bson>, wanted: Ordering) {
        let Some(value) = value.filter(|v| !matches!(v, Bson::Null | Bson::Undefined)) else {
            return;
        };
        let replace = match current {
            None => true,
            Some(existing) => compare(&value, existing) == wanted,
        };
        if replace {
            *current = Some(value);
        }
    }

    fn finish(self) -> Bson {
        match self {
            Accumulator::Sum(total) => total,
            Accumulator::Avg { total, count } => {
                if count == 0 {
                    Bson::Null
                } else {
                    divide(&total, count).unwrap_or(Bson::Null)
                }
            }
            Accumulator::Min(value) | Accumulator::Max(value) | Accumulator::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            Accumulator::Last(value) => value,
            Accumulator::AddToSet(items) | Accumulator::Push(items) => Bson::Array(items),
        }
    }
}

struct Group {
    key: Bson,
    accumulators: Vec<(String, Bson, Accumulator)>,
}

fn group(documents: Vec<Document>, spec: &Document) -> StageResult {
    let key_expr = spec
        .get("_id")
        .ok_or_else(|| CommandFailure::failed_to_parse("a group specification must include an _id"))?;

    let mut fields = Vec::new();
    for (name, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
        let Bson::Document(accumulator) = accumulator else {
            return Err(CommandFailure::failed_to_parse(format!(
                "the field '{}' must be an accumulator object",
                name
            )));
        };
        let mut entries = accumulator.iter();
        let (Some((op, expr)), None) = (entries.next(), entries.next()) else {
            return Err(CommandFailure::failed_to_parse(format!(
                "the field '{}' must specify one accumulator",
                name
            )));
        };
        Accumulator::new(op)?;
        fields.push((name.clone(), op.clone(), expr.clone()));
    }

    let mut groups: Vec<Group> = Vec::new();
    for document in &documents {
        let key = evaluate(key_expr, document)?.unwrap_or(Bson::Null);
        let index = match groups.iter().position(|g| equals(&g.key, &key)) {
            Some(index) => index,
            None => {
                let mut accumulators = Vec::with_capacity(fields.len());
                for (name, op, expr) in &fields {
                    accumulators.push((name.clone(), expr.clone(), Accumulator::new(op)?));
                }
                groups.push(Group { key, accumulators });
                groups.len() - 1
            }
        };
        for (_, expr, accumulator) in groups[index].accumulators.iter_mut() {
            accumulator.accept(evaluate(expr, document)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|g| {
            let mut result = Document::new();
            result.insert("_id", g.key);
            for (name, _, accumulator) in g.accumulators {
                result.insert(name, accumulator.finish());
            }
            result
        })
        .collect())
}

fn replace_root(documents: Vec<Document>, spec: &Document) -> StageResult {
    let expr = spec.get("newRoot").ok_or_else(|| {
        CommandFailure::failed_to_parse("no newRoot specified for the $replaceRoot stage")
    })?;
    documents
        .iter()
        .map(|document| match evaluate(expr, document)? {
            Some(Bson::Document(root)) => Ok(root),
            _ => Err(CommandFailure::new(
                40228,
                "Location40228",
                "'newRoot' expression must evaluate to an object",
            )),
        })
        .collect()
}

fn count(documents: Vec<Document>, spec: &Bson) -> StageResult {
    let Bson::String(field) = spec else {
        return Err(CommandFailure::failed_to_parse(
            "the count field must be a non-empty string",
        ));
    };
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let mut result = Document::new();
    result.insert(field.clone(), documents.len() as i32);
    Ok(vec![result])
}
