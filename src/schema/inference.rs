//! Column type inference
//!
//! Samples the first document of a collection with a `$type` projection
//! for every selected column. The first sampled document is trusted for
//! the whole result set. A column absent from it samples as `missing` and
//! decodes by each value's own tag.

use bson::{doc, Bson, Document};
use tracing::debug;

use super::types::{TypeMap, TypeTag};
use crate::compiler::{strip_aggregation_prefix, ID_FIELD};
use crate::errors::{GatewayError, GatewayResult};
use crate::planner::{Command, ProbeColumn, ProbeTarget};

const TYPE_SUFFIX: &str = "Type";

/// Builds the sampling pipeline for a set of source fields
pub fn probe_command(collection: &str, fields: &[String]) -> Command {
    let mut projection = Document::new();
    for field in fields {
        let mut type_of = Document::new();
        type_of.insert("$type", format!("${}", field));
        projection.insert(probe_key(field), type_of);
    }
    projection.insert(ID_FIELD, 0);
    Command::aggregate(
        collection,
        vec![
            doc! { "$skip": 0 },
            doc! { "$limit": 1 },
            doc! { "$project": projection },
        ],
    )
}

fn probe_key(field: &str) -> String {
    format!("{}{}", field.replace('.', "_"), TYPE_SUFFIX)
}

/// Infers the type of every selected column of `target`.
///
/// Keys of `sample`, the first result document, that no selected column
/// accounts for (`SELECT *`) are probed as well. `run` executes a probe
/// command and returns the documents it produced.
pub fn infer_types<F>(target: &ProbeTarget, sample: &Document, mut run: F) -> GatewayResult<TypeMap>
where
    F: FnMut(Command) -> GatewayResult<Vec<Document>>,
{
    let prefix = target.join.as_ref().map(|j| j.prefix.as_str());
    let mut columns = target.columns.clone();
    for column in sample_columns(sample, prefix) {
        if !columns.iter().any(|c| c.key == column.key) {
            columns.push(column);
        }
    }
    let (joined, base): (Vec<ProbeColumn>, Vec<ProbeColumn>) =
        columns.into_iter().partition(|c| c.joined);

    let mut types = TypeMap::new();
    sample_collection(&target.collection, &base, false, &mut types, &mut run)?;
    if let Some(join) = &target.join {
        sample_collection(&join.collection, &joined, true, &mut types, &mut run)?;
    }
    debug!(collection = %target.collection, columns = types.len(), "inferred column types");
    Ok(types)
}

/// Columns named by the keys of a result document
fn sample_columns(sample: &Document, prefix: Option<&str>) -> Vec<ProbeColumn> {
    let mut columns = Vec::new();
    for (key, value) in sample {
        if key == ID_FIELD {
            continue;
        }
        match value {
            Bson::Document(embedded) if Some(key.as_str()) == prefix => {
                for sub in embedded.keys().filter(|k| k.as_str() != ID_FIELD) {
                    columns.push(ProbeColumn::joined(format!("{}.{}", key, sub), sub.clone()));
                }
            }
            _ => columns.push(ProbeColumn::base(key.clone(), strip_aggregation_prefix(key))),
        }
    }
    columns
}

/// Probes `columns` in `collection`. An empty joined collection types
/// every joined column as missing.
fn sample_collection<F>(
    collection: &str,
    columns: &[ProbeColumn],
    joined: bool,
    types: &mut TypeMap,
    run: &mut F,
) -> GatewayResult<()>
where
    F: FnMut(Command) -> GatewayResult<Vec<Document>>,
{
    if columns.is_empty() {
        return Ok(());
    }
    let mut fields: Vec<String> = Vec::new();
    for column in columns {
        if !fields.contains(&column.source) {
            fields.push(column.source.clone());
        }
    }

    let documents = run(probe_command(collection, &fields))?;
    let Some(sampled) = documents.into_iter().next() else {
        if joined {
            for column in columns {
                types.insert(column.key.clone(), TypeTag::Missing);
            }
            return Ok(());
        }
        return Err(GatewayError::missing_metadata(format!(
            "type probe of '{}' returned no document",
            collection
        )));
    };

    for column in columns {
        let tag = sampled
            .get_str(probe_key(&column.source))
            .map_err(|_| {
                GatewayError::missing_metadata(format!(
                    "type probe of '{}' has no entry for '{}'",
                    collection, column.source
                ))
            })?;
        types.insert(column.key.clone(), TypeTag::parse(tag));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::planner::JoinedCollection;

    fn target() -> ProbeTarget {
        ProbeTarget {
            collection: "users".into(),
            ..ProbeTarget::default()
        }
    }

    #[test]
    fn test_probe_command_shape() {
        let command = probe_command("users", &["age".into(), "name".into()]);
        assert_eq!(
            command.document(),
            &doc! {
                "aggregate": "users",
                "pipeline": [
                    { "$skip": 0 },
                    { "$limit": 1 },
                    { "$project": {
                        "ageType": { "$type": "$age" },
                        "nameType": { "$type": "$name" },
                        "_id": 0,
                    } },
                ],
                "cursor": {},
            }
        );
    }

    #[test]
    fn test_infers_from_sample_keys() {
        let sample = doc! { "name": "ada", "SUM_amt": 40, "_id": 1 };
        let mut issued = Vec::new();
        let types = infer_types(&target(), &sample, |command| {
            issued.push(command);
            Ok(vec![doc! { "nameType": "string", "amtType": "int" }])
        })
        .unwrap();

        assert_eq!(issued.len(), 1);
        assert_eq!(types.get("name"), Some(&TypeTag::String));
        assert_eq!(types.get("SUM_amt"), Some(&TypeTag::Int));
        assert_eq!(types.get("_id"), None);
    }

    #[test]
    fn test_aliases_resolve_source() {
        let mut target = target();
        target.columns.push(ProbeColumn::base("years", "age"));
        let sample = doc! { "years": 36 };
        let types = infer_types(&target, &sample, |command| {
            let pipeline = command.document().get_array("pipeline").unwrap();
            let project = pipeline[2].as_document().unwrap().get_document("$project").unwrap();
            assert!(project.contains_key("ageType"));
            assert!(!project.contains_key("yearsType"));
            Ok(vec![doc! { "ageType": "long" }])
        })
        .unwrap();
        assert_eq!(types.get("years"), Some(&TypeTag::Long));
    }

    /// A selected column the first result row lacks is still typed.
    #[test]
    fn test_selected_column_absent_from_sample() {
        let mut target = target();
        target.columns.push(ProbeColumn::base("a", "a"));
        target.columns.push(ProbeColumn::base("b", "b"));
        let types = infer_types(&target, &doc! { "a": 1 }, |command| {
            let pipeline = command.document().get_array("pipeline").unwrap();
            let project = pipeline[2].as_document().unwrap().get_document("$project").unwrap();
            assert!(project.contains_key("bType"));
            Ok(vec![doc! { "aType": "int", "bType": "missing" }])
        })
        .unwrap();
        assert_eq!(types.get("a"), Some(&TypeTag::Int));
        assert_eq!(types.get("b"), Some(&TypeTag::Missing));
    }

    #[test]
    fn test_joined_columns_typed_without_joined_sample() {
        let mut target = target();
        target.join = Some(JoinedCollection {
            collection: "orders".into(),
            prefix: "join_orders".into(),
        });
        target.columns.push(ProbeColumn::base("name", "name"));
        target.columns.push(ProbeColumn::joined("join_orders.total", "total"));
        let types = infer_types(&target, &doc! { "name": "ada" }, |command| {
            if command.collection() == "orders" {
                Ok(vec![doc! { "totalType": "double" }])
            } else {
                Ok(vec![doc! { "nameType": "string" }])
            }
        })
        .unwrap();
        assert_eq!(types.get("join_orders.total"), Some(&TypeTag::Double));
    }

    #[test]
    fn test_empty_joined_collection_types_missing() {
        let mut target = target();
        target.join = Some(JoinedCollection {
            collection: "orders".into(),
            prefix: "join_orders".into(),
        });
        target.columns.push(ProbeColumn::joined("join_orders.total", "total"));
        let types = infer_types(&target, &doc! { "name": "ada" }, |command| {
            if command.collection() == "orders" {
                Ok(Vec::new())
            } else {
                Ok(vec![doc! { "nameType": "string" }])
            }
        })
        .unwrap();
        assert_eq!(types.get("join_orders.total"), Some(&TypeTag::Missing));
        assert_eq!(types.get("name"), Some(&TypeTag::String));
    }

    #[test]
    fn test_join_subdocument_probed_separately() {
        let mut target = target();
        target.join = Some(JoinedCollection {
            collection: "orders".into(),
            prefix: "join_orders".into(),
        });
        let sample = doc! { "name": "ada", "join_orders": { "_id": 3, "total": 9.5 } };
        let mut collections = Vec::new();
        let types = infer_types(&target, &sample, |command| {
            collections.push(command.collection().to_string());
            if command.collection() == "orders" {
                Ok(vec![doc! { "totalType": "double" }])
            } else {
                Ok(vec![doc! { "nameType": "string" }])
            }
        })
        .unwrap();
        assert_eq!(collections, vec!["users", "orders"]);
        assert_eq!(types.get("join_orders.total"), Some(&TypeTag::Double));
        assert_eq!(types.get("name"), Some(&TypeTag::String));
    }

    #[test]
    fn test_empty_probe_is_missing_metadata() {
        let err = infer_types(&target(), &doc! { "name": "ada" }, |_| Ok(Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    }

    #[test]
    fn test_missing_entry_is_missing_metadata() {
        let err = infer_types(&target(), &doc! { "name": "ada" }, |_| {
            Ok(vec![doc! { "otherType": "string" }])
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingMetadata);
    }
}
