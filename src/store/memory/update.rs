//! Update operators: `$set`, `$unset`, `$rename`, `$inc`, or a full
//! replacement document

use bson::{Bson, Document};

use super::value::{add, equals, get_path, remove_path, set_path};
use crate::store::CommandFailure;

const ID: &str = "_id";

/// Applies `update` to `document`, returning whether anything changed
pub fn apply_update(document: &mut Document, update: &Document) -> Result<bool, CommandFailure> {
    let operator_form = update.keys().any(|k| k.starts_with('$'));
    if !operator_form {
        return replace(document, update);
    }

    let before = document.clone();
    for (op, fields) in update {
        let Bson::Document(fields) = fields else {
            return Err(CommandFailure::failed_to_parse(format!(
                "Modifiers operate on fields but we found type {} instead",
                op
            )));
        };
        for (path, value) in fields {
            guard_identity(path)?;
            match op.as_str() {
                "$set" => set_path(document, path, value.clone()),
                "$unset" => {
                    remove_path(document, path);
                }
                "$rename" => {
                    let Bson::String(target) = value else {
                        return Err(CommandFailure::bad_value(
                            "The 'to' field for $rename must be a string",
                        ));
                    };
                    guard_identity(target)?;
                    if let Some(moved) = remove_path(document, path) {
                        set_path(document, target, moved);
                    }
                }
                "$inc" => {
                    let current = get_path(document, path).cloned().unwrap_or(Bson::Int32(0));
                    let sum = add(&current, value).ok_or_else(|| {
                        CommandFailure::type_mismatch(format!(
                            "Cannot apply $inc to a value of non-numeric type at '{}'",
                            path
                        ))
                    })?;
                    set_path(document, path, sum);
                }
                other => {
                    return Err(CommandFailure::failed_to_parse(format!(
                        "Unknown modifier: {}",
                        other
                    )))
                }
            }
        }
    }
    Ok(!documents_equal(&before, document))
}

fn immutable_identity() -> CommandFailure {
    CommandFailure::new(
        66,
        "ImmutableField",
        "Performing an update on the path '_id' would modify the immutable field '_id'",
    )
}

fn guard_identity(path: &str) -> Result<(), CommandFailure> {
    if path == ID || path.starts_with("_id.") {
        return Err(immutable_identity());
    }
    Ok(())
}

fn replace(document: &mut Document, replacement: &Document) -> Result<bool, CommandFailure> {
    let id = document.get(ID).cloned();
    if let (Some(id), Some(new_id)) = (&id, replacement.get(ID)) {
        if !equals(id, new_id) {
            return Err(immutable_identity());
        }
    }
    let mut next = Document::new();
    if let Some(id) = id {
        next.insert(ID, id);
    }
    for (key, value) in replacement {
        if key != ID {
            next.insert(key.clone(), value.clone());
        }
    }
    let changed = !documents_equal(document, &next);
    *document = next;
    Ok(changed)
}

fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && va == vb)
}
