//! Wire commands
//!
//! A command is an ordered document whose first key is the verb and whose
//! value is the target collection, followed by verb-specific fields.

use std::fmt;

use bson::{doc, Bson, Document};
use serde::Serialize;

/// Primary verb of a wire command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Verb {
    Find,
    Aggregate,
    Distinct,
    Insert,
    Update,
    Delete,
    Create,
    Drop,
    CreateIndexes,
    DropIndexes,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Find => "find",
            Verb::Aggregate => "aggregate",
            Verb::Distinct => "distinct",
            Verb::Insert => "insert",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Create => "create",
            Verb::Drop => "drop",
            Verb::CreateIndexes => "createIndexes",
            Verb::DropIndexes => "dropIndexes",
        }
    }

    /// Verbs whose response reports an affected count `n`
    pub fn is_write(&self) -> bool {
        matches!(self, Verb::Insert | Verb::Update | Verb::Delete)
    }

    /// Verbs answered with a `cursor` sub-document
    pub fn returns_cursor(&self) -> bool {
        matches!(self, Verb::Find | Verb::Aggregate)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One compiled wire command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    verb: Verb,
    collection: String,
    body: Document,
}

impl Command {
    pub fn new(verb: Verb, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let mut body = Document::new();
        body.insert(verb.as_str(), collection.clone());
        Self {
            verb,
            collection,
            body,
        }
    }

    /// Appends a verb-specific field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Appends a field only when a value is present
    pub fn with_opt(self, key: impl Into<String>, value: Option<impl Into<Bson>>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    /// `aggregate` with a pipeline and a default cursor
    pub fn aggregate(collection: impl Into<String>, pipeline: Vec<Document>) -> Self {
        Command::new(Verb::Aggregate, collection)
            .with("pipeline", pipeline)
            .with("cursor", Document::new())
    }

    /// `update` applying one update document to every match
    pub fn update_many(collection: impl Into<String>, filter: Document, update: Document) -> Self {
        Command::new(Verb::Update, collection).with(
            "updates",
            vec![doc! { "q": filter, "u": update, "multi": true }],
        )
    }

    /// `delete` removing every match
    pub fn delete_many(collection: impl Into<String>, filter: Document) -> Self {
        Command::new(Verb::Delete, collection)
            .with("deletes", vec![doc! { "q": filter, "limit": 0 }])
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn document(&self) -> &Document {
        &self.body
    }

    /// Sets a field on every document carried by an `insert`.
    ///
    /// Returns false when the command inserts nothing.
    pub fn set_inserted_field(&mut self, field: &str, value: Bson) -> bool {
        if self.verb != Verb::Insert {
            return false;
        }
        let Some(Bson::Array(documents)) = self.body.get_mut("documents") else {
            return false;
        };
        let mut touched = false;
        for document in documents.iter_mut() {
            if let Bson::Document(document) = document {
                document.insert(field, value.clone());
                touched = true;
            }
        }
        touched
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Bson::Document(self.body.clone()).into_relaxed_extjson())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_leads_document() {
        let command = Command::new(Verb::Find, "users").with("limit", 5_i64);
        let keys: Vec<_> = command.document().keys().cloned().collect();
        assert_eq!(keys, vec!["find".to_string(), "limit".to_string()]);
        assert_eq!(command.document().get_str("find").unwrap(), "users");
    }

    #[test]
    fn test_with_opt_skips_absent_values() {
        let command = Command::new(Verb::Find, "users").with_opt("filter", None::<Document>);
        assert!(!command.document().contains_key("filter"));
    }

    #[test]
    fn test_aggregate_has_cursor() {
        let command = Command::aggregate("users", vec![doc! { "$limit": 1 }]);
        assert_eq!(command.verb(), Verb::Aggregate);
        assert!(command.document().get_document("cursor").is_ok());
    }

    #[test]
    fn test_set_inserted_field() {
        let mut command = Command::new(Verb::Insert, "users")
            .with("documents", vec![doc! { "name": "a", "id": Bson::Null }]);
        assert!(command.set_inserted_field("id", Bson::Int64(7)));
        let documents = command.document().get_array("documents").unwrap();
        assert_eq!(
            documents[0].as_document().unwrap().get_i64("id").unwrap(),
            7
        );

        let mut find = Command::new(Verb::Find, "users");
        assert!(!find.set_inserted_field("id", Bson::Int64(1)));
    }

    #[test]
    fn test_write_verbs() {
        assert!(Verb::Insert.is_write());
        assert!(Verb::Delete.is_write());
        assert!(!Verb::CreateIndexes.is_write());
        assert!(Verb::Aggregate.returns_cursor());
        assert!(!Verb::Distinct.returns_cursor());
    }
}
