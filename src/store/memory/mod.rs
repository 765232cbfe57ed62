//! In-process document store
//!
//! Speaks the same command protocol the planner emits and answers with
//! wire-shaped responses: `ok: 1.0` on success, `{ok: 0.0, errmsg, code,
//! codeName}` on a rejected command, `writeErrors` for per-document write
//! failures. Used by the CLI and by tests.
//!
//! # Features
//!
//! - Unique indexes (always one on `_id`), enforced with code 11000
//! - Cursors with `getMore` continuation
//! - Snapshot transactions, committed or aborted as a whole
//! - Standalone mode: commands inside a transaction fail with code 20
//! - Offline switch: every call fails before reaching the store

mod expr;
mod matcher;
mod pipeline;
mod update;
mod value;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::trace;
use uuid::Uuid;

use self::matcher::matches;
use self::pipeline::{project, run_pipeline, sort_documents, CollectionSource};
use self::update::apply_update;
use self::value::{equals, get_path};
use super::errors::{CommandFailure, StoreError, StoreResult};
use super::DocumentStore;

/// First and subsequent batch size when the command does not set one
pub const DEFAULT_BATCH_SIZE: usize = 101;

const ID_INDEX: &str = "_id_";

type CommandResult = Result<Document, CommandFailure>;

#[derive(Debug, Clone)]
struct Index {
    name: String,
    fields: Vec<String>,
    key: Document,
    unique: bool,
}

impl Index {
    fn identity() -> Self {
        Self {
            name: ID_INDEX.to_string(),
            fields: vec!["_id".to_string()],
            key: doc! { "_id": 1 },
            unique: true,
        }
    }

    fn key_of(&self, document: &Document) -> Vec<Bson> {
        self.fields
            .iter()
            .map(|f| get_path(document, f).cloned().unwrap_or(Bson::Null))
            .collect()
    }

    fn describe(&self, key: &[Bson]) -> String {
        let rendered: Vec<String> = self
            .fields
            .iter()
            .zip(key)
            .map(|(field, value)| format!("{}: {}", field, value))
            .collect();
        format!("{{ {} }}", rendered.join(", "))
    }
}

#[derive(Debug, Clone)]
struct Collection {
    documents: Vec<Document>,
    indexes: Vec<Index>,
}

impl Collection {
    fn new() -> Self {
        Self {
            documents: Vec::new(),
            indexes: vec![Index::identity()],
        }
    }

    /// First unique index `candidate` would violate, ignoring the document
    /// at position `skip`
    fn violation(
        &self,
        namespace: &str,
        candidate: &Document,
        skip: Option<usize>,
    ) -> Option<CommandFailure> {
        for index in self.indexes.iter().filter(|i| i.unique) {
            let key = index.key_of(candidate);
            let clash = self.documents.iter().enumerate().any(|(position, existing)| {
                Some(position) != skip
                    && index
                        .key_of(existing)
                        .iter()
                        .zip(&key)
                        .all(|(a, b)| equals(a, b))
            });
            if clash {
                return Some(CommandFailure::duplicate_key(format!(
                    "E11000 duplicate key error collection: {} index: {} dup key: {}",
                    namespace,
                    index.name,
                    index.describe(&key)
                )));
            }
        }
        None
    }
}

#[derive(Debug, Clone, Default)]
struct Database {
    collections: BTreeMap<String, Collection>,
}

impl CollectionSource for Database {
    fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
struct Cursor {
    namespace: String,
    remaining: VecDeque<Document>,
}

/// Document store held entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    databases: HashMap<String, Database>,
    snapshot: Option<HashMap<String, Database>>,
    transaction_active: bool,
    session: Uuid,
    standalone: bool,
    online: bool,
    latency: Duration,
    batch_size: usize,
    cursors: HashMap<i64, Cursor>,
    next_cursor: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            databases: HashMap::new(),
            snapshot: None,
            transaction_active: false,
            session: Uuid::new_v4(),
            standalone: false,
            online: true,
            latency: Duration::ZERO,
            batch_size: DEFAULT_BATCH_SIZE,
            cursors: HashMap::new(),
            next_cursor: 1,
        }
    }

    /// Behave like a non-replicated deployment: no transactions
    pub fn standalone(mut self) -> Self {
        self.standalone = true;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Simulated round-trip time seen by `ping`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    pub fn collection_names(&self, database: &str) -> Vec<String> {
        self.databases
            .get(database)
            .map(|db| db.collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn document_count(&self, database: &str, collection: &str) -> usize {
        self.collection(database, collection)
            .map_or(0, |c| c.documents.len())
    }

    pub fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        self.collection(database, collection)
            .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn open_cursors(&self) -> usize {
        self.cursors.len()
    }

    fn collection(&self, database: &str, collection: &str) -> Option<&Collection> {
        self.databases.get(database)?.collections.get(collection)
    }

    fn ensure_online(&self) -> StoreResult<()> {
        if self.online {
            Ok(())
        } else {
            Err(StoreError::Unreachable(
                "memory store is switched offline".to_string(),
            ))
        }
    }

    fn dispatch(&mut self, database: &str, verb: &str, command: &Document) -> CommandResult {
        match verb {
            "ping" => Ok(Document::new()),
            "create" => self.create(database, command),
            "drop" => self.drop_collection(database, command),
            "createIndexes" => self.create_indexes(database, command),
            "dropIndexes" => self.drop_indexes(database, command),
            "insert" => self.insert(database, command),
            "update" => self.update(database, command),
            "delete" => self.delete(database, command),
            "find" => self.find(database, command),
            "aggregate" => self.aggregate(database, command),
            "distinct" => self.distinct(database, command),
            "getMore" => self.get_more(command),
            other => Err(CommandFailure::command_not_found(other)),
        }
    }

    fn create(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "create")?;
        let collections = &mut self.databases.entry(database.to_string()).or_default().collections;
        if collections.contains_key(name) {
            return Err(CommandFailure::namespace_exists(format!(
                "Collection {}.{} already exists.",
                database, name
            )));
        }
        collections.insert(name.to_string(), Collection::new());
        Ok(Document::new())
    }

    fn drop_collection(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "drop")?;
        let removed = self
            .databases
            .get_mut(database)
            .and_then(|db| db.collections.remove(name));
        let mut response = doc! { "ns": format!("{}.{}", database, name) };
        if let Some(collection) = removed {
            response.insert("nIndexesWas", collection.indexes.len() as i32);
        }
        Ok(response)
    }

    fn create_indexes(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "createIndexes")?;
        let specs = command
            .get_array("indexes")
            .map_err(|_| CommandFailure::failed_to_parse("'indexes' must be an array"))?;
        let namespace = format!("{}.{}", database, name);

        let collections = &mut self.databases.entry(database.to_string()).or_default().collections;
        let created_automatically = !collections.contains_key(name);
        let collection = collections
            .entry(name.to_string())
            .or_insert_with(Collection::new);
        let before = collection.indexes.len();

        for spec in specs {
            let index = parse_index(spec)?;
            if let Some(existing) = collection.indexes.iter().find(|i| i.name == index.name) {
                if existing.key == index.key && existing.unique == index.unique {
                    continue;
                }
                return Err(CommandFailure::new(
                    86,
                    "IndexKeySpecsConflict",
                    format!("An existing index has the same name as the requested index: {}", index.name),
                ));
            }
            if index.unique {
                let mut probe = Collection {
                    documents: Vec::new(),
                    indexes: vec![index.clone()],
                };
                for document in &collection.documents {
                    if let Some(failure) = probe.violation(&namespace, document, None) {
                        return Err(failure);
                    }
                    probe.documents.push(document.clone());
                }
            }
            collection.indexes.push(index);
        }

        Ok(doc! {
            "createdCollectionAutomatically": created_automatically,
            "numIndexesBefore": before as i32,
            "numIndexesAfter": collection.indexes.len() as i32,
        })
    }

    fn drop_indexes(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "dropIndexes")?;
        let collection = self
            .databases
            .get_mut(database)
            .and_then(|db| db.collections.get_mut(name))
            .ok_or_else(|| {
                CommandFailure::namespace_not_found(format!("ns not found {}.{}", database, name))
            })?;
        let before = collection.indexes.len();

        let names: Vec<String> = match command.get("index") {
            Some(Bson::String(all)) if all == "*" => collection
                .indexes
                .iter()
                .filter(|i| i.name != ID_INDEX)
                .map(|i| i.name.clone())
                .collect(),
            Some(Bson::String(single)) => vec![single.clone()],
            Some(Bson::Array(many)) => many
                .iter()
                .map(|n| match n {
                    Bson::String(n) => Ok(n.clone()),
                    _ => Err(CommandFailure::type_mismatch("index names must be strings")),
                })
                .collect::<Result<_, _>>()?,
            Some(Bson::Document(key)) => {
                let found = collection.indexes.iter().find(|i| &i.key == key).ok_or_else(|| {
                    CommandFailure::index_not_found(format!("can't find index with key: {}", key))
                })?;
                vec![found.name.clone()]
            }
            _ => return Err(CommandFailure::failed_to_parse("'index' must be a string, array or object")),
        };

        for index in &names {
            if index == ID_INDEX {
                return Err(CommandFailure::new(72, "InvalidOptions", "cannot drop _id index"));
            }
            if !collection.indexes.iter().any(|i| &i.name == index) {
                return Err(CommandFailure::index_not_found(format!(
                    "index not found with name [{}]",
                    index
                )));
            }
        }
        collection.indexes.retain(|i| !names.contains(&i.name));
        Ok(doc! { "nIndexesWas": before as i32 })
    }

    fn insert(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "insert")?;
        let documents = command
            .get_array("documents")
            .map_err(|_| CommandFailure::failed_to_parse("'documents' must be an array"))?;
        let ordered = command.get_bool("ordered").unwrap_or(true);
        let namespace = format!("{}.{}", database, name);
        let collection = self
            .databases
            .entry(database.to_string())
            .or_default()
            .collections
            .entry(name.to_string())
            .or_insert_with(Collection::new);

        let mut inserted = 0;
        let mut write_errors = Vec::new();
        for (position, document) in documents.iter().enumerate() {
            let Bson::Document(document) = document else {
                return Err(CommandFailure::type_mismatch("documents must be objects"));
            };
            let document = with_identity(document);
            match collection.violation(&namespace, &document, None) {
                Some(failure) => {
                    write_errors.push(Bson::Document(failure.to_write_error(position)));
                    if ordered {
                        break;
                    }
                }
                None => {
                    collection.documents.push(document);
                    inserted += 1;
                }
            }
        }

        let mut response = doc! { "n": inserted };
        if !write_errors.is_empty() {
            response.insert("writeErrors", write_errors);
        }
        Ok(response)
    }

    fn update(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "update")?;
        let statements = command
            .get_array("updates")
            .map_err(|_| CommandFailure::failed_to_parse("'updates' must be an array"))?;
        let namespace = format!("{}.{}", database, name);
        let Some(collection) = self
            .databases
            .get_mut(database)
            .and_then(|db| db.collections.get_mut(name))
        else {
            return Ok(doc! { "n": 0, "nModified": 0 });
        };

        let mut matched = 0;
        let mut modified = 0;
        let mut write_errors = Vec::new();
        'statements: for (position, statement) in statements.iter().enumerate() {
            let Bson::Document(statement) = statement else {
                return Err(CommandFailure::type_mismatch("update statements must be objects"));
            };
            let filter = statement.get_document("q").map_err(|_| {
                CommandFailure::failed_to_parse("update statement needs a 'q' document")
            })?;
            let change = statement.get_document("u").map_err(|_| {
                CommandFailure::failed_to_parse("update statement needs a 'u' document")
            })?;
            let multi = statement.get_bool("multi").unwrap_or(false);

            let mut targets = Vec::new();
            for (index, document) in collection.documents.iter().enumerate() {
                if matches(document, filter)? {
                    targets.push(index);
                    if !multi {
                        break;
                    }
                }
            }
            for index in targets {
                let mut next = collection.documents[index].clone();
                let changed = apply_update(&mut next, change)?;
                if let Some(failure) = collection.violation(&namespace, &next, Some(index)) {
                    write_errors.push(Bson::Document(failure.to_write_error(position)));
                    break 'statements;
                }
                collection.documents[index] = next;
                matched += 1;
                if changed {
                    modified += 1;
                }
            }
        }

        let mut response = doc! { "n": matched, "nModified": modified };
        if !write_errors.is_empty() {
            response.insert("writeErrors", write_errors);
        }
        Ok(response)
    }

    fn delete(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "delete")?;
        let statements = command
            .get_array("deletes")
            .map_err(|_| CommandFailure::failed_to_parse("'deletes' must be an array"))?;
        let Some(collection) = self
            .databases
            .get_mut(database)
            .and_then(|db| db.collections.get_mut(name))
        else {
            return Ok(doc! { "n": 0 });
        };

        let mut removed = 0;
        for statement in statements {
            let Bson::Document(statement) = statement else {
                return Err(CommandFailure::type_mismatch("delete statements must be objects"));
            };
            let filter = statement.get_document("q").map_err(|_| {
                CommandFailure::failed_to_parse("delete statement needs a 'q' document")
            })?;
            let single = count_field(statement, "limit")?.unwrap_or(0) == 1;

            let mut kept = Vec::with_capacity(collection.documents.len());
            let mut removed_here = 0;
            for document in collection.documents.drain(..) {
                if (!single || removed_here == 0) && matches(&document, filter)? {
                    removed_here += 1;
                } else {
                    kept.push(document);
                }
            }
            collection.documents = kept;
            removed += removed_here;
        }
        Ok(doc! { "n": removed })
    }

    fn find(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "find")?;
        let filter = document_field(command, "filter")?;
        let mut documents = Vec::new();
        if let Some(collection) = self.collection(database, name) {
            for document in &collection.documents {
                if filter.map_or(Ok(true), |f| matches(document, f))? {
                    documents.push(document.clone());
                }
            }
        }
        if let Some(sort) = document_field(command, "sort")? {
            sort_documents(&mut documents, sort)?;
        }
        let skip = count_field(command, "skip")?.unwrap_or(0);
        let limit = count_field(command, "limit")?.filter(|l| *l > 0);
        let documents: Vec<Document> = documents
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .collect();
        let documents = match document_field(command, "projection")? {
            Some(projection) => documents
                .iter()
                .map(|d| project(d, projection))
                .collect::<Result<Vec<_>, _>>()?,
            None => documents,
        };

        let batch_size = count_field(command, "batchSize")?;
        Ok(self.open_cursor(format!("{}.{}", database, name), documents, batch_size))
    }

    fn aggregate(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "aggregate")?;
        let pipeline: Vec<Document> = command
            .get_array("pipeline")
            .map_err(|_| CommandFailure::failed_to_parse("'pipeline' must be an array"))?
            .iter()
            .map(|stage| match stage {
                Bson::Document(stage) => Ok(stage.clone()),
                _ => Err(CommandFailure::type_mismatch("pipeline stages must be objects")),
            })
            .collect::<Result<_, _>>()?;
        let cursor_options = document_field(command, "cursor")?.ok_or_else(|| {
            CommandFailure::failed_to_parse("The 'cursor' option is required")
        })?;
        let batch_size = count_field(cursor_options, "batchSize")?;

        let empty = Database::default();
        let db = self.databases.get(database).unwrap_or(&empty);
        let documents = db.documents(name);
        let results = run_pipeline(documents, &pipeline, db)?;
        Ok(self.open_cursor(format!("{}.{}", database, name), results, batch_size))
    }

    fn distinct(&mut self, database: &str, command: &Document) -> CommandResult {
        let name = target(command, "distinct")?;
        let key = command
            .get_str("key")
            .map_err(|_| CommandFailure::failed_to_parse("'key' must be a string"))?;
        let filter = document_field(command, "query")?;

        let mut values: Vec<Bson> = Vec::new();
        if let Some(collection) = self.collection(database, name) {
            for document in &collection.documents {
                if !filter.map_or(Ok(true), |f| matches(document, f))? {
                    continue;
                }
                let candidates = match get_path(document, key) {
                    Some(Bson::Array(items)) => items.clone(),
                    Some(value) => vec![value.clone()],
                    None => Vec::new(),
                };
                for candidate in candidates {
                    if !values.iter().any(|v| equals(v, &candidate)) {
                        values.push(candidate);
                    }
                }
            }
        }
        Ok(doc! { "values": values })
    }

    fn get_more(&mut self, command: &Document) -> CommandResult {
        let id = match command.get("getMore") {
            Some(Bson::Int64(id)) => *id,
            Some(Bson::Int32(id)) => i64::from(*id),
            _ => return Err(CommandFailure::type_mismatch("getMore requires a long cursor id")),
        };
        let batch_size = count_field(command, "batchSize")?.unwrap_or(self.batch_size);
        let cursor = self
            .cursors
            .get_mut(&id)
            .ok_or_else(|| CommandFailure::cursor_not_found(id))?;
        let take = batch_size.min(cursor.remaining.len());
        let batch: Vec<Document> = cursor.remaining.drain(..take).collect();
        let namespace = cursor.namespace.clone();
        let exhausted = cursor.remaining.is_empty();
        let next_id = if exhausted {
            self.cursors.remove(&id);
            0_i64
        } else {
            id
        };
        Ok(doc! {
            "cursor": {
                "nextBatch": batch,
                "id": next_id,
                "ns": namespace,
            }
        })
    }

    fn open_cursor(
        &mut self,
        namespace: String,
        documents: Vec<Document>,
        batch_size: Option<usize>,
    ) -> Document {
        let batch_size = batch_size.filter(|b| *b > 0).unwrap_or(self.batch_size);
        let mut remaining: VecDeque<Document> = documents.into();
        let take = batch_size.min(remaining.len());
        let first: Vec<Document> = remaining.drain(..take).collect();
        let id = if remaining.is_empty() {
            0
        } else {
            let id = self.next_cursor;
            self.next_cursor += 1;
            self.cursors.insert(
                id,
                Cursor {
                    namespace: namespace.clone(),
                    remaining,
                },
            );
            id
        };
        doc! {
            "cursor": {
                "firstBatch": first,
                "id": id,
                "ns": namespace,
            }
        }
    }
}

impl DocumentStore for MemoryStore {
    fn run_command(&mut self, database: &str, command: &Document) -> StoreResult<Document> {
        self.ensure_online()?;
        let verb = command
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| StoreError::Malformed("empty command document".to_string()))?;
        trace!(database, verb = %verb, session = %self.session, "memory store command");

        if self.standalone && self.transaction_active {
            return Ok(CommandFailure::illegal_operation(
                "Transaction numbers are only allowed on a replica set member or mongos",
            )
            .to_response());
        }

        match self.dispatch(database, &verb, command) {
            Ok(mut response) => {
                response.insert("ok", 1.0);
                Ok(response)
            }
            Err(failure) => Ok(failure.to_response()),
        }
    }

    fn start_transaction(&mut self) -> StoreResult<()> {
        self.ensure_online()?;
        if self.transaction_active {
            return Err(StoreError::Transaction(
                "transaction already in progress".to_string(),
            ));
        }
        self.snapshot = Some(self.databases.clone());
        self.transaction_active = true;
        Ok(())
    }

    fn commit_transaction(&mut self) -> StoreResult<()> {
        self.ensure_online()?;
        if !self.transaction_active {
            return Err(StoreError::Transaction(
                "no transaction started".to_string(),
            ));
        }
        if self.standalone {
            return Err(StoreError::Transaction(
                "Transaction numbers are only allowed on a replica set member or mongos"
                    .to_string(),
            ));
        }
        self.snapshot = None;
        self.transaction_active = false;
        Ok(())
    }

    fn abort_transaction(&mut self) -> StoreResult<()> {
        if !self.transaction_active {
            return Err(StoreError::Transaction(
                "no transaction started".to_string(),
            ));
        }
        if let Some(snapshot) = self.snapshot.take() {
            self.databases = snapshot;
        }
        self.transaction_active = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.transaction_active
    }

    fn ping(&mut self, timeout: Duration) -> StoreResult<()> {
        self.ensure_online()?;
        if self.latency > timeout {
            return Err(StoreError::Timeout(timeout));
        }
        Ok(())
    }
}

fn target<'a>(command: &'a Document, verb: &str) -> Result<&'a str, CommandFailure> {
    command.get_str(verb).map_err(|_| {
        CommandFailure::type_mismatch(format!("collection name for '{}' must be a string", verb))
    })
}

fn document_field<'a>(command: &'a Document, key: &str) -> Result<Option<&'a Document>, CommandFailure> {
    match command.get(key) {
        None => Ok(None),
        Some(Bson::Document(document)) => Ok(Some(document)),
        Some(_) => Err(CommandFailure::type_mismatch(format!(
            "'{}' must be an object",
            key
        ))),
    }
}

fn count_field(command: &Document, key: &str) -> Result<Option<usize>, CommandFailure> {
    let value = match command.get(key) {
        None => return Ok(None),
        Some(Bson::Int32(v)) => i64::from(*v),
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) if v.fract() == 0.0 => *v as i64,
        Some(_) => {
            return Err(CommandFailure::type_mismatch(format!(
                "'{}' must be a number",
                key
            )))
        }
    };
    // a negative find limit means a single batch of that size
    Ok(Some(value.unsigned_abs() as usize))
}

fn parse_index(spec: &Bson) -> Result<Index, CommandFailure> {
    let Bson::Document(spec) = spec else {
        return Err(CommandFailure::type_mismatch("index specifications must be objects"));
    };
    let key = spec
        .get_document("key")
        .map_err(|_| CommandFailure::failed_to_parse("index specification needs a 'key' object"))?
        .clone();
    if key.is_empty() {
        return Err(CommandFailure::bad_value("index key pattern cannot be empty"));
    }
    let name = spec
        .get_str("name")
        .map_err(|_| CommandFailure::failed_to_parse("index specification needs a 'name'"))?
        .to_string();
    Ok(Index {
        name,
        fields: key.keys().cloned().collect(),
        unique: spec.get_bool("unique").unwrap_or(false),
        key,
    })
}

/// Puts a generated `_id` first when the document has none
fn with_identity(document: &Document) -> Document {
    if document.contains_key("_id") {
        return document.clone();
    }
    let mut identified = doc! { "_id": ObjectId::new() };
    for (key, value) in document {
        identified.insert(key.clone(), value.clone());
    }
    identified
}

#[cfg(test)]
mod tests {
    use super::*;

    const DB: &str = "app";

    fn run(store: &mut MemoryStore, command: Document) -> Document {
        store.run_command(DB, &command).unwrap()
    }

    fn first_batch(response: &Document) -> Vec<Document> {
        response
            .get_document("cursor")
            .unwrap()
            .get_array("firstBatch")
            .unwrap()
            .iter()
            .map(|d| d.as_document().unwrap().clone())
            .collect()
    }

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::new();
        run(
            &mut store,
            doc! { "insert": "users", "documents": [
                { "name": "ada", "age": 36 },
                { "name": "bob", "age": 25 },
                { "name": "cy", "age": 41 },
            ] },
        );
        store
    }

    #[test]
    fn test_insert_and_find() {
        let mut store = seeded();
        let response = run(
            &mut store,
            doc! {
                "find": "users",
                "filter": { "age": { "$gt": 30 } },
                "projection": { "name": "$name", "_id": 0 },
                "sort": { "age": -1 },
            },
        );
        assert_eq!(response.get_f64("ok").unwrap(), 1.0);
        assert_eq!(
            first_batch(&response),
            vec![doc! { "name": "cy" }, doc! { "name": "ada" }]
        );
    }

    #[test]
    fn test_inserted_documents_get_identity() {
        let mut store = seeded();
        let response = run(&mut store, doc! { "find": "users", "limit": 1_i64 });
        let document = &first_batch(&response)[0];
        assert_eq!(document.keys().next().unwrap(), "_id");
        assert!(document.get_object_id("_id").is_ok());
    }

    #[test]
    fn test_cursor_continuation() {
        let mut store = seeded().with_batch_size(2);
        let response = run(&mut store, doc! { "find": "users" });
        let cursor = response.get_document("cursor").unwrap();
        let id = cursor.get_i64("id").unwrap();
        assert_ne!(id, 0);
        assert_eq!(first_batch(&response).len(), 2);

        let more = run(&mut store, doc! { "getMore": id, "collection": "users" });
        let cursor = more.get_document("cursor").unwrap();
        assert_eq!(cursor.get_i64("id").unwrap(), 0);
        assert_eq!(cursor.get_array("nextBatch").unwrap().len(), 1);
        assert_eq!(store.open_cursors(), 0);
    }

    #[test]
    fn test_unique_index_rejects_duplicates() {
        let mut store = MemoryStore::new();
        run(
            &mut store,
            doc! { "createIndexes": "users", "indexes": [
                { "key": { "email": 1 }, "name": "users_email_puk", "unique": true }
            ] },
        );
        run(&mut store, doc! { "insert": "users", "documents": [{ "email": "a@x" }] });
        let response = run(
            &mut store,
            doc! { "insert": "users", "documents": [{ "email": "a@x" }] },
        );
        assert_eq!(response.get_f64("ok").unwrap(), 1.0);
        assert_eq!(response.get_i32("n").unwrap(), 0);
        let errors = response.get_array("writeErrors").unwrap();
        assert_eq!(
            errors[0].as_document().unwrap().get_i32("code").unwrap(),
            11000
        );
    }

    #[test]
    fn test_update_and_delete_counts() {
        let mut store = seeded();
        let response = run(
            &mut store,
            doc! { "update": "users", "updates": [
                { "q": { "age": { "$lt": 40 } }, "u": { "$set": { "young": true } }, "multi": true }
            ] },
        );
        assert_eq!(response.get_i32("n").unwrap(), 2);
        assert_eq!(response.get_i32("nModified").unwrap(), 2);

        let response = run(
            &mut store,
            doc! { "delete": "users", "deletes": [{ "q": { "young": true }, "limit": 0 }] },
        );
        assert_eq!(response.get_i32("n").unwrap(), 2);
        assert_eq!(store.document_count(DB, "users"), 1);
    }

    #[test]
    fn test_create_existing_collection_fails() {
        let mut store = MemoryStore::new();
        run(&mut store, doc! { "create": "users" });
        let response = run(&mut store, doc! { "create": "users" });
        assert_eq!(response.get_f64("ok").unwrap(), 0.0);
        assert_eq!(response.get_i32("code").unwrap(), 48);
        assert_eq!(response.get_str("codeName").unwrap(), "NamespaceExists");
    }

    #[test]
    fn test_drop_indexes() {
        let mut store = MemoryStore::new();
        run(
            &mut store,
            doc! { "createIndexes": "users", "indexes": [
                { "key": { "email": 1 }, "name": "users_email_puk", "unique": true }
            ] },
        );
        assert_eq!(store.index_names(DB, "users"), vec!["_id_", "users_email_puk"]);

        let missing = run(
            &mut store,
            doc! { "dropIndexes": "users", "index": ["nope"] },
        );
        assert_eq!(missing.get_i32("code").unwrap(), 27);

        let dropped = run(
            &mut store,
            doc! { "dropIndexes": "users", "index": ["users_email_puk"] },
        );
        assert_eq!(dropped.get_f64("ok").unwrap(), 1.0);
        assert_eq!(store.index_names(DB, "users"), vec!["_id_"]);
    }

    #[test]
    fn test_distinct() {
        let mut store = seeded();
        run(&mut store, doc! { "insert": "users", "documents": [{ "name": "ada", "age": 50 }] });
        let response = run(
            &mut store,
            doc! { "distinct": "users", "key": "name", "query": { "age": { "$gt": 30 } } },
        );
        let values = response.get_array("values").unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_aggregate_requires_cursor() {
        let mut store = seeded();
        let response = run(&mut store, doc! { "aggregate": "users", "pipeline": [] });
        assert_eq!(response.get_f64("ok").unwrap(), 0.0);
    }

    #[test]
    fn test_transaction_abort_restores_snapshot() {
        let mut store = seeded();
        store.start_transaction().unwrap();
        run(&mut store, doc! { "delete": "users", "deletes": [{ "q": {}, "limit": 0 }] });
        assert_eq!(store.document_count(DB, "users"), 0);
        store.abort_transaction().unwrap();
        assert_eq!(store.document_count(DB, "users"), 3);
        assert!(!store.in_transaction());
    }

    #[test]
    fn test_transaction_commit_keeps_changes() {
        let mut store = seeded();
        store.start_transaction().unwrap();
        run(&mut store, doc! { "drop": "users" });
        store.commit_transaction().unwrap();
        assert!(store.collection_names(DB).is_empty());
    }

    #[test]
    fn test_standalone_rejects_transactional_commands() {
        let mut store = MemoryStore::new().standalone();
        store.start_transaction().unwrap();
        let response = run(&mut store, doc! { "find": "users" });
        assert_eq!(response.get_i32("code").unwrap(), 20);
        store.abort_transaction().unwrap();
        let response = run(&mut store, doc! { "find": "users" });
        assert_eq!(response.get_f64("ok").unwrap(), 1.0);
    }

    #[test]
    fn test_offline_and_ping() {
        let mut store = MemoryStore::new().with_latency(Duration::from_millis(50));
        assert!(store.ping(Duration::from_millis(100)).is_ok());
        assert!(matches!(
            store.ping(Duration::from_millis(10)),
            Err(StoreError::Timeout(_))
        ));
        store.set_online(false);
        assert!(matches!(
            store.run_command(DB, &doc! { "ping": 1 }),
            Err(StoreError::Unreachable(_))
        ));
    }

    #[test]
    fn test_unknown_command() {
        let mut store = MemoryStore::new();
        let response = run(&mut store, doc! { "shutdown": 1 });
        assert_eq!(response.get_i32("code").unwrap(), 59);
    }
}
