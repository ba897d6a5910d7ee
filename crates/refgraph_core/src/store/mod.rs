//! Content store boundary.
//!
//! # Responsibility
//! - Define the transport-agnostic document store the engine runs against.
//! - Provide typed helpers over raw JSON documents.
//! - Host the in-memory and SQLite adapters.
//!
//! # Invariants
//! - `write` is a merge: only the given top-level fields change.
//! - `delete` of a missing document succeeds.
//! - Subscribers receive the full matching set on subscribe and after every
//!   mutation that touches a matching document.

use crate::db::DbError;
use crate::model::item::{Folder, ItemKind, Subject, TargetItem};
use crate::model::shortcut::Shortcut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod memory;
mod sqlite;
mod subscription;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use subscription::{Subscription, SubscriptionEvent};
pub(crate) use subscription::SubscriberRegistry;

/// Top-level fields of one stored document.
pub type Fields = Map<String, Value>;

/// Result type used by content store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Document collections known to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Folders,
    Subjects,
    Shortcuts,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folders => "folders",
            Self::Subjects => "subjects",
            Self::Shortcuts => "shortcuts",
        }
    }

    /// Collection holding content nodes of `kind`.
    pub fn for_kind(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Subject => Self::Subjects,
            ItemKind::Folder => Self::Folders,
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from content store operations.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite/bootstrap failure.
    Db(DbError),
    /// Record could not be encoded or decoded.
    Serde(serde_json::Error),
    /// Merge-write target does not exist.
    NotFound { collection: Collection, id: String },
    /// Create with a caller-chosen id that is already taken.
    AlreadyExists { collection: Collection, id: String },
    /// Stored data cannot be converted to a valid record.
    InvalidData(String),
    /// Transient transport failure; the operation may be retried.
    Unavailable(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serde(err) => write!(f, "document encoding error: {err}"),
            Self::NotFound { collection, id } => write!(f, "document not found: {collection}/{id}"),
            Self::AlreadyExists { collection, id } => {
                write!(f, "document already exists: {collection}/{id}")
            }
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
            Self::Unavailable(message) => write!(f, "content store unavailable: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "content store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "content store requires table `{table}`")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serde(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

/// One stored document: id plus JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Decodes into a typed record, with `id` always taken from the document.
    pub fn decode<T: DeserializeOwned>(&self) -> StoreResult<T> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Applies a merge-style partial update.
    pub fn merge(&mut self, patch: &Fields) {
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

/// Snapshot pushed to a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSet {
    pub collection: Collection,
    pub documents: Vec<Document>,
}

/// Document selection used by `query` and `subscribe`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Id(String),
    /// Top-level field equality. `Null` also matches a missing field.
    FieldEq(String, Value),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Self::Id(id.into())
    }

    pub fn field_eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::FieldEq(field.into(), value.into())
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Id(id) => document.id == *id,
            Self::FieldEq(field, Value::Null) => document
                .fields
                .get(field)
                .map_or(true, Value::is_null),
            Self::FieldEq(field, value) => document.fields.get(field) == Some(value),
        }
    }
}

/// Serializes a record into top-level document fields.
pub fn to_fields<T: Serialize>(record: &T) -> StoreResult<Fields> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidData(format!(
            "record must serialize to an object, got `{other}`"
        ))),
    }
}

/// Transport-agnostic document store.
pub trait ContentStore {
    /// Opens a live subscription; the current matching set is pushed first.
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription>;
    /// Loads one document by id.
    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;
    /// Loads every matching document, ordered by id.
    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>;
    /// Merges `fields` into an existing document.
    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()>;
    /// Creates a document and returns its id.
    ///
    /// A non-empty string `id` field is used as the document id; otherwise a
    /// fresh UUID is generated.
    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<String>;
    /// Deletes one document.
    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;
}

impl<S: ContentStore + ?Sized> ContentStore for &S {
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription> {
        (**self).subscribe(collection, filter)
    }

    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        (**self).get(collection, id)
    }

    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        (**self).query(collection, filter)
    }

    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()> {
        (**self).write(collection, id, fields)
    }

    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<String> {
        (**self).create(collection, fields)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        (**self).delete(collection, id)
    }
}

impl<S: ContentStore + ?Sized> ContentStore for Arc<S> {
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription> {
        (**self).subscribe(collection, filter)
    }

    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        (**self).get(collection, id)
    }

    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        (**self).query(collection, filter)
    }

    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()> {
        (**self).write(collection, id, fields)
    }

    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<String> {
        (**self).create(collection, fields)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        (**self).delete(collection, id)
    }
}

/// Typed helpers over any content store.
pub trait ContentStoreExt: ContentStore {
    fn get_as<T: DeserializeOwned>(&self, collection: Collection, id: &str) -> StoreResult<Option<T>> {
        self.get(collection, id)?
            .map(|document| document.decode())
            .transpose()
    }

    fn query_as<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> StoreResult<Vec<T>> {
        self.query(collection, filter)?
            .iter()
            .map(Document::decode)
            .collect()
    }

    /// Creates a document from a typed record.
    fn insert<T: Serialize>(&self, collection: Collection, record: &T) -> StoreResult<String> {
        self.create(collection, to_fields(record)?)
    }

    fn get_folder(&self, id: &str) -> StoreResult<Option<Folder>> {
        self.get_as(Collection::Folders, id)
    }

    fn get_subject(&self, id: &str) -> StoreResult<Option<Subject>> {
        self.get_as(Collection::Subjects, id)
    }

    fn get_shortcut(&self, id: &str) -> StoreResult<Option<Shortcut>> {
        self.get_as(Collection::Shortcuts, id)
    }

    /// Loads a folder or subject as a shortcut target.
    fn get_target(&self, kind: ItemKind, id: &str) -> StoreResult<Option<TargetItem>> {
        match kind {
            ItemKind::Subject => Ok(self.get_subject(id)?.map(TargetItem::Subject)),
            ItemKind::Folder => Ok(self.get_folder(id)?.map(TargetItem::Folder)),
        }
    }
}

impl<S: ContentStore + ?Sized> ContentStoreExt for S {}

/// Decodes a target document of the given kind.
pub fn decode_target(kind: ItemKind, document: &Document) -> StoreResult<TargetItem> {
    match kind {
        ItemKind::Subject => Ok(TargetItem::Subject(document.decode()?)),
        ItemKind::Folder => Ok(TargetItem::Folder(document.decode()?)),
    }
}

/// Picks the document id for a create call.
pub(crate) fn requested_id(fields: &Fields) -> String {
    match fields.get("id").and_then(Value::as_str) {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => uuid::Uuid::new_v4().to_string(),
    }
}
