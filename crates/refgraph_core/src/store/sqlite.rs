//! SQLite-backed content store.
//!
//! # Responsibility
//! - Persist documents as JSON bodies in the `documents` table.
//! - Keep SQL details inside the store boundary.
//!
//! # Invariants
//! - Connections must be migrated (`db::open_db*`) before use.
//! - Merge writes read and rewrite one body inside an immediate transaction.
//! - Listing is deterministic: `id ASC` within one collection.

use super::{
    requested_id, Collection, ContentStore, Document, Fields, Filter, StoreError, StoreResult,
    SubscriberRegistry, Subscription,
};
use crate::db::migrations::latest_version;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use serde_json::Value;

/// `ContentStore` over a migrated SQLite connection.
pub struct SqliteStore<'conn> {
    conn: &'conn Connection,
    registry: SubscriberRegistry,
}

impl<'conn> SqliteStore<'conn> {
    /// Creates a store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_connection_ready(conn)?;
        Ok(Self {
            conn,
            registry: SubscriberRegistry::default(),
        })
    }

    fn load(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        match filter {
            Filter::Id(id) => Ok(load_one(self.conn, collection, id)?.into_iter().collect()),
            Filter::FieldEq(field, Value::String(value)) if is_plain_field(field) => {
                let sql = format!(
                    "SELECT id, body
                     FROM documents
                     WHERE collection = ?1
                       AND json_extract(body, '$.{field}') = ?2
                     ORDER BY id ASC;"
                );
                let mut stmt = self.conn.prepare(&sql)?;
                let mut rows = stmt.query(params![collection.as_str(), value])?;
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    documents.push(parse_document_row(row.get(0)?, row.get(1)?)?);
                }
                Ok(documents)
            }
            _ => {
                let mut stmt = self.conn.prepare(
                    "SELECT id, body
                     FROM documents
                     WHERE collection = ?1
                     ORDER BY id ASC;",
                )?;
                let mut rows = stmt.query([collection.as_str()])?;
                let mut documents = Vec::new();
                while let Some(row) = rows.next()? {
                    let document = parse_document_row(row.get(0)?, row.get(1)?)?;
                    if filter.matches(&document) {
                        documents.push(document);
                    }
                }
                Ok(documents)
            }
        }
    }

    fn notify(&self, collection: Collection, before: Option<&Document>, after: Option<&Document>) {
        self.registry
            .notify(collection, before, after, |filter| self.load(collection, filter));
    }
}

impl ContentStore for SqliteStore<'_> {
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription> {
        let initial = self.load(collection, &filter)?;
        Ok(self.registry.register(collection, filter, initial))
    }

    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        load_one(self.conn, collection, id)
    }

    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.load(collection, filter)
    }

    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let before = load_one(&tx, collection, id)?.ok_or_else(|| StoreError::NotFound {
            collection,
            id: id.to_string(),
        })?;
        let mut after = before.clone();
        after.merge(&fields);
        tx.execute(
            "UPDATE documents
             SET body = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE collection = ?1
               AND id = ?2;",
            params![
                collection.as_str(),
                id,
                serde_json::to_string(&after.fields)?
            ],
        )?;
        tx.commit()?;

        self.notify(collection, Some(&before), Some(&after));
        Ok(())
    }

    fn create(&self, collection: Collection, mut fields: Fields) -> StoreResult<String> {
        let id = requested_id(&fields);
        fields.insert("id".to_string(), Value::String(id.clone()));
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO documents (collection, id, body)
             VALUES (?1, ?2, ?3);",
            params![collection.as_str(), id, serde_json::to_string(&fields)?],
        )?;
        if changed == 0 {
            return Err(StoreError::AlreadyExists { collection, id });
        }

        let document = Document::new(id.clone(), fields);
        self.notify(collection, None, Some(&document));
        Ok(id)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let Some(before) = load_one(self.conn, collection, id)? else {
            return Ok(());
        };
        self.conn.execute(
            "DELETE FROM documents
             WHERE collection = ?1
               AND id = ?2;",
            params![collection.as_str(), id],
        )?;
        self.notify(collection, Some(&before), None);
        Ok(())
    }
}

fn load_one(conn: &Connection, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body
             FROM documents
             WHERE collection = ?1
               AND id = ?2;",
            params![collection.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|body| parse_document_row(id.to_string(), body))
        .transpose()
}

fn parse_document_row(id: String, body: String) -> StoreResult<Document> {
    match serde_json::from_str::<Value>(&body)? {
        Value::Object(fields) => Ok(Document::new(id, fields)),
        other => Err(StoreError::InvalidData(format!(
            "documents.body for `{id}` is not an object: `{other}`"
        ))),
    }
}

fn is_plain_field(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn ensure_store_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = 'documents'
        );",
        [],
        |row| row.get(0),
    )?;
    if exists != 1 {
        return Err(StoreError::MissingRequiredTable("documents"));
    }
    Ok(())
}
