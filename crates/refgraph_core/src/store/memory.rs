//! In-process content store.
//!
//! # Responsibility
//! - Provide a complete `ContentStore` without external infrastructure.
//!
//! # Invariants
//! - Query results are ordered by document id.
//! - The data lock is released before subscribers are notified.

use super::{
    requested_id, Collection, ContentStore, Document, Fields, Filter, StoreError, StoreResult,
    SubscriberRegistry, Subscription,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

type CollectionData = BTreeMap<String, Document>;

/// `ContentStore` backed by in-memory maps.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<Collection, CollectionData>>,
    registry: SubscriberRegistry,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self, collection: Collection, filter: &Filter) -> Vec<Document> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(documents) = data.get(&collection) else {
            return Vec::new();
        };
        match filter {
            Filter::Id(id) => documents.get(id).cloned().into_iter().collect(),
            _ => documents
                .values()
                .filter(|document| filter.matches(document))
                .cloned()
                .collect(),
        }
    }

    fn notify(&self, collection: Collection, before: Option<&Document>, after: Option<&Document>) {
        self.registry.notify(collection, before, after, |filter| {
            Ok(self.load(collection, filter))
        });
    }
}

impl ContentStore for MemoryStore {
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription> {
        let initial = self.load(collection, &filter);
        Ok(self.registry.register(collection, filter, initial))
    }

    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        Ok(self.load(collection, &Filter::id(id)).into_iter().next())
    }

    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self.load(collection, filter))
    }

    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()> {
        let (before, after) = {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            let document = data
                .get_mut(&collection)
                .and_then(|documents| documents.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection,
                    id: id.to_string(),
                })?;
            let before = document.clone();
            document.merge(&fields);
            (before, document.clone())
        };
        self.notify(collection, Some(&before), Some(&after));
        Ok(())
    }

    fn create(&self, collection: Collection, mut fields: Fields) -> StoreResult<String> {
        let id = requested_id(&fields);
        fields.insert("id".to_string(), Value::String(id.clone()));
        let document = Document::new(id.clone(), fields);
        {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            let documents = data.entry(collection).or_default();
            if documents.contains_key(&id) {
                return Err(StoreError::AlreadyExists { collection, id });
            }
            documents.insert(id.clone(), document.clone());
        }
        self.notify(collection, None, Some(&document));
        Ok(id)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        let removed = {
            let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
            data.get_mut(&collection)
                .and_then(|documents| documents.remove(id))
        };
        if let Some(removed) = removed {
            self.notify(collection, Some(&removed), None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::store::{Collection, ContentStore, Filter, SubscriptionEvent};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> crate::store::Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn subscription_sees_initial_set_then_updates() {
        let store = MemoryStore::new();
        store
            .create(Collection::Shortcuts, fields(json!({"id": "s1", "ownerId": "u1"})))
            .unwrap();

        let mut subscription = store
            .subscribe(Collection::Shortcuts, Filter::field_eq("ownerId", "u1"))
            .unwrap();
        let Some(SubscriptionEvent::Snapshot(initial)) = subscription.latest() else {
            panic!("expected initial snapshot");
        };
        assert_eq!(initial.documents.len(), 1);

        store
            .create(Collection::Shortcuts, fields(json!({"id": "s2", "ownerId": "u1"})))
            .unwrap();
        store
            .create(Collection::Shortcuts, fields(json!({"id": "s3", "ownerId": "u2"})))
            .unwrap();

        let Some(SubscriptionEvent::Snapshot(latest)) = subscription.latest() else {
            panic!("expected pushed snapshot");
        };
        let ids: Vec<_> = latest.documents.iter().map(|doc| doc.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(subscription.latest().is_none());
    }

    #[test]
    fn dropped_subscription_is_pruned_on_next_push() {
        let store = MemoryStore::new();
        let subscription = store.subscribe(Collection::Folders, Filter::All).unwrap();
        assert_eq!(store.registry.len(), 1);
        drop(subscription);

        store
            .create(Collection::Folders, fields(json!({"id": "f1"})))
            .unwrap();
        assert_eq!(store.registry.len(), 0);
    }

    #[test]
    fn create_rejects_taken_id() {
        let store = MemoryStore::new();
        store
            .create(Collection::Folders, fields(json!({"id": "f1"})))
            .unwrap();
        assert!(store
            .create(Collection::Folders, fields(json!({"id": "f1"})))
            .is_err());
    }
}
