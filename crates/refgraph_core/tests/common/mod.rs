#![allow(dead_code)]

use refgraph_core::{
    Collection, ContentStore, ContentStoreExt, Document, Fields, Filter, Folder, ItemKind,
    MemoryStore, Shortcut, ShortcutOverrides, StoreError, StoreResult, Subject, Subscription,
    Viewer,
};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

pub const ALICE: &str = "alice";
pub const BOB: &str = "bob";

pub fn viewer(user_id: &str) -> Viewer {
    Viewer::new(user_id, None)
}

pub fn folder(id: &str, owner: &str, parent: Option<&str>) -> Folder {
    Folder::new(id, owner, parent.map(str::to_string), format!("Folder {id}"))
}

pub fn shared_folder(id: &str, owner: &str, parent: Option<&str>, uids: &[&str]) -> Folder {
    let mut folder = folder(id, owner, parent);
    folder.sharing.is_shared = true;
    folder.sharing.shared_with_uids = uids.iter().map(|uid| uid.to_string()).collect();
    folder
}

pub fn subject(id: &str, owner: &str, folder_id: Option<&str>) -> Subject {
    Subject::new(id, owner, folder_id.map(str::to_string), format!("Subject {id}"))
}

pub fn shared_subject(id: &str, owner: &str, folder_id: Option<&str>, uids: &[&str]) -> Subject {
    let mut subject = subject(id, owner, folder_id);
    subject.sharing.is_shared = true;
    subject.sharing.shared_with_uids = uids.iter().map(|uid| uid.to_string()).collect();
    subject
}

pub fn shortcut(
    id: &str,
    owner: &str,
    target_id: &str,
    target_type: ItemKind,
    parent: Option<&str>,
    created_at: i64,
) -> Shortcut {
    Shortcut {
        id: id.to_string(),
        owner_id: owner.to_string(),
        parent_id: parent.map(str::to_string),
        target_id: target_id.to_string(),
        target_type,
        institution_id: None,
        hidden_in_manual: false,
        overrides: ShortcutOverrides::default(),
        created_at,
    }
}

pub fn put_folder<S: ContentStore>(store: &S, folder: &Folder) {
    store.insert(Collection::Folders, folder).unwrap();
}

pub fn put_subject<S: ContentStore>(store: &S, subject: &Subject) {
    store.insert(Collection::Subjects, subject).unwrap();
}

pub fn put_shortcut<S: ContentStore>(store: &S, shortcut: &Shortcut) {
    store.insert(Collection::Shortcuts, shortcut).unwrap();
}

pub fn load_folder<S: ContentStore>(store: &S, id: &str) -> Folder {
    store.get_folder(id).unwrap().unwrap()
}

pub fn load_subject<S: ContentStore>(store: &S, id: &str) -> Subject {
    store.get_subject(id).unwrap().unwrap()
}

pub fn shortcuts_of<S: ContentStore>(store: &S, owner: &str) -> Vec<Shortcut> {
    store
        .query_as(Collection::Shortcuts, &Filter::field_eq("ownerId", owner))
        .unwrap()
}

/// Every document of every collection, for before/after comparisons.
pub fn dump<S: ContentStore>(store: &S) -> Vec<Document> {
    [Collection::Folders, Collection::Subjects, Collection::Shortcuts]
        .into_iter()
        .flat_map(|collection| store.query(collection, &Filter::All).unwrap())
        .collect()
}

/// `MemoryStore` wrapper that fails selected operations on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_reads: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_deletes: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_reads_of(&self, id: &str) {
        lock(&self.failing_reads).insert(id.to_string());
    }

    pub fn fail_writes_to(&self, id: &str) {
        lock(&self.failing_writes).insert(id.to_string());
    }

    pub fn fail_deletes_of(&self, id: &str) {
        lock(&self.failing_deletes).insert(id.to_string());
    }

    pub fn heal(&self) {
        lock(&self.failing_reads).clear();
        lock(&self.failing_writes).clear();
        lock(&self.failing_deletes).clear();
    }

    fn check(set: &Mutex<HashSet<String>>, id: &str) -> StoreResult<()> {
        if lock(set).contains(id) {
            return Err(StoreError::Unavailable(format!("injected failure for {id}")));
        }
        Ok(())
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ContentStore for FlakyStore {
    fn subscribe(&self, collection: Collection, filter: Filter) -> StoreResult<Subscription> {
        if let Filter::Id(id) = &filter {
            Self::check(&self.failing_reads, id)?;
        }
        self.inner.subscribe(collection, filter)
    }

    fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        Self::check(&self.failing_reads, id)?;
        self.inner.get(collection, id)
    }

    fn query(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.inner.query(collection, filter)
    }

    fn write(&self, collection: Collection, id: &str, fields: Fields) -> StoreResult<()> {
        Self::check(&self.failing_writes, id)?;
        self.inner.write(collection, id, fields)
    }

    fn create(&self, collection: Collection, fields: Fields) -> StoreResult<String> {
        self.inner.create(collection, fields)
    }

    fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        Self::check(&self.failing_deletes, id)?;
        self.inner.delete(collection, id)
    }
}
