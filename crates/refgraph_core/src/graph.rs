//! Folder ancestry walks and cycle detection.
//!
//! # Responsibility
//! - Decide whether one folder is an ancestor of (or equal to) another.
//! - Guard every folder reparent against cycles and self-parenting.
//!
//! # Invariants
//! - Walks follow parent pointers only; no recursive descent.
//! - Walks always terminate. A revisited id ends the walk as "not a
//!   descendant"; the hop limit ends it as inconclusive. Both are logged.
//! - Reparent gates refuse an inconclusive walk.

use crate::config::DEFAULT_MAX_ANCESTRY_DEPTH;
use crate::model::item::{Folder, FolderId};
use crate::store::{ContentStore, ContentStoreExt};
use log::warn;
use std::collections::{HashMap, HashSet};

/// Parent-pointer view of the folder tree.
pub trait ParentLookup {
    /// Returns the parent of `folder_id`; `None` at root or when unknown.
    fn parent_of(&self, folder_id: &str) -> Option<FolderId>;
}

impl ParentLookup for HashMap<FolderId, Option<FolderId>> {
    fn parent_of(&self, folder_id: &str) -> Option<FolderId> {
        self.get(folder_id).cloned().flatten()
    }
}

impl ParentLookup for HashMap<FolderId, Folder> {
    fn parent_of(&self, folder_id: &str) -> Option<FolderId> {
        self.get(folder_id).and_then(|folder| folder.parent_id.clone())
    }
}

/// Parent index built once from a folder list.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    parents: HashMap<FolderId, Option<FolderId>>,
}

impl FolderIndex {
    pub fn new(folders: &[Folder]) -> Self {
        let parents = folders
            .iter()
            .map(|folder| (folder.id.clone(), folder.parent_id.clone()))
            .collect();
        Self { parents }
    }
}

impl ParentLookup for FolderIndex {
    fn parent_of(&self, folder_id: &str) -> Option<FolderId> {
        self.parents.parent_of(folder_id)
    }
}

/// Folder view that reads from a content store on demand.
///
/// As a `ParentLookup`, read failures end the walk at that hop.
pub struct StoreFolders<'a, S: ContentStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ContentStore + ?Sized> StoreFolders<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }
}

impl<S: ContentStore + ?Sized> ParentLookup for StoreFolders<'_, S> {
    fn parent_of(&self, folder_id: &str) -> Option<FolderId> {
        match self.store.get_folder(folder_id) {
            Ok(folder) => folder.and_then(|folder| folder.parent_id),
            Err(err) => {
                warn!(
                    "event=ancestry_lookup module=graph status=error folder_id={} error={}",
                    folder_id, err
                );
                None
            }
        }
    }
}

/// Returns whether `node` equals `candidate_ancestor` or sits anywhere below
/// it, using the folder list as the graph.
pub fn is_descendant(candidate_ancestor: &str, node: &str, all_folders: &[Folder]) -> bool {
    let index = FolderIndex::new(all_folders);
    is_descendant_in(
        candidate_ancestor,
        node,
        &index,
        DEFAULT_MAX_ANCESTRY_DEPTH,
    )
}

/// Result of walking a folder's parent chain toward a candidate ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Descendant,
    NotDescendant,
    /// The hop limit ran out with parents still left to visit.
    Inconclusive,
}

/// Walks `node`'s parent chain looking for `candidate_ancestor`.
///
/// A revisited id means the stored graph is already corrupt; the walk stops
/// with `NotDescendant`. Running out of hops on a longer chain yields
/// `Inconclusive`.
pub fn ancestry_in<L: ParentLookup + ?Sized>(
    candidate_ancestor: &str,
    node: &str,
    lookup: &L,
    max_depth: usize,
) -> Ancestry {
    if candidate_ancestor == node {
        return Ancestry::Descendant;
    }

    let mut visited = HashSet::new();
    visited.insert(node.to_string());
    let mut hops = 0usize;
    let mut cursor = lookup.parent_of(node);
    while let Some(current) = cursor {
        if current == candidate_ancestor {
            return Ancestry::Descendant;
        }
        if !visited.insert(current.clone()) {
            warn!(
                "event=ancestry_walk module=graph status=corrupt node={} revisited={}",
                node, current
            );
            return Ancestry::NotDescendant;
        }
        hops += 1;
        cursor = lookup.parent_of(&current);
        if cursor.is_some() && hops >= max_depth {
            warn!(
                "event=ancestry_walk module=graph status=depth_limit node={} max_depth={}",
                node, max_depth
            );
            return Ancestry::Inconclusive;
        }
    }
    Ancestry::NotDescendant
}

/// Lookup-generic form of [`is_descendant`] with an explicit hop limit.
///
/// Only a confirmed ancestor counts; an inconclusive walk reads as `false`.
pub fn is_descendant_in<L: ParentLookup + ?Sized>(
    candidate_ancestor: &str,
    node: &str,
    lookup: &L,
    max_depth: usize,
) -> bool {
    ancestry_in(candidate_ancestor, node, lookup, max_depth) == Ancestry::Descendant
}

/// Returns whether placing `folder_id` under `new_parent` would make the
/// folder its own ancestor.
///
/// A chain too deep to finish within `max_depth` counts as a cycle.
pub fn would_create_cycle<L: ParentLookup + ?Sized>(
    folder_id: &str,
    new_parent: Option<&str>,
    lookup: &L,
    max_depth: usize,
) -> bool {
    let Some(parent) = new_parent else {
        return false;
    };
    match ancestry_in(folder_id, parent, lookup, max_depth) {
        Ancestry::Descendant => true,
        Ancestry::NotDescendant => false,
        Ancestry::Inconclusive => {
            warn!(
                "event=cycle_check module=graph status=reject reason=depth_limit folder_id={} parent_id={}",
                folder_id, parent
            );
            true
        }
    }
}
