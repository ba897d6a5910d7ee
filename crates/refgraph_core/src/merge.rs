//! Child-list composition.
//!
//! # Responsibility
//! - Merge owned/visible nodes with shortcut projections into one list.
//! - Bucket merged items by parent for tree rendering.
//!
//! # Invariants
//! - Dedup key is `(kind, target id or id)`; the first item seen wins.
//! - Shortcuts are enumerated before direct items.
//! - A projection onto something the viewer owns never reaches the output.

use crate::model::item::{Folder, FolderId, ItemKind, Subject};
use crate::model::shortcut::ResolvedShortcut;
use std::collections::{BTreeMap, HashSet};

/// One entry in a merged child list.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeItem {
    Folder(Folder),
    Subject(Subject),
    Shortcut(ResolvedShortcut),
}

impl TreeItem {
    /// Kind of the node this item stands for.
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Folder(_) => ItemKind::Folder,
            Self::Subject(_) => ItemKind::Subject,
            Self::Shortcut(projection) => projection.target_type,
        }
    }

    /// Id of the node this item stands for; the target id for shortcuts.
    pub fn node_id(&self) -> &str {
        match self {
            Self::Folder(folder) => &folder.id,
            Self::Subject(subject) => &subject.id,
            Self::Shortcut(projection) => &projection.target_id,
        }
    }

    /// Location in the viewer's tree.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Folder(folder) => folder.parent_id.as_deref(),
            Self::Subject(subject) => subject.folder_id.as_deref(),
            Self::Shortcut(projection) => projection.parent_id.as_deref(),
        }
    }

    pub fn is_shortcut(&self) -> bool {
        matches!(self, Self::Shortcut(_))
    }

    fn dedup_key(&self) -> (ItemKind, String) {
        (self.kind(), self.node_id().to_string())
    }
}

/// Composes direct items and shortcut projections for `viewer_id`.
pub fn merge_children<D, P>(direct_items: D, projections: P, viewer_id: &str) -> Vec<TreeItem>
where
    D: IntoIterator<Item = TreeItem>,
    P: IntoIterator<Item = ResolvedShortcut>,
{
    let direct: Vec<TreeItem> = direct_items.into_iter().collect();
    let viewer_owned: HashSet<(ItemKind, String)> = direct
        .iter()
        .filter(|item| match item {
            TreeItem::Folder(folder) => folder.owner_id == viewer_id,
            TreeItem::Subject(subject) => subject.owner_id == viewer_id,
            TreeItem::Shortcut(_) => false,
        })
        .map(TreeItem::dedup_key)
        .collect();

    let shortcuts = projections
        .into_iter()
        .filter(|projection| {
            projection.target_owner_id.as_deref() != Some(viewer_id)
                && !viewer_owned.contains(&(projection.target_type, projection.target_id.clone()))
        })
        .map(TreeItem::Shortcut);

    let mut seen = HashSet::new();
    shortcuts
        .chain(direct)
        .filter(|item| seen.insert(item.dedup_key()))
        .collect()
}

/// Buckets items by parent, keeping input order inside each bucket.
pub fn group_by_parent<I>(items: I) -> BTreeMap<Option<FolderId>, Vec<TreeItem>>
where
    I: IntoIterator<Item = TreeItem>,
{
    let mut buckets: BTreeMap<Option<FolderId>, Vec<TreeItem>> = BTreeMap::new();
    for item in items {
        buckets
            .entry(item.parent_id().map(str::to_string))
            .or_default()
            .push(item);
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::{group_by_parent, merge_children, TreeItem};
    use crate::model::item::{ItemKind, Subject, TargetItem};
    use crate::model::shortcut::{ResolvedShortcut, Shortcut, ShortcutOverrides};

    fn projection(id: &str, target: &TargetItem, parent: Option<&str>) -> ResolvedShortcut {
        let shortcut = Shortcut {
            id: id.to_string(),
            owner_id: "viewer".to_string(),
            parent_id: parent.map(str::to_string),
            target_id: target.id().to_string(),
            target_type: ItemKind::Subject,
            institution_id: None,
            hidden_in_manual: false,
            overrides: ShortcutOverrides::default(),
            created_at: 0,
        };
        ResolvedShortcut::healthy(&shortcut, target)
    }

    #[test]
    fn shortcut_wins_over_same_foreign_direct_item() {
        let foreign = Subject::new("x", "owner", Some("their-folder".into()), "X");
        let target = TargetItem::Subject(foreign.clone());
        let merged = merge_children(
            vec![TreeItem::Subject(foreign)],
            vec![projection("s1", &target, Some("mine"))],
            "viewer",
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_shortcut());
        assert_eq!(merged[0].parent_id(), Some("mine"));
    }

    #[test]
    fn projection_onto_viewer_owned_item_is_suppressed() {
        let owned = Subject::new("x", "viewer", None, "X");
        let target = TargetItem::Subject(owned.clone());
        let merged = merge_children(
            vec![TreeItem::Subject(owned)],
            vec![projection("s1", &target, Some("elsewhere"))],
            "viewer",
        );
        assert_eq!(merged, vec![TreeItem::Subject(Subject::new("x", "viewer", None, "X"))]);
    }

    #[test]
    fn grouping_keeps_order_inside_bucket() {
        let items = vec![
            TreeItem::Subject(Subject::new("a", "viewer", Some("f".into()), "A")),
            TreeItem::Subject(Subject::new("b", "viewer", None, "B")),
            TreeItem::Subject(Subject::new("c", "viewer", Some("f".into()), "C")),
        ];
        let buckets = group_by_parent(items);
        let in_f: Vec<_> = buckets[&Some("f".to_string())]
            .iter()
            .map(TreeItem::node_id)
            .collect();
        assert_eq!(in_f, vec!["a", "c"]);
        assert_eq!(buckets[&None].len(), 1);
    }
}
