//! Shortcut resolution.
//!
//! # Responsibility
//! - Project shortcut records onto live target snapshots.
//! - Classify unreachable targets as orphans with a reason.
//! - Track per-shortcut resolution state driven by discrete events.
//!
//! # Invariants
//! - Resolution is total: every shortcut yields exactly one projection.
//! - Orphan appearance is built from shortcut overrides only, never from
//!   target data.
//! - `ShortcutTable::apply` is the only place resolution state changes.

use crate::graph::StoreFolders;
use crate::model::item::{Folder, FolderId, ItemKind, TargetItem, Viewer};
use crate::model::shortcut::{MovedTo, OrphanReason, ResolvedShortcut, Shortcut, ShortcutId};
use crate::permission::can_view;
use crate::store::{ContentStore, ContentStoreExt, StoreResult};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

/// Latest known state of one shortcut target.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSnapshot {
    /// Target document does not exist (deleted or never readable).
    Missing,
    Present(TargetItem),
    /// Target read failed; the message is diagnostic only.
    Failed(String),
}

impl TargetSnapshot {
    pub fn target(&self) -> Option<&TargetItem> {
        match self {
            Self::Present(target) => Some(target),
            _ => None,
        }
    }
}

/// Point lookup of folders, used for the one-hop shared-parent check.
pub trait FolderSource {
    fn folder(&self, folder_id: &str) -> StoreResult<Option<Folder>>;
}

impl FolderSource for HashMap<FolderId, Folder> {
    fn folder(&self, folder_id: &str) -> StoreResult<Option<Folder>> {
        Ok(self.get(folder_id).cloned())
    }
}

impl<S: ContentStore + ?Sized> FolderSource for StoreFolders<'_, S> {
    fn folder(&self, folder_id: &str) -> StoreResult<Option<Folder>> {
        self.store().get_folder(folder_id)
    }
}

fn tenant_mismatch(item_tenant: Option<&str>, viewer_tenant: Option<&str>) -> bool {
    matches!((item_tenant, viewer_tenant), (Some(item), Some(viewer)) if item != viewer)
}

/// Resolves one shortcut against the latest snapshot of its target.
pub fn resolve_shortcut<F: FolderSource + ?Sized>(
    shortcut: &Shortcut,
    snapshot: &TargetSnapshot,
    viewer: &Viewer,
    folders: &F,
) -> ResolvedShortcut {
    let viewer_tenant = viewer.institution_id.as_deref();
    if tenant_mismatch(shortcut.institution_id.as_deref(), viewer_tenant) {
        return ResolvedShortcut::orphan(shortcut, Some(OrphanReason::TenantMismatch));
    }

    let target = match snapshot {
        TargetSnapshot::Missing => return ResolvedShortcut::orphan(shortcut, None),
        TargetSnapshot::Failed(message) => {
            warn!(
                "event=shortcut_resolve module=resolver status=degraded shortcut_id={} error={}",
                shortcut.id, message
            );
            return ResolvedShortcut::orphan(shortcut, Some(OrphanReason::SnapshotError));
        }
        TargetSnapshot::Present(target) => target,
    };

    if target.kind() != shortcut.target_type || target.id() != shortcut.target_id {
        warn!(
            "event=shortcut_resolve module=resolver status=degraded shortcut_id={} target_id={} snapshot_id={}",
            shortcut.id,
            shortcut.target_id,
            target.id()
        );
        return ResolvedShortcut::orphan(shortcut, Some(OrphanReason::SnapshotError));
    }

    if tenant_mismatch(target.institution_id(), viewer_tenant) {
        return ResolvedShortcut::orphan(shortcut, Some(OrphanReason::TenantMismatch));
    }

    if !can_view(target, &viewer.user_id) {
        return ResolvedShortcut::orphan(shortcut, Some(OrphanReason::AccessRevoked));
    }

    if let Some(parent_id) = target.parent_id() {
        match folders.folder(parent_id) {
            Ok(Some(parent)) if parent.sharing.is_shared => {
                let mut projection =
                    ResolvedShortcut::orphan(shortcut, Some(OrphanReason::MovedToSharedFolder));
                projection.source_parent_id = Some(parent.id.clone());
                projection.moved_to = Some(MovedTo {
                    folder_id: parent.id,
                    folder_name: parent.name,
                });
                return projection;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(
                    "event=shortcut_resolve module=resolver status=skip step=parent_lookup shortcut_id={} parent_id={} error={}",
                    shortcut.id, parent_id, err
                );
            }
        }
    }

    ResolvedShortcut::healthy(shortcut, target)
}

/// Resolves a batch of shortcuts against a snapshot map keyed by target.
///
/// Targets absent from the map resolve as missing. Output order follows the
/// shortcuts' primary key.
pub fn resolve_all<F: FolderSource + ?Sized>(
    shortcuts: &[Shortcut],
    snapshots: &HashMap<(ItemKind, String), TargetSnapshot>,
    viewer: &Viewer,
    folders: &F,
) -> Vec<ResolvedShortcut> {
    let mut ordered: Vec<&Shortcut> = shortcuts.iter().collect();
    ordered.sort_by(|left, right| left.primary_key().cmp(&right.primary_key()));
    ordered
        .into_iter()
        .map(|shortcut| {
            let key = (shortcut.target_type, shortcut.target_id.clone());
            let snapshot = snapshots.get(&key).unwrap_or(&TargetSnapshot::Missing);
            resolve_shortcut(shortcut, snapshot, viewer, folders)
        })
        .collect()
}

/// Reads the current target of `shortcut` from a store as a snapshot.
pub fn load_snapshot<S: ContentStore + ?Sized>(store: &S, shortcut: &Shortcut) -> TargetSnapshot {
    match store.get_target(shortcut.target_type, &shortcut.target_id) {
        Ok(Some(target)) => TargetSnapshot::Present(target),
        Ok(None) => TargetSnapshot::Missing,
        Err(err) => TargetSnapshot::Failed(err.to_string()),
    }
}

/// Resolution state of one shortcut.
#[derive(Debug, Clone, PartialEq)]
pub enum ShortcutState {
    /// No target snapshot has arrived yet.
    Unresolved,
    Healthy(ResolvedShortcut),
    Orphan(ResolvedShortcut),
}

impl ShortcutState {
    fn from_projection(projection: ResolvedShortcut) -> Self {
        if projection.is_orphan {
            Self::Orphan(projection)
        } else {
            Self::Healthy(projection)
        }
    }

    pub fn projection(&self) -> Option<&ResolvedShortcut> {
        match self {
            Self::Unresolved => None,
            Self::Healthy(projection) | Self::Orphan(projection) => Some(projection),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

/// Input to the resolution reducer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolverEvent {
    /// A shortcut record appeared or changed.
    ShortcutUpserted(Shortcut),
    ShortcutRemoved(ShortcutId),
    /// A fresh snapshot of the target behind `shortcut_id`.
    TargetSnapshot {
        shortcut_id: ShortcutId,
        snapshot: TargetSnapshot,
    },
    /// The target subscription for `shortcut_id` could not be opened or
    /// pushed an error.
    TargetFailed {
        shortcut_id: ShortcutId,
        message: String,
    },
    /// The folder holding the target changed; re-resolve from the last
    /// snapshot.
    TargetParentChanged { shortcut_id: ShortcutId },
}

#[derive(Debug, Clone)]
struct Entry {
    shortcut: Shortcut,
    snapshot: Option<TargetSnapshot>,
    state: ShortcutState,
}

impl Entry {
    fn resolve<F: FolderSource + ?Sized>(&self, viewer: &Viewer, folders: &F) -> ShortcutState {
        match &self.snapshot {
            Some(snapshot) => {
                ShortcutState::from_projection(resolve_shortcut(&self.shortcut, snapshot, viewer, folders))
            }
            // Tenant mismatch on the shortcut itself needs no target data.
            None if tenant_mismatch(
                self.shortcut.institution_id.as_deref(),
                viewer.institution_id.as_deref(),
            ) =>
            {
                ShortcutState::from_projection(ResolvedShortcut::orphan(
                    &self.shortcut,
                    Some(OrphanReason::TenantMismatch),
                ))
            }
            None => ShortcutState::Unresolved,
        }
    }
}

/// Per-shortcut resolution state for one viewer.
#[derive(Debug, Clone, Default)]
pub struct ShortcutTable {
    entries: BTreeMap<ShortcutId, Entry>,
}

impl ShortcutTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event and returns whether any projection changed.
    ///
    /// Re-applying an event that was already applied is a no-op.
    pub fn apply<F: FolderSource + ?Sized>(
        &mut self,
        event: ResolverEvent,
        viewer: &Viewer,
        folders: &F,
    ) -> bool {
        match event {
            ResolverEvent::ShortcutUpserted(shortcut) => {
                let id = shortcut.id.clone();
                let previous = self.entries.remove(&id);
                let (snapshot, old_state) = match previous {
                    Some(entry) if entry.shortcut == shortcut => {
                        self.entries.insert(id, entry);
                        return false;
                    }
                    Some(entry) if entry.shortcut.same_target(&shortcut) => {
                        (entry.snapshot, Some(entry.state))
                    }
                    Some(entry) => (None, Some(entry.state)),
                    None => (None, None),
                };
                let mut entry = Entry {
                    shortcut,
                    snapshot,
                    state: ShortcutState::Unresolved,
                };
                entry.state = entry.resolve(viewer, folders);
                let changed = old_state.as_ref() != Some(&entry.state);
                self.entries.insert(id, entry);
                changed
            }
            ResolverEvent::ShortcutRemoved(id) => self.entries.remove(&id).is_some(),
            ResolverEvent::TargetSnapshot {
                shortcut_id,
                snapshot,
            } => self.record_snapshot(&shortcut_id, snapshot, viewer, folders),
            ResolverEvent::TargetFailed {
                shortcut_id,
                message,
            } => self.record_snapshot(
                &shortcut_id,
                TargetSnapshot::Failed(message),
                viewer,
                folders,
            ),
            ResolverEvent::TargetParentChanged { shortcut_id } => {
                let Some(entry) = self.entries.get_mut(&shortcut_id) else {
                    return false;
                };
                let next = entry.resolve(viewer, folders);
                if next == entry.state {
                    return false;
                }
                entry.state = next;
                true
            }
        }
    }

    fn record_snapshot<F: FolderSource + ?Sized>(
        &mut self,
        shortcut_id: &str,
        snapshot: TargetSnapshot,
        viewer: &Viewer,
        folders: &F,
    ) -> bool {
        let Some(entry) = self.entries.get_mut(shortcut_id) else {
            return false;
        };
        entry.snapshot = Some(snapshot);
        let next = entry.resolve(viewer, folders);
        if next == entry.state {
            return false;
        }
        entry.state = next;
        true
    }

    /// Re-resolves every entry from its last snapshot, e.g. after a folder
    /// sharing change. Returns whether anything changed.
    pub fn refresh<F: FolderSource + ?Sized>(&mut self, viewer: &Viewer, folders: &F) -> bool {
        let mut changed = false;
        for entry in self.entries.values_mut() {
            let next = entry.resolve(viewer, folders);
            if next != entry.state {
                entry.state = next;
                changed = true;
            }
        }
        changed
    }

    pub fn state(&self, shortcut_id: &str) -> Option<&ShortcutState> {
        self.entries.get(shortcut_id).map(|entry| &entry.state)
    }

    pub fn shortcut(&self, shortcut_id: &str) -> Option<&Shortcut> {
        self.entries.get(shortcut_id).map(|entry| &entry.shortcut)
    }

    pub fn shortcuts(&self) -> impl Iterator<Item = &Shortcut> {
        self.entries.values().map(|entry| &entry.shortcut)
    }

    pub fn contains(&self, shortcut_id: &str) -> bool {
        self.entries.contains_key(shortcut_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns whether every shortcut has left `Unresolved`.
    pub fn is_settled(&self) -> bool {
        self.entries.values().all(|entry| !entry.state.is_unresolved())
    }

    /// Resolved projections ordered by shortcut primary key.
    ///
    /// Shortcuts still `Unresolved` are left out.
    pub fn projections(&self) -> Vec<ResolvedShortcut> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by(|left, right| left.shortcut.primary_key().cmp(&right.shortcut.primary_key()));
        entries
            .into_iter()
            .filter_map(|entry| entry.state.projection().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_shortcut, ResolverEvent, ShortcutState, ShortcutTable, TargetSnapshot};
    use crate::model::item::{Folder, ItemKind, Subject, TargetItem, Viewer};
    use crate::model::shortcut::{OrphanReason, Shortcut, ShortcutOverrides};
    use std::collections::HashMap;

    fn shortcut(id: &str, target: &str) -> Shortcut {
        Shortcut {
            id: id.to_string(),
            owner_id: "viewer".to_string(),
            parent_id: None,
            target_id: target.to_string(),
            target_type: ItemKind::Subject,
            institution_id: None,
            hidden_in_manual: false,
            overrides: ShortcutOverrides::default(),
            created_at: 1,
        }
    }

    fn shared_subject(id: &str) -> TargetItem {
        let mut subject = Subject::new(id, "owner", None, "Physics");
        subject.sharing.is_shared = true;
        subject.sharing.shared_with_uids = vec!["viewer".to_string()];
        TargetItem::Subject(subject)
    }

    #[test]
    fn failed_snapshot_degrades_to_snapshot_error() {
        let folders: HashMap<String, Folder> = HashMap::new();
        let viewer = Viewer::new("viewer", None);
        let resolved = resolve_shortcut(
            &shortcut("s1", "x"),
            &TargetSnapshot::Failed("offline".into()),
            &viewer,
            &folders,
        );
        assert!(resolved.is_orphan);
        assert_eq!(resolved.reason, Some(OrphanReason::SnapshotError));
    }

    #[test]
    fn table_waits_for_snapshot_and_ignores_repeats() {
        let folders: HashMap<String, Folder> = HashMap::new();
        let viewer = Viewer::new("viewer", None);
        let mut table = ShortcutTable::new();

        assert!(!table.apply(
            ResolverEvent::ShortcutUpserted(shortcut("s1", "x")),
            &viewer,
            &folders
        ));
        assert_eq!(table.state("s1"), Some(&ShortcutState::Unresolved));
        assert!(!table.is_settled());

        let event = ResolverEvent::TargetSnapshot {
            shortcut_id: "s1".into(),
            snapshot: TargetSnapshot::Present(shared_subject("x")),
        };
        assert!(table.apply(event.clone(), &viewer, &folders));
        assert!(!table.apply(event, &viewer, &folders));
        assert!(table.is_settled());
        assert!(matches!(table.state("s1"), Some(ShortcutState::Healthy(_))));
    }

    #[test]
    fn retargeted_shortcut_drops_old_snapshot() {
        let folders: HashMap<String, Folder> = HashMap::new();
        let viewer = Viewer::new("viewer", None);
        let mut table = ShortcutTable::new();
        table.apply(
            ResolverEvent::ShortcutUpserted(shortcut("s1", "x")),
            &viewer,
            &folders,
        );
        table.apply(
            ResolverEvent::TargetSnapshot {
                shortcut_id: "s1".into(),
                snapshot: TargetSnapshot::Present(shared_subject("x")),
            },
            &viewer,
            &folders,
        );

        assert!(table.apply(
            ResolverEvent::ShortcutUpserted(shortcut("s1", "y")),
            &viewer,
            &folders
        ));
        assert_eq!(table.state("s1"), Some(&ShortcutState::Unresolved));
        assert!(table.projections().is_empty());
    }

    #[test]
    fn snapshot_for_unknown_shortcut_is_ignored() {
        let folders: HashMap<String, Folder> = HashMap::new();
        let viewer = Viewer::new("viewer", None);
        let mut table = ShortcutTable::new();
        assert!(!table.apply(
            ResolverEvent::TargetFailed {
                shortcut_id: "ghost".into(),
                message: "boom".into(),
            },
            &viewer,
            &folders
        ));
        assert!(table.is_empty());
    }
}
