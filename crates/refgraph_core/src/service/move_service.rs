//! Move/reparent coordinator.
//!
//! # Responsibility
//! - Classify a drag intent and run the permission and cycle gates.
//! - Decide whether a move creates, merges, or severs a share relationship.
//! - Apply the decided writes, or hand back a typed conflict.
//!
//! # Invariants
//! - Gates run against the current store snapshot right before each write.
//! - A rejected move or an open conflict leaves the store untouched.
//! - Repeating a completed move is a no-op (`MoveOutcome::Unchanged`).

use crate::config::EngineConfig;
use crate::graph::{would_create_cycle, StoreFolders};
use crate::model::item::{Folder, FolderId, ItemKind, Sharing, TargetItem, UserId, Viewer};
use crate::model::shortcut::{Shortcut, ShortcutId};
use crate::permission::{can_edit, is_owner};
use crate::service::shortcut_service::{
    CreateShortcutRequest, ShortcutService, ShortcutServiceError,
};
use crate::store::{
    to_fields, Collection, ContentStore, ContentStoreExt, Fields, Filter, StoreError, StoreResult,
};
use log::{info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// The item being dragged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraggedRef {
    /// Node id; the target id when a shortcut is dragged.
    pub id: String,
    pub kind: ItemKind,
    /// Location the caller saw when the drag started.
    pub parent_id: Option<FolderId>,
    /// Set when the dragged entry is a shortcut projection.
    pub shortcut_id: Option<ShortcutId>,
}

impl DraggedRef {
    pub fn node(id: impl Into<String>, kind: ItemKind, parent_id: Option<FolderId>) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id,
            shortcut_id: None,
        }
    }

    pub fn shortcut(
        shortcut_id: impl Into<ShortcutId>,
        target_id: impl Into<String>,
        kind: ItemKind,
        parent_id: Option<FolderId>,
    ) -> Self {
        Self {
            id: target_id.into(),
            kind,
            parent_id,
            shortcut_id: Some(shortcut_id.into()),
        }
    }
}

/// Item a drag was dropped onto.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub id: String,
    pub kind: ItemKind,
    pub parent_id: Option<FolderId>,
}

/// Where a dragged item should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Root,
    Folder(FolderId),
    /// Dropping onto a folder nests into it; dropping onto a subject lands
    /// in that subject's folder.
    Onto(TargetRef),
}

impl Destination {
    /// Folder the item ends up in; `None` means root level.
    pub fn folder_id(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Folder(id) => Some(id.as_str()),
            Self::Onto(target) => match target.kind {
                ItemKind::Folder => Some(target.id.as_str()),
                ItemKind::Subject => target.parent_id.as_deref(),
            },
        }
    }
}

/// Why a move was refused without touching the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    /// Cycle or self-parenting attempt.
    StructuralViolation,
    PermissionDenied,
    /// Dragged item, shortcut, or destination folder does not exist.
    NotFound,
}

impl MoveRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StructuralViolation => "structural_violation",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
        }
    }
}

/// Share-field change applied together with a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharingChange {
    None,
    /// Destination is a strict superset of the source; its shares were taken.
    AdoptedDestination,
    AlignedToDestination,
    /// Destination and item both received the union of their shares.
    Merged,
    Unshared,
    Preserved,
}

/// Summary of a committed move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub kind: ItemKind,
    /// Node id, or shortcut id for shortcut moves.
    pub id: String,
    pub from: Option<FolderId>,
    pub to: Option<FolderId>,
    pub sharing: SharingChange,
    /// Documents a best-effort follow-up write could not update; retrying
    /// the same choice finishes them.
    pub pending: Vec<String>,
}

/// Non-owner asked to move a shortcut into a shared folder; only the
/// target's owner can do that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerMoveRequest {
    pub shortcut_id: ShortcutId,
    pub target_id: String,
    pub target_type: ItemKind,
    pub target_owner_id: Option<UserId>,
    pub destination_folder_id: FolderId,
}

/// Kind of share-boundary conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    SharedMismatch,
    UnshareOnExit,
}

/// Pending share-boundary decision. Nothing has been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveConflict {
    pub kind: ConflictKind,
    pub dragged: DraggedRef,
    pub source_folder_id: Option<FolderId>,
    pub destination_folder_id: Option<FolderId>,
    pub source_uids: Vec<UserId>,
    pub destination_uids: Vec<UserId>,
}

impl MoveConflict {
    /// Choices that resolve this conflict, `Cancel` excluded.
    pub fn choices(&self) -> [ConflictChoice; 2] {
        match self.kind {
            ConflictKind::SharedMismatch => {
                [ConflictChoice::AlignToDestination, ConflictChoice::Merge]
            }
            ConflictKind::UnshareOnExit => [
                ConflictChoice::MoveAndUnshare,
                ConflictChoice::MoveAndPreserveSharing,
            ],
        }
    }
}

/// Caller decision for a `MoveConflict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    AlignToDestination,
    Merge,
    MoveAndUnshare,
    MoveAndPreserveSharing,
    Cancel,
}

/// Terminal result of a move intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved(AppliedMove),
    /// A foreign item was organized into the viewer's tree as a shortcut.
    ShortcutPlaced { shortcut_id: ShortcutId },
    /// Already at the destination.
    Unchanged,
    Rejected(MoveRejection),
    RequestOwnerMove(OwnerMoveRequest),
    SharedMismatch(MoveConflict),
    UnshareOnExit(MoveConflict),
    /// Conflict dismissed by the caller.
    Cancelled,
}

/// Errors from move operations.
#[derive(Debug)]
pub enum MoveError {
    /// Content store failure; nothing after the failing write was applied.
    Store(StoreError),
    /// Choice does not resolve this kind of conflict.
    InvalidChoice {
        conflict: ConflictKind,
        choice: ConflictChoice,
    },
}

impl Display for MoveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::InvalidChoice { conflict, choice } => {
                write!(f, "choice {choice:?} does not resolve conflict {conflict:?}")
            }
        }
    }
}

impl Error for MoveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::InvalidChoice { .. } => None,
        }
    }
}

impl From<StoreError> for MoveError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Share state on both sides of a move.
struct Boundary {
    /// Nearest shared folder at or above the item's current folder.
    shared_source: Option<Folder>,
    source_uids: Vec<UserId>,
    destination_shared: bool,
    /// Destination is shared itself or sits under a shared folder.
    destination_in_shared_subtree: bool,
    destination_uids: Vec<UserId>,
}

impl Boundary {
    fn classify(&self) -> Classification {
        let source_shared = self.shared_source.is_some();
        if self.destination_shared
            && !source_shared
            && !self.destination_uids.is_empty()
            && self.destination_uids != self.source_uids
        {
            return Classification::Conflict(ConflictKind::SharedMismatch);
        }
        if source_shared && !self.destination_in_shared_subtree {
            return Classification::Conflict(ConflictKind::UnshareOnExit);
        }
        if self.destination_shared && is_strict_superset(&self.destination_uids, &self.source_uids)
        {
            return Classification::Adopt;
        }
        Classification::Direct
    }
}

enum Classification {
    Direct,
    Adopt,
    Conflict(ConflictKind),
}

fn is_strict_superset(larger: &[UserId], smaller: &[UserId]) -> bool {
    let larger: HashSet<&UserId> = larger.iter().collect();
    larger.len() > smaller.len() && smaller.iter().all(|uid| larger.contains(uid))
}

/// Move coordinator for one viewer.
pub struct MoveService<'a, S: ContentStore> {
    store: S,
    viewer: &'a Viewer,
    config: &'a EngineConfig,
}

impl<'a, S: ContentStore> MoveService<'a, S> {
    pub fn new(store: S, viewer: &'a Viewer, config: &'a EngineConfig) -> Self {
        Self {
            store,
            viewer,
            config,
        }
    }

    /// Runs one move intent to a terminal outcome.
    pub fn move_item(
        &self,
        dragged: &DraggedRef,
        destination: &Destination,
    ) -> Result<MoveOutcome, MoveError> {
        let destination_id = destination.folder_id();
        let destination_folder = match destination_id {
            Some(id) => match self.store.get_folder(id)? {
                Some(folder) => Some(folder),
                None => return Ok(self.reject(dragged, MoveRejection::NotFound)),
            },
            None => None,
        };

        if let Some(shortcut_id) = dragged.shortcut_id.as_deref() {
            return self.move_shortcut(dragged, shortcut_id, destination_folder.as_ref());
        }

        let Some(item) = self.store.get_target(dragged.kind, &dragged.id)? else {
            return Ok(self.reject(dragged, MoveRejection::NotFound));
        };
        if item.parent_id() == destination_id {
            return Ok(MoveOutcome::Unchanged);
        }

        if !is_owner(&item, &self.viewer.user_id)
            && destination_folder
                .as_ref()
                .map_or(true, |folder| {
                    folder.owner_id == self.viewer.user_id && !folder.sharing.is_shared
                })
        {
            return self.place_shortcut(dragged, &item, destination_id);
        }

        if let Some(rejection) = self.check_gates(&item, destination_folder.as_ref())? {
            return Ok(self.reject(dragged, rejection));
        }

        let boundary = self.boundary(&item, destination_folder.as_ref())?;
        match boundary.classify() {
            Classification::Conflict(kind) => {
                info!(
                    "event=move_item module=move status=conflict kind={:?} item_id={} destination={}",
                    kind,
                    item.id(),
                    destination_id.unwrap_or("root")
                );
                let conflict = MoveConflict {
                    kind,
                    dragged: dragged.clone(),
                    source_folder_id: item.parent_id().map(str::to_string),
                    destination_folder_id: destination_id.map(str::to_string),
                    source_uids: boundary.source_uids,
                    destination_uids: boundary.destination_uids,
                };
                Ok(match kind {
                    ConflictKind::SharedMismatch => MoveOutcome::SharedMismatch(conflict),
                    ConflictKind::UnshareOnExit => MoveOutcome::UnshareOnExit(conflict),
                })
            }
            Classification::Adopt => {
                let sharing = destination_folder
                    .as_ref()
                    .map(|folder| folder.sharing.clone())
                    .unwrap_or_default();
                self.apply(&item, destination_id, Some(&sharing), SharingChange::AdoptedDestination)
            }
            Classification::Direct => self.apply(&item, destination_id, None, SharingChange::None),
        }
    }

    /// Applies the caller's decision for a conflict returned by `move_item`.
    pub fn resolve_conflict(
        &self,
        conflict: &MoveConflict,
        choice: ConflictChoice,
    ) -> Result<MoveOutcome, MoveError> {
        if choice == ConflictChoice::Cancel {
            info!(
                "event=move_conflict module=move status=cancelled item_id={}",
                conflict.dragged.id
            );
            return Ok(MoveOutcome::Cancelled);
        }
        if !conflict.choices().contains(&choice) {
            return Err(MoveError::InvalidChoice {
                conflict: conflict.kind,
                choice,
            });
        }

        let dragged = &conflict.dragged;
        let destination_id = conflict.destination_folder_id.as_deref();
        let destination_folder = match destination_id {
            Some(id) => match self.store.get_folder(id)? {
                Some(folder) => Some(folder),
                None => return Ok(self.reject(dragged, MoveRejection::NotFound)),
            },
            None => None,
        };
        let Some(item) = self.store.get_target(dragged.kind, &dragged.id)? else {
            return Ok(self.reject(dragged, MoveRejection::NotFound));
        };
        if item.parent_id() == destination_id {
            // A repeated unshare finishes a cascade that failed partway.
            if choice == ConflictChoice::MoveAndUnshare && !item.sharing().is_shared {
                let pending = self.cascade_unshare(&item);
                if !pending.is_empty() {
                    warn!(
                        "event=move_item module=move status=partial step=cascade_retry folder_id={} pending={}",
                        item.id(),
                        pending.len()
                    );
                }
            }
            return Ok(MoveOutcome::Unchanged);
        }
        if let Some(rejection) = self.check_gates(&item, destination_folder.as_ref())? {
            return Ok(self.reject(dragged, rejection));
        }

        let boundary = self.boundary(&item, destination_folder.as_ref())?;
        let source_sharing = effective_source_sharing(&item, boundary.shared_source.as_ref());
        match choice {
            ConflictChoice::AlignToDestination => {
                let sharing = destination_folder
                    .as_ref()
                    .map(|folder| folder.sharing.clone())
                    .unwrap_or_default();
                self.apply(&item, destination_id, Some(&sharing), SharingChange::AlignedToDestination)
            }
            ConflictChoice::Merge => {
                let union = match destination_folder.as_ref() {
                    Some(folder) => {
                        let union = folder.sharing.union(&source_sharing);
                        self.store
                            .write(Collection::Folders, &folder.id, to_fields(&union)?)?;
                        union
                    }
                    None => source_sharing,
                };
                self.apply(&item, destination_id, Some(&union), SharingChange::Merged)
            }
            ConflictChoice::MoveAndUnshare => {
                let outcome = self.apply(
                    &item,
                    destination_id,
                    Some(&Sharing::cleared()),
                    SharingChange::Unshared,
                )?;
                match outcome {
                    MoveOutcome::Moved(mut applied) => {
                        applied.pending.extend(self.cascade_unshare(&item));
                        Ok(MoveOutcome::Moved(applied))
                    }
                    other => Ok(other),
                }
            }
            ConflictChoice::MoveAndPreserveSharing => {
                let preserved = boundary.shared_source.as_ref().map(|_| source_sharing);
                self.apply(&item, destination_id, preserved.as_ref(), SharingChange::Preserved)
            }
            ConflictChoice::Cancel => Ok(MoveOutcome::Cancelled),
        }
    }

    fn move_shortcut(
        &self,
        dragged: &DraggedRef,
        shortcut_id: &str,
        destination_folder: Option<&Folder>,
    ) -> Result<MoveOutcome, MoveError> {
        let Some(shortcut) = self.store.get_shortcut(shortcut_id)? else {
            return Ok(self.reject(dragged, MoveRejection::NotFound));
        };
        if shortcut.owner_id != self.viewer.user_id {
            return Ok(self.reject(dragged, MoveRejection::PermissionDenied));
        }
        let destination_id = destination_folder.map(|folder| folder.id.as_str());
        if shortcut.parent_id.as_deref() == destination_id {
            return Ok(MoveOutcome::Unchanged);
        }

        if let Some(folder) = destination_folder.filter(|folder| folder.sharing.is_shared) {
            let target = self
                .store
                .get_target(shortcut.target_type, &shortcut.target_id)?;
            let owns_target = target
                .as_ref()
                .is_some_and(|target| target.owner_id() == self.viewer.user_id);
            if !owns_target {
                info!(
                    "event=move_shortcut module=move status=request_owner_move shortcut_id={} destination={}",
                    shortcut.id, folder.id
                );
                return Ok(MoveOutcome::RequestOwnerMove(OwnerMoveRequest {
                    shortcut_id: shortcut.id.clone(),
                    target_id: shortcut.target_id.clone(),
                    target_type: shortcut.target_type,
                    target_owner_id: target.map(|target| target.owner_id().to_string()),
                    destination_folder_id: folder.id.clone(),
                }));
            }
        }

        if !self.location_writable(shortcut.parent_id.as_deref())?
            || !self.destination_writable(destination_folder)?
        {
            return Ok(self.reject(dragged, MoveRejection::PermissionDenied));
        }
        if shortcut.target_type == ItemKind::Folder
            && would_create_cycle(
                &shortcut.target_id,
                destination_id,
                &StoreFolders::new(&self.store),
                self.config.max_ancestry_depth,
            )
        {
            return Ok(self.reject(dragged, MoveRejection::StructuralViolation));
        }

        self.write_shortcut_location(&shortcut, destination_id)?;
        Ok(MoveOutcome::Moved(AppliedMove {
            kind: shortcut.target_type,
            id: shortcut.id.clone(),
            from: shortcut.parent_id.clone(),
            to: destination_id.map(str::to_string),
            sharing: SharingChange::None,
            pending: Vec::new(),
        }))
    }

    fn write_shortcut_location(
        &self,
        shortcut: &Shortcut,
        destination_id: Option<&str>,
    ) -> StoreResult<()> {
        let mut fields = Fields::new();
        fields.insert("parentId".to_string(), location_value(destination_id));
        self.store.write(Collection::Shortcuts, &shortcut.id, fields)?;
        info!(
            "event=move_shortcut module=move status=ok shortcut_id={} destination={}",
            shortcut.id,
            destination_id.unwrap_or("root")
        );
        Ok(())
    }

    fn place_shortcut(
        &self,
        dragged: &DraggedRef,
        item: &TargetItem,
        destination_id: Option<&str>,
    ) -> Result<MoveOutcome, MoveError> {
        let service = ShortcutService::new(&self.store, self.viewer, self.config);
        let request =
            CreateShortcutRequest::new(item.id(), item.kind(), destination_id.map(str::to_string));
        match service.create_shortcut(request) {
            Ok(shortcut_id) => Ok(MoveOutcome::ShortcutPlaced { shortcut_id }),
            Err(ShortcutServiceError::Store(err)) => Err(MoveError::Store(err)),
            Err(ShortcutServiceError::CycleDetected { .. }) => {
                Ok(self.reject(dragged, MoveRejection::StructuralViolation))
            }
            Err(ShortcutServiceError::PermissionDenied(_)) => {
                Ok(self.reject(dragged, MoveRejection::PermissionDenied))
            }
            Err(_) => Ok(self.reject(dragged, MoveRejection::NotFound)),
        }
    }

    fn check_gates(
        &self,
        item: &TargetItem,
        destination_folder: Option<&Folder>,
    ) -> StoreResult<Option<MoveRejection>> {
        if !self.location_writable(item.parent_id())? || !self.destination_writable(destination_folder)? {
            return Ok(Some(MoveRejection::PermissionDenied));
        }
        if item.kind() == ItemKind::Folder
            && would_create_cycle(
                item.id(),
                destination_folder.map(|folder| folder.id.as_str()),
                &StoreFolders::new(&self.store),
                self.config.max_ancestry_depth,
            )
        {
            return Ok(Some(MoveRejection::StructuralViolation));
        }
        Ok(None)
    }

    /// Whether the viewer may take something out of `folder_id`.
    fn location_writable(&self, folder_id: Option<&str>) -> StoreResult<bool> {
        let Some(folder_id) = folder_id else {
            return Ok(true);
        };
        match self.store.get_folder(folder_id)? {
            Some(folder) => self.folder_writable(&folder),
            None => Ok(true),
        }
    }

    fn destination_writable(&self, folder: Option<&Folder>) -> StoreResult<bool> {
        match folder {
            Some(folder) => self.folder_writable(folder),
            None => Ok(true),
        }
    }

    /// Edit rights on `folder`, falling back to the nearest shared ancestor.
    fn folder_writable(&self, folder: &Folder) -> StoreResult<bool> {
        if can_edit(folder, &self.viewer.user_id) {
            return Ok(true);
        }
        Ok(self
            .nearest_shared_folder(folder.parent_id.as_deref())?
            .is_some_and(|ancestor| can_edit(&ancestor, &self.viewer.user_id)))
    }

    /// First shared folder found walking up from `start`, inclusive.
    ///
    /// A missing folder, a revisit or the hop limit ends the walk with `None`.
    fn nearest_shared_folder(&self, start: Option<&str>) -> StoreResult<Option<Folder>> {
        let mut visited = HashSet::new();
        let mut cursor = start.map(str::to_string);
        while let Some(current) = cursor {
            if !visited.insert(current.clone()) || visited.len() > self.config.max_ancestry_depth {
                warn!(
                    "event=shared_ancestor_walk module=move status=stopped start={} stopped_at={}",
                    start.unwrap_or("root"),
                    current
                );
                return Ok(None);
            }
            let Some(folder) = self.store.get_folder(&current)? else {
                return Ok(None);
            };
            if folder.sharing.is_shared {
                return Ok(Some(folder));
            }
            cursor = folder.parent_id;
        }
        Ok(None)
    }

    fn boundary(
        &self,
        item: &TargetItem,
        destination_folder: Option<&Folder>,
    ) -> StoreResult<Boundary> {
        let shared_source = self.nearest_shared_folder(item.parent_id())?;
        let source_uids = effective_source_sharing(item, shared_source.as_ref()).uid_set();
        let destination_shared = destination_folder.is_some_and(|folder| folder.sharing.is_shared);
        let destination_in_shared_subtree = match destination_folder {
            Some(folder) if !destination_shared => self
                .nearest_shared_folder(folder.parent_id.as_deref())?
                .is_some(),
            _ => destination_shared,
        };
        let destination_uids = destination_folder
            .map(|folder| folder.sharing.uid_set())
            .unwrap_or_default();
        Ok(Boundary {
            shared_source,
            source_uids,
            destination_shared,
            destination_in_shared_subtree,
            destination_uids,
        })
    }

    fn apply(
        &self,
        item: &TargetItem,
        destination_id: Option<&str>,
        sharing: Option<&Sharing>,
        change: SharingChange,
    ) -> Result<MoveOutcome, MoveError> {
        let mut fields = Fields::new();
        fields.insert(item.location_field().to_string(), location_value(destination_id));
        if let Some(sharing) = sharing {
            fields.extend(to_fields(sharing)?);
        }
        let collection = Collection::for_kind(item.kind());
        self.store.write(collection, item.id(), fields)?;
        info!(
            "event=move_item module=move status=ok kind={} item_id={} from={} to={} sharing={:?}",
            item.kind().as_str(),
            item.id(),
            item.parent_id().unwrap_or("root"),
            destination_id.unwrap_or("root"),
            change
        );

        let mut pending = Vec::new();
        if let (ItemKind::Subject, Some(old_folder)) = (item.kind(), item.parent_id()) {
            if let Err(err) = self.detach_from_legacy_list(old_folder, item.id()) {
                warn!(
                    "event=move_item module=move status=partial step=legacy_detach folder_id={} item_id={} error={}",
                    old_folder,
                    item.id(),
                    err
                );
                pending.push(old_folder.to_string());
            }
        }

        Ok(MoveOutcome::Moved(AppliedMove {
            kind: item.kind(),
            id: item.id().to_string(),
            from: item.parent_id().map(str::to_string),
            to: destination_id.map(str::to_string),
            sharing: change,
            pending,
        }))
    }

    fn detach_from_legacy_list(&self, folder_id: &str, subject_id: &str) -> StoreResult<()> {
        let Some(folder) = self.store.get_folder(folder_id)? else {
            return Ok(());
        };
        if !folder.subject_ids.iter().any(|id| id == subject_id) {
            return Ok(());
        }
        let remaining: Vec<Value> = folder
            .subject_ids
            .into_iter()
            .filter(|id| id != subject_id)
            .map(Value::String)
            .collect();
        let mut fields = Fields::new();
        fields.insert("subjectIds".to_string(), Value::Array(remaining));
        self.store.write(Collection::Folders, folder_id, fields)
    }

    /// Unshares the direct subjects of a folder leaving a shared subtree,
    /// when enabled. Returns the ids still pending.
    fn cascade_unshare(&self, item: &TargetItem) -> Vec<String> {
        if item.kind() != ItemKind::Folder || !self.config.cascade_unshare_to_subjects {
            return Vec::new();
        }
        match self.unshare_direct_subjects(item.id()) {
            Ok(pending) => pending,
            Err(err) => {
                warn!(
                    "event=move_item module=move status=partial step=cascade_unshare folder_id={} error={}",
                    item.id(),
                    err
                );
                vec![item.id().to_string()]
            }
        }
    }

    /// Unshares the subjects directly inside `folder_id`. Returns the ids
    /// that could not be written.
    fn unshare_direct_subjects(&self, folder_id: &str) -> StoreResult<Vec<String>> {
        let subjects = self
            .store
            .query(Collection::Subjects, &Filter::field_eq("folderId", folder_id))?;
        let cleared = to_fields(&Sharing::cleared())?;
        let mut pending = Vec::new();
        for subject in subjects {
            let shared = subject
                .fields
                .get("isShared")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !shared {
                continue;
            }
            if let Err(err) = self
                .store
                .write(Collection::Subjects, &subject.id, cleared.clone())
            {
                warn!(
                    "event=move_item module=move status=partial step=cascade_unshare subject_id={} error={}",
                    subject.id, err
                );
                pending.push(subject.id);
            }
        }
        Ok(pending)
    }

    fn reject(&self, dragged: &DraggedRef, rejection: MoveRejection) -> MoveOutcome {
        warn!(
            "event=move_item module=move status=rejected reason={} item_id={} shortcut_id={}",
            rejection.as_str(),
            dragged.id,
            dragged.shortcut_id.as_deref().unwrap_or("-")
        );
        MoveOutcome::Rejected(rejection)
    }
}

/// Shares the item carries out of its source: its own grants united with
/// those of the shared folder it sits under, if any. Empty when neither side
/// is shared.
fn effective_source_sharing(item: &TargetItem, source_folder: Option<&Folder>) -> Sharing {
    match source_folder {
        Some(folder) if folder.sharing.is_shared => folder.sharing.union(item.sharing()),
        _ if item.sharing().is_shared => item.sharing().clone(),
        _ => Sharing::default(),
    }
}

fn location_value(folder_id: Option<&str>) -> Value {
    folder_id.map_or(Value::Null, |id| Value::String(id.to_string()))
}
