//! Engine facade.
//!
//! # Responsibility
//! - Bind one content store, one viewer identity, and one config.
//! - Expose the hierarchy operations callers use.
//!
//! # Invariants
//! - Every operation acts on behalf of `viewer` only.
//! - One promotion watcher is shared by every feed opened on this engine.

use crate::config::{ConfigError, EngineConfig};
use crate::graph;
use crate::merge::{merge_children, TreeItem};
use crate::model::item::{Folder, FolderId, InstitutionId, ItemKind, Subject, Viewer};
use crate::model::shortcut::{ResolvedShortcut, Shortcut, ShortcutId, ShortcutOverrides};
use crate::permission::can_view;
use crate::resolver::{load_snapshot, resolve_all};
use crate::service::feed::ShortcutFeed;
use crate::service::move_service::{
    ConflictChoice, Destination, DraggedRef, MoveConflict, MoveError, MoveOutcome, MoveService,
};
use crate::service::promotion::PromotionWatcher;
use crate::service::shortcut_service::{
    CreateShortcutRequest, ShortcutService, ShortcutServiceError,
};
use crate::store::{Collection, ContentStore, ContentStoreExt, Filter, StoreResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Hierarchical reference graph engine for one viewer.
pub struct ReferenceGraphEngine<S: ContentStore> {
    store: S,
    viewer: Viewer,
    config: EngineConfig,
    watcher: Arc<PromotionWatcher>,
}

impl<S: ContentStore> ReferenceGraphEngine<S> {
    /// Creates an engine with default configuration.
    pub fn new(store: S, viewer: Viewer) -> Self {
        let config = EngineConfig::default();
        let watcher = Arc::new(PromotionWatcher::new(config.max_ancestry_depth));
        Self {
            store,
            viewer,
            config,
            watcher,
        }
    }

    /// Creates an engine after validating `config`.
    pub fn with_config(store: S, viewer: Viewer, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let watcher = Arc::new(PromotionWatcher::new(config.max_ancestry_depth));
        Ok(Self {
            store,
            viewer,
            config,
            watcher,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens a live stream of the viewer's resolved shortcuts.
    pub fn resolve_shortcuts(&self) -> StoreResult<ShortcutFeed<&S>> {
        ShortcutFeed::open(
            &self.store,
            self.viewer.clone(),
            self.config.clone(),
            Arc::clone(&self.watcher),
        )
    }

    /// Resolves the viewer's shortcuts once against the current store state.
    ///
    /// Read failures degrade to orphans; only listing the shortcuts can fail.
    pub fn resolve_shortcuts_once(&self) -> StoreResult<Vec<ResolvedShortcut>> {
        let shortcuts: Vec<Shortcut> = self.store.query_as(
            Collection::Shortcuts,
            &Filter::field_eq("ownerId", self.viewer.user_id.as_str()),
        )?;
        let snapshots = shortcuts
            .iter()
            .map(|shortcut| {
                (
                    (shortcut.target_type, shortcut.target_id.clone()),
                    load_snapshot(&self.store, shortcut),
                )
            })
            .collect::<HashMap<_, _>>();
        Ok(resolve_all(
            &shortcuts,
            &snapshots,
            &self.viewer,
            &graph::StoreFolders::new(&self.store),
        ))
    }

    /// Runs a drag intent to a terminal outcome.
    pub fn move_item(
        &self,
        dragged: &DraggedRef,
        destination: &Destination,
    ) -> Result<MoveOutcome, MoveError> {
        self.move_service().move_item(dragged, destination)
    }

    /// Applies a caller decision to a conflict returned by `move_item`.
    pub fn resolve_move_conflict(
        &self,
        conflict: &MoveConflict,
        choice: ConflictChoice,
    ) -> Result<MoveOutcome, MoveError> {
        self.move_service().resolve_conflict(conflict, choice)
    }

    /// Creates or updates the viewer's shortcut to a target.
    pub fn create_shortcut(
        &self,
        target_id: &str,
        target_type: ItemKind,
        parent_id: Option<FolderId>,
        institution_id: Option<InstitutionId>,
        overrides: ShortcutOverrides,
    ) -> Result<ShortcutId, ShortcutServiceError> {
        let mut request = CreateShortcutRequest::new(target_id, target_type, parent_id);
        request.institution_id = institution_id;
        request.overrides = overrides;
        self.shortcut_service().create_shortcut(request)
    }

    pub fn delete_shortcut(&self, shortcut_id: &str) -> Result<(), ShortcutServiceError> {
        self.shortcut_service().delete_shortcut(shortcut_id)
    }

    pub fn update_shortcut_presentation(
        &self,
        shortcut_id: &str,
        overrides: &ShortcutOverrides,
    ) -> Result<(), ShortcutServiceError> {
        self.shortcut_service()
            .update_presentation(shortcut_id, overrides)
    }

    pub fn set_shortcut_hidden(
        &self,
        shortcut_id: &str,
        hidden: bool,
    ) -> Result<(), ShortcutServiceError> {
        self.shortcut_service().set_hidden(shortcut_id, hidden)
    }

    /// Removes duplicate shortcuts, keeping the earliest per target.
    pub fn consolidate_duplicate_shortcuts(&self) -> Result<usize, ShortcutServiceError> {
        self.shortcut_service().consolidate_duplicates()
    }

    /// Returns whether `node` is `candidate_ancestor` or sits below it.
    pub fn is_descendant(&self, candidate_ancestor: &str, node: &str, all_folders: &[Folder]) -> bool {
        graph::is_descendant_in(
            candidate_ancestor,
            node,
            &graph::FolderIndex::new(all_folders),
            self.config.max_ancestry_depth,
        )
    }

    /// Builds the viewer's child list under `parent_id` from visible nodes
    /// and the given shortcut projections.
    pub fn list_children(
        &self,
        parent_id: Option<&str>,
        projections: &[ResolvedShortcut],
    ) -> StoreResult<Vec<TreeItem>> {
        let location = parent_id.map_or(Value::Null, |id| Value::String(id.to_string()));
        let folders: Vec<Folder> = self
            .store
            .query_as(Collection::Folders, &Filter::field_eq("parentId", location.clone()))?;
        let subjects: Vec<Subject> = self
            .store
            .query_as(Collection::Subjects, &Filter::field_eq("folderId", location))?;

        let user_id = self.viewer.user_id.as_str();
        let direct = folders
            .into_iter()
            .filter(|folder| can_view(folder, user_id))
            .map(TreeItem::Folder)
            .chain(
                subjects
                    .into_iter()
                    .filter(|subject| can_view(subject, user_id))
                    .map(TreeItem::Subject),
            );
        let shortcuts = projections
            .iter()
            .filter(|projection| projection.parent_id.as_deref() == parent_id)
            .cloned();
        Ok(merge_children(direct, shortcuts, user_id))
    }

    fn shortcut_service(&self) -> ShortcutService<'_, &S> {
        ShortcutService::new(&self.store, &self.viewer, &self.config)
    }

    fn move_service(&self) -> MoveService<'_, &S> {
        MoveService::new(&self.store, &self.viewer, &self.config)
    }
}
