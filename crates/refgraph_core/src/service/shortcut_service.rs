//! Shortcut lifecycle use-case service.
//!
//! # Responsibility
//! - Create, re-target, restyle, and delete a viewer's shortcuts.
//! - Keep at most one shortcut per `(owner, target)`.
//!
//! # Invariants
//! - Shortcut operations never write to the target document.
//! - The earliest record (`created_at`, then `id`) survives consolidation.
//! - Duplicate cleanup failures are logged and never fail the caller.
//! - A folder shortcut is never placed inside the folder it points at.

use crate::config::EngineConfig;
use crate::graph::{would_create_cycle, StoreFolders};
use crate::model::item::{FolderId, InstitutionId, ItemKind, Viewer};
use crate::model::shortcut::{Shortcut, ShortcutId, ShortcutOverrides};
use crate::permission::can_edit;
use crate::store::{
    to_fields, Collection, ContentStore, ContentStoreExt, Fields, Filter, StoreError,
};
use log::{info, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Errors from shortcut service operations.
#[derive(Debug)]
pub enum ShortcutServiceError {
    /// Target id is blank after trim.
    InvalidTarget(String),
    /// Shortcut does not exist.
    NotFound(ShortcutId),
    /// Requested parent folder does not exist.
    ParentNotFound(FolderId),
    /// Viewer does not own the shortcut or cannot write the parent folder.
    PermissionDenied(String),
    /// Placing the folder shortcut would nest the folder inside itself.
    CycleDetected {
        target_id: String,
        parent_id: FolderId,
    },
    /// Content store failure.
    Store(StoreError),
}

impl Display for ShortcutServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTarget(id) => write!(f, "invalid shortcut target: `{id}`"),
            Self::NotFound(id) => write!(f, "shortcut not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "shortcut parent folder not found: {id}"),
            Self::PermissionDenied(id) => write!(f, "permission denied for shortcut operation on {id}"),
            Self::CycleDetected {
                target_id,
                parent_id,
            } => write!(
                f,
                "shortcut would create cycle: folder {target_id} under parent {parent_id}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ShortcutServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ShortcutServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Request payload for `create_shortcut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateShortcutRequest {
    pub target_id: String,
    pub target_type: ItemKind,
    pub parent_id: Option<FolderId>,
    pub institution_id: Option<InstitutionId>,
    pub overrides: ShortcutOverrides,
}

impl CreateShortcutRequest {
    pub fn new(target_id: impl Into<String>, target_type: ItemKind, parent_id: Option<FolderId>) -> Self {
        Self {
            target_id: target_id.into(),
            target_type,
            parent_id,
            institution_id: None,
            overrides: ShortcutOverrides::default(),
        }
    }
}

/// Shortcut service facade for one viewer.
pub struct ShortcutService<'a, S: ContentStore> {
    store: S,
    viewer: &'a Viewer,
    config: &'a EngineConfig,
}

impl<'a, S: ContentStore> ShortcutService<'a, S> {
    pub fn new(store: S, viewer: &'a Viewer, config: &'a EngineConfig) -> Self {
        Self {
            store,
            viewer,
            config,
        }
    }

    /// Creates the viewer's shortcut to a target, or updates the existing one.
    ///
    /// When shortcuts to the same target already exist, the earliest one is
    /// moved to `parent_id` and restyled; the rest are deleted.
    pub fn create_shortcut(
        &self,
        request: CreateShortcutRequest,
    ) -> Result<ShortcutId, ShortcutServiceError> {
        let target_id = request.target_id.trim();
        if target_id.is_empty() {
            return Err(ShortcutServiceError::InvalidTarget(request.target_id.clone()));
        }
        if let Some(parent_id) = request.parent_id.as_deref() {
            self.ensure_parent_writable(parent_id)?;
            if request.target_type == ItemKind::Folder
                && would_create_cycle(
                    target_id,
                    Some(parent_id),
                    &StoreFolders::new(&self.store),
                    self.config.max_ancestry_depth,
                )
            {
                warn!(
                    "event=shortcut_create module=shortcut status=rejected reason=cycle target_id={} parent_id={}",
                    target_id, parent_id
                );
                return Err(ShortcutServiceError::CycleDetected {
                    target_id: target_id.to_string(),
                    parent_id: parent_id.to_string(),
                });
            }
        }

        let mut existing = self.shortcuts_to(request.target_type, target_id)?;
        if existing.is_empty() {
            let record = Shortcut {
                id: String::new(),
                owner_id: self.viewer.user_id.clone(),
                parent_id: request.parent_id.clone(),
                target_id: target_id.to_string(),
                target_type: request.target_type,
                institution_id: request
                    .institution_id
                    .clone()
                    .or_else(|| self.viewer.institution_id.clone()),
                hidden_in_manual: false,
                overrides: request.overrides,
                created_at: now_epoch_ms(),
            };
            let id = self.store.insert(Collection::Shortcuts, &record)?;
            info!(
                "event=shortcut_create module=shortcut status=ok shortcut_id={} target_id={} target_type={}",
                id,
                target_id,
                request.target_type.as_str()
            );
            return Ok(id);
        }

        let primary = existing.remove(0);
        let mut fields = Fields::new();
        fields.insert("targetId".to_string(), Value::String(target_id.to_string()));
        fields.insert(
            "targetType".to_string(),
            Value::String(request.target_type.as_str().to_string()),
        );
        fields.insert(
            "parentId".to_string(),
            request.parent_id.clone().map_or(Value::Null, Value::String),
        );
        if let Some(institution_id) = request.institution_id.clone() {
            fields.insert("institutionId".to_string(), Value::String(institution_id));
        }
        if !request.overrides.is_empty() {
            let merged = primary.overrides.overlaid_with(&request.overrides);
            fields.extend(to_fields(&merged)?);
        }
        self.store.write(Collection::Shortcuts, &primary.id, fields)?;
        info!(
            "event=shortcut_create module=shortcut status=updated shortcut_id={} target_id={} duplicates={}",
            primary.id,
            target_id,
            existing.len()
        );

        self.delete_losers(&existing);
        Ok(primary.id)
    }

    /// Deletes one of the viewer's shortcuts. The target is never touched.
    ///
    /// Deleting a shortcut that no longer exists succeeds.
    pub fn delete_shortcut(&self, shortcut_id: &str) -> Result<(), ShortcutServiceError> {
        let Some(shortcut) = self.store.get_shortcut(shortcut_id)? else {
            return Ok(());
        };
        self.ensure_owner(&shortcut)?;
        self.store.delete(Collection::Shortcuts, shortcut_id)?;
        info!(
            "event=shortcut_delete module=shortcut status=ok shortcut_id={}",
            shortcut_id
        );
        Ok(())
    }

    /// Overlays presentation overrides onto a shortcut; absent fields keep
    /// their stored value.
    pub fn update_presentation(
        &self,
        shortcut_id: &str,
        overrides: &ShortcutOverrides,
    ) -> Result<(), ShortcutServiceError> {
        let shortcut = self.require_owned(shortcut_id)?;
        if overrides.is_empty() {
            return Ok(());
        }
        let merged = shortcut.overrides.overlaid_with(overrides);
        self.store
            .write(Collection::Shortcuts, shortcut_id, to_fields(&merged)?)?;
        Ok(())
    }

    pub fn set_hidden(&self, shortcut_id: &str, hidden: bool) -> Result<(), ShortcutServiceError> {
        let shortcut = self.require_owned(shortcut_id)?;
        if shortcut.hidden_in_manual == hidden {
            return Ok(());
        }
        let mut fields = Fields::new();
        fields.insert("hiddenInManual".to_string(), Value::Bool(hidden));
        self.store.write(Collection::Shortcuts, shortcut_id, fields)?;
        Ok(())
    }

    /// Deletes every duplicate shortcut of the viewer, keeping the earliest
    /// per target. Returns how many duplicates were removed.
    pub fn consolidate_duplicates(&self) -> Result<usize, ShortcutServiceError> {
        let mut groups: BTreeMap<(ItemKind, String), Vec<Shortcut>> = BTreeMap::new();
        for shortcut in self.owned_shortcuts()? {
            groups
                .entry((shortcut.target_type, shortcut.target_id.clone()))
                .or_default()
                .push(shortcut);
        }

        let mut removed = 0usize;
        for (_, mut group) in groups {
            if group.len() < 2 {
                continue;
            }
            sort_by_primary_key(&mut group);
            removed += self.delete_losers(&group[1..]);
        }
        Ok(removed)
    }

    /// Viewer-owned shortcuts ordered by primary key.
    pub fn owned_shortcuts(&self) -> Result<Vec<Shortcut>, ShortcutServiceError> {
        let mut shortcuts: Vec<Shortcut> = self.store.query_as(
            Collection::Shortcuts,
            &Filter::field_eq("ownerId", self.viewer.user_id.as_str()),
        )?;
        sort_by_primary_key(&mut shortcuts);
        Ok(shortcuts)
    }

    fn shortcuts_to(
        &self,
        target_type: ItemKind,
        target_id: &str,
    ) -> Result<Vec<Shortcut>, ShortcutServiceError> {
        Ok(self
            .owned_shortcuts()?
            .into_iter()
            .filter(|shortcut| shortcut.target_type == target_type && shortcut.target_id == target_id)
            .collect())
    }

    fn delete_losers(&self, losers: &[Shortcut]) -> usize {
        let mut removed = 0usize;
        for loser in losers {
            match self.store.delete(Collection::Shortcuts, &loser.id) {
                Ok(()) => removed += 1,
                Err(err) => warn!(
                    "event=shortcut_dedup module=shortcut status=error shortcut_id={} error={}",
                    loser.id, err
                ),
            }
        }
        removed
    }

    fn ensure_parent_writable(&self, parent_id: &str) -> Result<(), ShortcutServiceError> {
        let parent = self
            .store
            .get_folder(parent_id)?
            .ok_or_else(|| ShortcutServiceError::ParentNotFound(parent_id.to_string()))?;
        if !can_edit(&parent, &self.viewer.user_id) {
            warn!(
                "event=shortcut_create module=shortcut status=rejected reason=permission parent_id={}",
                parent_id
            );
            return Err(ShortcutServiceError::PermissionDenied(parent_id.to_string()));
        }
        Ok(())
    }

    fn require_owned(&self, shortcut_id: &str) -> Result<Shortcut, ShortcutServiceError> {
        let shortcut = self
            .store
            .get_shortcut(shortcut_id)?
            .ok_or_else(|| ShortcutServiceError::NotFound(shortcut_id.to_string()))?;
        self.ensure_owner(&shortcut)?;
        Ok(shortcut)
    }

    fn ensure_owner(&self, shortcut: &Shortcut) -> Result<(), ShortcutServiceError> {
        if shortcut.owner_id != self.viewer.user_id {
            warn!(
                "event=shortcut_write module=shortcut status=rejected reason=permission shortcut_id={}",
                shortcut.id
            );
            return Err(ShortcutServiceError::PermissionDenied(shortcut.id.clone()));
        }
        Ok(())
    }
}

fn sort_by_primary_key(shortcuts: &mut [Shortcut]) {
    shortcuts.sort_by(|left, right| left.primary_key().cmp(&right.primary_key()));
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
