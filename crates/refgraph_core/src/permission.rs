//! Permission predicates over ownership and sharing fields.
//!
//! # Responsibility
//! - Resolve a user's permission level on one item.
//! - Decide which shortcut-related actions a user may take.
//!
//! # Invariants
//! - Pure: no I/O, no side effects, deterministic for equal inputs.
//! - Resolution order is owner, then editor grants, then viewer grants.

use crate::model::item::{Folder, Sharing, ShareRole, Subject, TargetItem};
use crate::model::shortcut::{ResolvedShortcut, Shortcut};
use crate::store::Document;

/// Effective permission level of one user on one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
    None,
    Viewer,
    Editor,
    Owner,
}

impl PermissionLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Owner => "owner",
        }
    }
}

/// Anything carrying an owner and sharing fields.
pub trait Shareable {
    fn owner_id(&self) -> &str;
    fn sharing(&self) -> &Sharing;
}

impl Shareable for Folder {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn sharing(&self) -> &Sharing {
        &self.sharing
    }
}

impl Shareable for Subject {
    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn sharing(&self) -> &Sharing {
        &self.sharing
    }
}

impl Shareable for TargetItem {
    fn owner_id(&self) -> &str {
        TargetItem::owner_id(self)
    }

    fn sharing(&self) -> &Sharing {
        TargetItem::sharing(self)
    }
}

/// Resolves `user_id`'s permission level on `item`.
pub fn permission_level<T: Shareable + ?Sized>(item: &T, user_id: &str) -> PermissionLevel {
    if user_id.is_empty() {
        return PermissionLevel::None;
    }
    if item.owner_id() == user_id {
        return PermissionLevel::Owner;
    }

    let sharing = item.sharing();
    let is_editor = sharing.editor_uids.iter().any(|uid| uid == user_id)
        || sharing
            .shared_with
            .iter()
            .any(|entry| entry.is_for(user_id) && entry.role == ShareRole::Editor);
    if is_editor {
        return PermissionLevel::Editor;
    }

    let is_viewer = sharing.viewer_uids.iter().any(|uid| uid == user_id)
        || sharing.shared_with.iter().any(|entry| entry.is_for(user_id))
        || sharing.shared_with_uids.iter().any(|uid| uid == user_id);
    if is_viewer {
        return PermissionLevel::Viewer;
    }

    PermissionLevel::None
}

pub fn can_edit<T: Shareable + ?Sized>(item: &T, user_id: &str) -> bool {
    matches!(
        permission_level(item, user_id),
        PermissionLevel::Owner | PermissionLevel::Editor
    )
}

pub fn can_view<T: Shareable + ?Sized>(item: &T, user_id: &str) -> bool {
    permission_level(item, user_id) != PermissionLevel::None
}

pub fn can_delete<T: Shareable + ?Sized>(item: &T, user_id: &str) -> bool {
    can_edit(item, user_id)
}

pub fn is_owner<T: Shareable + ?Sized>(item: &T, user_id: &str) -> bool {
    permission_level(item, user_id) == PermissionLevel::Owner
}

/// Returns whether a raw document looks like a shortcut or a resolved
/// shortcut projection.
pub fn is_shortcut_item(document: &Document) -> bool {
    let has_target = document
        .fields
        .get("targetId")
        .is_some_and(|value| value.as_str().is_some_and(|id| !id.is_empty()))
        && document
            .fields
            .get("targetType")
            .is_some_and(|value| value.is_string());
    let flagged = document
        .fields
        .get("isShortcut")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    let has_shortcut_id = document
        .fields
        .get("shortcutId")
        .is_some_and(|value| !value.is_null());
    has_target || flagged || has_shortcut_id
}

/// Capabilities a user has on one shortcut and the item behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortcutActions {
    /// Rename/recolor/hide the shortcut itself.
    pub edit_presentation: bool,
    /// Remove the shortcut record (never touches the target).
    pub delete_shortcut: bool,
    /// Delete the underlying target.
    pub delete_target: bool,
    /// Revoke the target's sharing.
    pub unshare_target: bool,
}

/// Computes shortcut-related capabilities for `user_id`.
///
/// `target` is the live target snapshot when one is readable. Orphaned
/// shortcuts never expose target actions.
pub fn shortcut_actions(
    shortcut: &Shortcut,
    resolved: Option<&ResolvedShortcut>,
    target: Option<&TargetItem>,
    user_id: &str,
) -> ShortcutActions {
    let holds_shortcut = !user_id.is_empty() && shortcut.owner_id == user_id;
    let orphaned = resolved.map_or(true, |projection| projection.is_orphan);

    let (delete_target, unshare_target) = match target {
        Some(target) if !orphaned => (can_delete(target, user_id), is_owner(target, user_id)),
        _ => (false, false),
    };

    ShortcutActions {
        edit_presentation: holds_shortcut,
        delete_shortcut: holds_shortcut,
        delete_target,
        unshare_target,
    }
}
