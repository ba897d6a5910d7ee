//! Shortcut records and their resolved projections.
//!
//! # Responsibility
//! - Define the weak, non-owning reference from one user's tree to another
//!   owner's folder or subject.
//! - Define the derived `ResolvedShortcut` read model handed to callers.
//!
//! # Invariants
//! - A shortcut never implies ownership of `target_id`.
//! - At most one shortcut exists per `(owner_id, target_id, target_type)`;
//!   the earliest record (`created_at`, then `id`) is the primary.
//! - `ResolvedShortcut` is never persisted.

use crate::model::item::{FolderId, InstitutionId, ItemKind, TargetItem, UserId};
use serde::{Deserialize, Serialize};

/// Opaque shortcut identifier.
pub type ShortcutId = String;

/// Name shown for an unreachable target without a stored override.
pub const FALLBACK_NAME: &str = "Unavailable item";

/// Presentation overrides stored on a shortcut.
///
/// Each field, when present, wins over the target's live value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShortcutOverrides {
    pub shortcut_name: Option<String>,
    pub shortcut_course: Option<String>,
    pub shortcut_tags: Option<Vec<String>>,
    pub shortcut_color: Option<String>,
    pub shortcut_icon: Option<String>,
    pub shortcut_card_style: Option<String>,
}

impl ShortcutOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Returns `self` with every field present in `newer` replaced.
    pub fn overlaid_with(&self, newer: &ShortcutOverrides) -> ShortcutOverrides {
        ShortcutOverrides {
            shortcut_name: newer.shortcut_name.clone().or_else(|| self.shortcut_name.clone()),
            shortcut_course: newer
                .shortcut_course
                .clone()
                .or_else(|| self.shortcut_course.clone()),
            shortcut_tags: newer.shortcut_tags.clone().or_else(|| self.shortcut_tags.clone()),
            shortcut_color: newer
                .shortcut_color
                .clone()
                .or_else(|| self.shortcut_color.clone()),
            shortcut_icon: newer.shortcut_icon.clone().or_else(|| self.shortcut_icon.clone()),
            shortcut_card_style: newer
                .shortcut_card_style
                .clone()
                .or_else(|| self.shortcut_card_style.clone()),
        }
    }
}

/// Persisted shortcut record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortcut {
    #[serde(default)]
    pub id: ShortcutId,
    pub owner_id: UserId,
    /// Location in the owner's tree. `None` means root level.
    #[serde(default)]
    pub parent_id: Option<FolderId>,
    pub target_id: String,
    pub target_type: ItemKind,
    #[serde(default)]
    pub institution_id: Option<InstitutionId>,
    #[serde(default)]
    pub hidden_in_manual: bool,
    #[serde(flatten)]
    pub overrides: ShortcutOverrides,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created_at: i64,
}

impl Shortcut {
    /// Ordering key used to pick the primary among duplicates.
    pub fn primary_key(&self) -> (i64, &str) {
        (self.created_at, self.id.as_str())
    }

    /// Returns whether both records point at the same target.
    pub fn same_target(&self, other: &Shortcut) -> bool {
        self.target_id == other.target_id && self.target_type == other.target_type
    }
}

/// Why a shortcut could not be projected onto its live target.
///
/// A deleted target carries no reason at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrphanReason {
    TenantMismatch,
    AccessRevoked,
    MovedToSharedFolder,
    SnapshotError,
}

impl OrphanReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TenantMismatch => "tenant-mismatch",
            Self::AccessRevoked => "access-revoked",
            Self::MovedToSharedFolder => "moved-to-shared-folder",
            Self::SnapshotError => "snapshot-error",
        }
    }
}

/// Where an orphaned target went, when it disappeared into a shared folder.
///
/// Serialized flat onto the projection as `_movedToFolderId` and
/// `_movedToFolderName`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovedTo {
    #[serde(rename = "_movedToFolderId")]
    pub folder_id: FolderId,
    #[serde(rename = "_movedToFolderName")]
    pub folder_name: String,
}

/// Presentation fields of a resolved shortcut.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedView {
    pub name: String,
    pub course: Option<String>,
    pub tags: Vec<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub card_style: Option<String>,
}

impl ProjectedView {
    /// Appearance built only from the shortcut's stored overrides.
    pub fn fallback(overrides: &ShortcutOverrides) -> Self {
        Self {
            name: overrides
                .shortcut_name
                .clone()
                .unwrap_or_else(|| FALLBACK_NAME.to_string()),
            course: overrides.shortcut_course.clone(),
            tags: overrides.shortcut_tags.clone().unwrap_or_default(),
            color: overrides.shortcut_color.clone(),
            icon: overrides.shortcut_icon.clone(),
            card_style: overrides.shortcut_card_style.clone(),
        }
    }

    /// Live target fields overlaid with overrides.
    pub fn overlay(target: &TargetItem, overrides: &ShortcutOverrides) -> Self {
        let appearance = target.appearance();
        Self {
            name: overrides
                .shortcut_name
                .clone()
                .unwrap_or_else(|| target.name().to_string()),
            course: overrides
                .shortcut_course
                .clone()
                .or_else(|| target.course().map(str::to_string)),
            tags: overrides
                .shortcut_tags
                .clone()
                .unwrap_or_else(|| target.tags().to_vec()),
            color: overrides
                .shortcut_color
                .clone()
                .or_else(|| appearance.color.clone()),
            icon: overrides
                .shortcut_icon
                .clone()
                .or_else(|| appearance.icon.clone()),
            card_style: overrides
                .shortcut_card_style
                .clone()
                .or_else(|| appearance.card_style.clone()),
        }
    }
}

/// Shortcut merged with a live snapshot of its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedShortcut {
    /// Always `true`; kept so serialized projections are self-describing.
    pub is_shortcut: bool,
    pub shortcut_id: ShortcutId,
    pub shortcut_owner_id: UserId,
    pub target_id: String,
    pub target_type: ItemKind,
    pub shortcut_parent_id: Option<FolderId>,
    /// Equals `shortcut_parent_id` so tree code treats the shortcut's
    /// location as canonical.
    pub parent_id: Option<FolderId>,
    pub is_orphan: bool,
    #[serde(rename = "_reason")]
    pub reason: Option<OrphanReason>,
    pub view: ProjectedView,
    /// Target owner when the target was readable.
    pub target_owner_id: Option<UserId>,
    /// Target's real structural parent, for diagnostics.
    #[serde(rename = "_sourceParentId")]
    pub source_parent_id: Option<FolderId>,
    #[serde(flatten)]
    pub moved_to: Option<MovedTo>,
    pub hidden_in_manual: bool,
    /// Live target snapshot, present only for healthy projections.
    #[serde(skip)]
    pub target: Option<TargetItem>,
}

impl ResolvedShortcut {
    /// Orphan projection with fallback appearance.
    pub fn orphan(shortcut: &Shortcut, reason: Option<OrphanReason>) -> Self {
        Self {
            is_shortcut: true,
            shortcut_id: shortcut.id.clone(),
            shortcut_owner_id: shortcut.owner_id.clone(),
            target_id: shortcut.target_id.clone(),
            target_type: shortcut.target_type,
            shortcut_parent_id: shortcut.parent_id.clone(),
            parent_id: shortcut.parent_id.clone(),
            is_orphan: true,
            reason,
            view: ProjectedView::fallback(&shortcut.overrides),
            target_owner_id: None,
            source_parent_id: None,
            moved_to: None,
            hidden_in_manual: shortcut.hidden_in_manual,
            target: None,
        }
    }

    /// Healthy projection onto a visible target.
    pub fn healthy(shortcut: &Shortcut, target: &TargetItem) -> Self {
        Self {
            is_shortcut: true,
            shortcut_id: shortcut.id.clone(),
            shortcut_owner_id: shortcut.owner_id.clone(),
            target_id: shortcut.target_id.clone(),
            target_type: shortcut.target_type,
            shortcut_parent_id: shortcut.parent_id.clone(),
            parent_id: shortcut.parent_id.clone(),
            is_orphan: false,
            reason: None,
            view: ProjectedView::overlay(target, &shortcut.overrides),
            target_owner_id: Some(target.owner_id().to_string()),
            source_parent_id: target.parent_id().map(str::to_string),
            moved_to: None,
            hidden_in_manual: shortcut.hidden_in_manual,
            target: Some(target.clone()),
        }
    }
}
