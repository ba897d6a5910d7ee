//! Folder and subject records.
//!
//! # Responsibility
//! - Define the owned content nodes of the hierarchy.
//! - Carry the sharing and appearance fields evaluated by permission and
//!   projection code.
//!
//! # Invariants
//! - A folder's parent chain must be finite and acyclic.
//! - A subject is always a leaf; its location is `folder_id`.
//! - `is_shared` is the source of truth for "this node grants visibility to
//!   others"; share lists may be non-empty on an unshared node (stale data).

use serde::{Deserialize, Serialize};

/// Opaque folder identifier.
pub type FolderId = String;
/// Opaque subject identifier.
pub type SubjectId = String;
/// Opaque user identifier.
pub type UserId = String;
/// Opaque tenant identifier.
pub type InstitutionId = String;

/// Kind of content node. Also the `targetType` of a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Subject,
    Folder,
}

impl ItemKind {
    /// Stable string used in stored documents.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Folder => "folder",
        }
    }

    /// Parses stored `targetType` values.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "subject" => Some(Self::Subject),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }
}

/// Role granted by one share entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRole {
    Editor,
    Viewer,
}

/// One explicit share grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareEntry {
    /// Resolved user id; `None` while an email invite is still pending.
    pub uid: Option<UserId>,
    pub email: String,
    pub role: ShareRole,
    /// Epoch milliseconds.
    #[serde(default)]
    pub shared_at: i64,
}

impl ShareEntry {
    /// Returns whether this entry grants something to `user_id`.
    pub fn is_for(&self, user_id: &str) -> bool {
        self.uid.as_deref() == Some(user_id)
    }
}

/// Sharing fields common to folders and subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sharing {
    pub is_shared: bool,
    pub shared_with_uids: Vec<UserId>,
    pub shared_with: Vec<ShareEntry>,
    pub editor_uids: Vec<UserId>,
    pub viewer_uids: Vec<UserId>,
}

impl Sharing {
    /// Returns every user id this record grants access to, sorted and unique.
    pub fn uid_set(&self) -> Vec<UserId> {
        let mut uids: Vec<UserId> = self
            .shared_with_uids
            .iter()
            .chain(self.editor_uids.iter())
            .chain(self.viewer_uids.iter())
            .cloned()
            .chain(self.shared_with.iter().filter_map(|entry| entry.uid.clone()))
            .collect();
        uids.sort();
        uids.dedup();
        uids
    }

    /// Returns the union of two sharing records with `is_shared` forced on.
    ///
    /// Entries from `self` win when both sides carry the same uid/email.
    pub fn union(&self, other: &Sharing) -> Sharing {
        let mut merged = self.clone();
        merged.is_shared = true;
        push_unique(&mut merged.shared_with_uids, &other.shared_with_uids);
        push_unique(&mut merged.editor_uids, &other.editor_uids);
        push_unique(&mut merged.viewer_uids, &other.viewer_uids);
        for entry in &other.shared_with {
            let exists = merged.shared_with.iter().any(|current| {
                (current.uid.is_some() && current.uid == entry.uid) || current.email == entry.email
            });
            if !exists {
                merged.shared_with.push(entry.clone());
            }
        }
        merged
    }

    /// Returns an unshared record with every grant removed.
    pub fn cleared() -> Sharing {
        Sharing::default()
    }
}

fn push_unique(target: &mut Vec<UserId>, values: &[UserId]) {
    for value in values {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// Presentation fields shared by folders and subjects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Appearance {
    pub color: Option<String>,
    pub icon: Option<String>,
    pub card_style: Option<String>,
}

/// Folder node of the hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Folder {
    pub id: FolderId,
    pub owner_id: UserId,
    /// `None` means root-level folder.
    pub parent_id: Option<FolderId>,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub appearance: Appearance,
    #[serde(flatten)]
    pub sharing: Sharing,
    /// Legacy direct membership list, superseded by `Subject::folder_id`.
    pub subject_ids: Vec<SubjectId>,
    pub institution_id: Option<InstitutionId>,
}

impl Folder {
    /// Creates an unshared folder owned by `owner_id`.
    pub fn new(
        id: impl Into<FolderId>,
        owner_id: impl Into<UserId>,
        parent_id: Option<FolderId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            parent_id,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Subject leaf node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subject {
    pub id: SubjectId,
    pub owner_id: UserId,
    /// `None` means the subject sits at root level.
    pub folder_id: Option<FolderId>,
    pub name: String,
    pub course: Option<String>,
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub appearance: Appearance,
    #[serde(flatten)]
    pub sharing: Sharing,
    pub institution_id: Option<InstitutionId>,
}

impl Subject {
    /// Creates an unshared subject owned by `owner_id`.
    pub fn new(
        id: impl Into<SubjectId>,
        owner_id: impl Into<UserId>,
        folder_id: Option<FolderId>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            folder_id,
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Either kind of content node, as seen through a shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TargetItem {
    Subject(Subject),
    Folder(Folder),
}

impl TargetItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Subject(_) => ItemKind::Subject,
            Self::Folder(_) => ItemKind::Folder,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Subject(subject) => &subject.id,
            Self::Folder(folder) => &folder.id,
        }
    }

    pub fn owner_id(&self) -> &str {
        match self {
            Self::Subject(subject) => &subject.owner_id,
            Self::Folder(folder) => &folder.owner_id,
        }
    }

    /// Structural location: `folder_id` for subjects, `parent_id` for folders.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::Subject(subject) => subject.folder_id.as_deref(),
            Self::Folder(folder) => folder.parent_id.as_deref(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Subject(subject) => &subject.name,
            Self::Folder(folder) => &folder.name,
        }
    }

    /// Only subjects carry a course label.
    pub fn course(&self) -> Option<&str> {
        match self {
            Self::Subject(subject) => subject.course.as_deref(),
            Self::Folder(_) => None,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            Self::Subject(subject) => &subject.tags,
            Self::Folder(folder) => &folder.tags,
        }
    }

    pub fn appearance(&self) -> &Appearance {
        match self {
            Self::Subject(subject) => &subject.appearance,
            Self::Folder(folder) => &folder.appearance,
        }
    }

    pub fn sharing(&self) -> &Sharing {
        match self {
            Self::Subject(subject) => &subject.sharing,
            Self::Folder(folder) => &folder.sharing,
        }
    }

    pub fn institution_id(&self) -> Option<&str> {
        match self {
            Self::Subject(subject) => subject.institution_id.as_deref(),
            Self::Folder(folder) => folder.institution_id.as_deref(),
        }
    }

    /// Field name holding this node's location in stored documents.
    pub fn location_field(&self) -> &'static str {
        location_field(self.kind())
    }
}

/// Authenticated identity the engine evaluates permissions for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Viewer {
    pub user_id: UserId,
    pub institution_id: Option<InstitutionId>,
}

impl Viewer {
    pub fn new(user_id: impl Into<UserId>, institution_id: Option<InstitutionId>) -> Self {
        Self {
            user_id: user_id.into(),
            institution_id,
        }
    }
}

/// Field name holding a node's location for the given kind.
pub fn location_field(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Subject => "folderId",
        ItemKind::Folder => "parentId",
    }
}
