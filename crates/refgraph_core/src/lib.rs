//! Hierarchical reference graph engine.
//!
//! Folders and subjects form a per-owner tree; shortcuts are non-owning
//! references that place another owner's content into that tree. This crate
//! keeps the tree acyclic, resolves shortcuts against live targets, and
//! decides how sharing changes when items move.

pub mod config;
pub mod db;
pub mod engine;
pub mod graph;
pub mod logging;
pub mod merge;
pub mod model;
pub mod permission;
pub mod resolver;
pub mod service;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use engine::ReferenceGraphEngine;
pub use graph::{ancestry_in, is_descendant, would_create_cycle, Ancestry, FolderIndex, ParentLookup};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use merge::{group_by_parent, merge_children, TreeItem};
pub use model::item::{
    Appearance, Folder, FolderId, InstitutionId, ItemKind, ShareEntry, ShareRole, Sharing,
    Subject, SubjectId, TargetItem, UserId, Viewer,
};
pub use model::shortcut::{
    MovedTo, OrphanReason, ProjectedView, ResolvedShortcut, Shortcut, ShortcutId,
    ShortcutOverrides, FALLBACK_NAME,
};
pub use permission::{
    can_delete, can_edit, can_view, is_owner, is_shortcut_item, permission_level,
    shortcut_actions, PermissionLevel, ShortcutActions,
};
pub use resolver::{
    resolve_all, resolve_shortcut, ResolverEvent, ShortcutState, ShortcutTable, TargetSnapshot,
};
pub use service::feed::ShortcutFeed;
pub use service::move_service::{
    AppliedMove, ConflictChoice, ConflictKind, Destination, DraggedRef, MoveConflict, MoveError,
    MoveOutcome, MoveRejection, OwnerMoveRequest, SharingChange, TargetRef,
};
pub use service::promotion::{PromotionOutcome, PromotionWatcher};
pub use service::shortcut_service::{CreateShortcutRequest, ShortcutServiceError};
pub use store::{
    Collection, ContentStore, ContentStoreExt, Document, DocumentSet, Fields, Filter, MemoryStore,
    SqliteStore, StoreError, StoreResult, Subscription, SubscriptionEvent,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
