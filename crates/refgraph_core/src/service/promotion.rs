//! Ownership promotion.
//!
//! # Responsibility
//! - Turn a shortcut into direct ownership once its target is owned by the
//!   shortcut holder.
//!
//! # Invariants
//! - One promotion per shortcut at a time, guarded by the in-flight set.
//!   The claim is dropped once the attempt ends, whatever its result.
//! - A shortcut already gone from the store is never promoted twice.
//! - Failures are logged and never propagate; the next snapshot retries.

use crate::graph::{would_create_cycle, StoreFolders};
use crate::model::item::{ItemKind, TargetItem};
use crate::model::shortcut::{Shortcut, ShortcutId};
use crate::store::{Collection, ContentStore, ContentStoreExt, Fields, StoreResult};
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Result of offering one target snapshot to the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// Target adopted the shortcut's location and overrides; the shortcut
    /// was deleted.
    Promoted {
        shortcut_id: ShortcutId,
        /// `false` when the folder location write was skipped to avoid a cycle.
        location_applied: bool,
    },
    /// Target is not owned by the shortcut holder, or the shortcut is
    /// already gone.
    NotApplicable,
    /// Another promotion of this shortcut is running.
    InFlight,
    Failed(String),
}

/// Watches target snapshots and promotes shortcuts whose target changed owner.
pub struct PromotionWatcher {
    in_flight: Mutex<HashSet<ShortcutId>>,
    max_ancestry_depth: usize,
}

impl PromotionWatcher {
    pub fn new(max_ancestry_depth: usize) -> Self {
        Self {
            in_flight: Mutex::new(HashSet::new()),
            max_ancestry_depth,
        }
    }

    /// Offers one target snapshot for `shortcut`.
    pub fn observe<S: ContentStore + ?Sized>(
        &self,
        store: &S,
        shortcut: &Shortcut,
        target: &TargetItem,
    ) -> PromotionOutcome {
        if target.owner_id() != shortcut.owner_id
            || target.id() != shortcut.target_id
            || target.kind() != shortcut.target_type
        {
            return PromotionOutcome::NotApplicable;
        }

        if !self.claim(&shortcut.id) {
            return PromotionOutcome::InFlight;
        }

        let result = self.promote(store, shortcut, target);
        self.release(&shortcut.id);
        match result {
            Ok(None) => {
                debug!(
                    "event=shortcut_promote module=promotion status=skip reason=shortcut_gone shortcut_id={}",
                    shortcut.id
                );
                PromotionOutcome::NotApplicable
            }
            Ok(Some(location_applied)) => {
                info!(
                    "event=shortcut_promote module=promotion status=ok shortcut_id={} target_id={} location_applied={}",
                    shortcut.id, shortcut.target_id, location_applied
                );
                PromotionOutcome::Promoted {
                    shortcut_id: shortcut.id.clone(),
                    location_applied,
                }
            }
            Err(err) => {
                warn!(
                    "event=shortcut_promote module=promotion status=error shortcut_id={} target_id={} error={}",
                    shortcut.id, shortcut.target_id, err
                );
                PromotionOutcome::Failed(err.to_string())
            }
        }
    }

    fn promote<S: ContentStore + ?Sized>(
        &self,
        store: &S,
        shortcut: &Shortcut,
        target: &TargetItem,
    ) -> StoreResult<Option<bool>> {
        if store.get_shortcut(&shortcut.id)?.is_none() {
            return Ok(None);
        }
        let location = shortcut.parent_id.clone().map_or(Value::Null, Value::String);
        let mut fields = Fields::new();
        let mut location_applied = true;
        match target.kind() {
            ItemKind::Subject => {
                fields.insert(target.location_field().to_string(), location);
            }
            ItemKind::Folder => {
                if would_create_cycle(
                    target.id(),
                    shortcut.parent_id.as_deref(),
                    &StoreFolders::new(store),
                    self.max_ancestry_depth,
                ) {
                    warn!(
                        "event=shortcut_promote module=promotion status=skip reason=cycle shortcut_id={} target_id={}",
                        shortcut.id, shortcut.target_id
                    );
                    location_applied = false;
                } else {
                    fields.insert(target.location_field().to_string(), location);
                }
            }
        }

        let overrides = &shortcut.overrides;
        if let Some(name) = &overrides.shortcut_name {
            fields.insert("name".to_string(), Value::String(name.clone()));
        }
        if target.kind() == ItemKind::Subject {
            if let Some(course) = &overrides.shortcut_course {
                fields.insert("course".to_string(), Value::String(course.clone()));
            }
        }
        if let Some(tags) = &overrides.shortcut_tags {
            fields.insert(
                "tags".to_string(),
                Value::Array(tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(color) = &overrides.shortcut_color {
            fields.insert("color".to_string(), Value::String(color.clone()));
        }
        if let Some(icon) = &overrides.shortcut_icon {
            fields.insert("icon".to_string(), Value::String(icon.clone()));
        }
        if let Some(card_style) = &overrides.shortcut_card_style {
            fields.insert("cardStyle".to_string(), Value::String(card_style.clone()));
        }

        if !fields.is_empty() {
            store.write(Collection::for_kind(target.kind()), target.id(), fields)?;
        }
        store.delete(Collection::Shortcuts, &shortcut.id)?;
        Ok(Some(location_applied))
    }

    fn claim(&self, shortcut_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(shortcut_id.to_string())
    }

    fn release(&self, shortcut_id: &str) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(shortcut_id);
    }
}
