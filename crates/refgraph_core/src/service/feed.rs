//! Live shortcut resolution stream.
//!
//! # Responsibility
//! - Keep one subscription per shortcut target (plus its holding folder).
//! - Turn subscription pushes into `ResolverEvent`s for the shortcut table.
//! - Offer target snapshots to the promotion watcher.
//!
//! # Invariants
//! - Only the newest push of each subscription is applied.
//! - A list is emitted only when it differs from the last emitted list and
//!   no shortcut is still unresolved.
//! - A target subscription that failed is reopened on the next poll.

use crate::config::EngineConfig;
use crate::graph::StoreFolders;
use crate::model::item::{FolderId, ItemKind, Viewer};
use crate::model::shortcut::{ResolvedShortcut, Shortcut, ShortcutId};
use crate::resolver::{ResolverEvent, ShortcutTable, TargetSnapshot};
use crate::service::promotion::{PromotionOutcome, PromotionWatcher};
use crate::store::{
    decode_target, Collection, ContentStore, DocumentSet, Filter, StoreResult, Subscription,
    SubscriptionEvent,
};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

struct TargetWatch {
    target_type: ItemKind,
    target_id: String,
    subscription: Option<Subscription>,
    parent: Option<(FolderId, Subscription)>,
}

impl TargetWatch {
    fn watches(&self, shortcut: &Shortcut) -> bool {
        self.target_type == shortcut.target_type && self.target_id == shortcut.target_id
    }
}

/// Pull-based stream of resolved shortcuts for one viewer.
pub struct ShortcutFeed<S: ContentStore> {
    store: S,
    viewer: Viewer,
    config: EngineConfig,
    watcher: Arc<PromotionWatcher>,
    shortcuts: Subscription,
    watches: BTreeMap<ShortcutId, TargetWatch>,
    table: ShortcutTable,
    last_emitted: Option<Vec<ResolvedShortcut>>,
}

impl<S: ContentStore> ShortcutFeed<S> {
    /// Subscribes to the viewer's shortcuts. Target subscriptions open on
    /// the first `poll`.
    pub fn open(
        store: S,
        viewer: Viewer,
        config: EngineConfig,
        watcher: Arc<PromotionWatcher>,
    ) -> StoreResult<Self> {
        let shortcuts = store.subscribe(
            Collection::Shortcuts,
            Filter::field_eq("ownerId", viewer.user_id.as_str()),
        )?;
        Ok(Self {
            store,
            viewer,
            config,
            watcher,
            shortcuts,
            watches: BTreeMap::new(),
            table: ShortcutTable::new(),
            last_emitted: None,
        })
    }

    /// Drains pending pushes and returns a fresh projection list if one is
    /// ready.
    pub fn poll(&mut self) -> Option<Vec<ResolvedShortcut>> {
        self.drain_shortcuts();
        self.reconcile_watches();
        self.drain_targets();

        if !self.table.is_settled() {
            return None;
        }
        let projections = self.table.projections();
        if self.last_emitted.as_ref() == Some(&projections) {
            return None;
        }
        self.last_emitted = Some(projections.clone());
        Some(projections)
    }

    /// Last list returned by `poll`.
    pub fn current(&self) -> Option<&[ResolvedShortcut]> {
        self.last_emitted.as_deref()
    }

    pub fn table(&self) -> &ShortcutTable {
        &self.table
    }

    fn apply(&mut self, event: ResolverEvent) -> bool {
        let folders = StoreFolders::new(&self.store);
        self.table.apply(event, &self.viewer, &folders)
    }

    fn drain_shortcuts(&mut self) {
        match self.shortcuts.latest() {
            Some(SubscriptionEvent::Snapshot(set)) => self.apply_shortcut_set(set),
            Some(SubscriptionEvent::Failed(message)) => warn!(
                "event=shortcut_feed module=feed status=error source=shortcuts error={}",
                message
            ),
            None => {}
        }
        if self.shortcuts.is_closed() {
            debug!("event=shortcut_feed module=feed status=closed source=shortcuts");
        }
    }

    fn apply_shortcut_set(&mut self, set: DocumentSet) {
        let mut present = BTreeSet::new();
        for document in &set.documents {
            match document.decode::<Shortcut>() {
                Ok(shortcut) => {
                    present.insert(shortcut.id.clone());
                    self.apply(ResolverEvent::ShortcutUpserted(shortcut));
                }
                Err(err) => warn!(
                    "event=shortcut_feed module=feed status=skip reason=decode shortcut_id={} error={}",
                    document.id, err
                ),
            }
        }

        let removed: Vec<ShortcutId> = self
            .table
            .shortcuts()
            .filter(|shortcut| !present.contains(&shortcut.id))
            .map(|shortcut| shortcut.id.clone())
            .collect();
        for shortcut_id in removed {
            self.apply(ResolverEvent::ShortcutRemoved(shortcut_id));
        }
    }

    fn reconcile_watches(&mut self) {
        let table = &self.table;
        self.watches.retain(|shortcut_id, watch| {
            table
                .shortcut(shortcut_id)
                .is_some_and(|shortcut| watch.watches(shortcut))
        });

        let shortcuts: Vec<Shortcut> = self.table.shortcuts().cloned().collect();
        for shortcut in shortcuts {
            let needs_open = self
                .watches
                .get(&shortcut.id)
                .map_or(true, |watch| watch.subscription.is_none());
            if !needs_open {
                continue;
            }
            let opened = self.store.subscribe(
                Collection::for_kind(shortcut.target_type),
                Filter::id(shortcut.target_id.as_str()),
            );
            let subscription = match opened {
                Ok(subscription) => Some(subscription),
                Err(err) => {
                    warn!(
                        "event=shortcut_feed module=feed status=error source=target shortcut_id={} error={}",
                        shortcut.id, err
                    );
                    self.apply(ResolverEvent::TargetFailed {
                        shortcut_id: shortcut.id.clone(),
                        message: err.to_string(),
                    });
                    None
                }
            };
            let watch = self.watches.entry(shortcut.id.clone()).or_insert(TargetWatch {
                target_type: shortcut.target_type,
                target_id: shortcut.target_id.clone(),
                subscription: None,
                parent: None,
            });
            watch.subscription = subscription;
        }
    }

    fn drain_targets(&mut self) {
        let shortcut_ids: Vec<ShortcutId> = self.watches.keys().cloned().collect();
        for shortcut_id in shortcut_ids {
            let Some(event) = self.next_target_event(&shortcut_id) else {
                self.drain_parent(&shortcut_id);
                continue;
            };
            match event {
                SubscriptionEvent::Snapshot(set) => {
                    let Some(shortcut) = self.table.shortcut(&shortcut_id).cloned() else {
                        continue;
                    };
                    let snapshot = match set.documents.first() {
                        None => TargetSnapshot::Missing,
                        Some(document) => match decode_target(shortcut.target_type, document) {
                            Ok(target) => TargetSnapshot::Present(target),
                            Err(err) => TargetSnapshot::Failed(err.to_string()),
                        },
                    };
                    if self.try_promote(&shortcut, &snapshot) {
                        continue;
                    }
                    self.watch_parent(&shortcut_id, &snapshot);
                    self.apply(ResolverEvent::TargetSnapshot {
                        shortcut_id: shortcut_id.clone(),
                        snapshot,
                    });
                }
                SubscriptionEvent::Failed(message) => {
                    self.apply(ResolverEvent::TargetFailed {
                        shortcut_id: shortcut_id.clone(),
                        message,
                    });
                }
            }
            self.drain_parent(&shortcut_id);
        }
    }

    fn next_target_event(&mut self, shortcut_id: &str) -> Option<SubscriptionEvent> {
        let watch = self.watches.get_mut(shortcut_id)?;
        let subscription = watch.subscription.as_mut()?;
        let event = subscription.latest();
        if subscription.is_closed() {
            watch.subscription = None;
        }
        event
    }

    /// Returns `true` when the shortcut was promoted and dropped.
    fn try_promote(&mut self, shortcut: &Shortcut, snapshot: &TargetSnapshot) -> bool {
        if !self.config.promote_on_snapshot {
            return false;
        }
        let Some(target) = snapshot.target() else {
            return false;
        };
        match self.watcher.observe(&self.store, shortcut, target) {
            PromotionOutcome::Promoted { .. } => {
                self.watches.remove(&shortcut.id);
                self.apply(ResolverEvent::ShortcutRemoved(shortcut.id.clone()));
                true
            }
            _ => false,
        }
    }

    fn watch_parent(&mut self, shortcut_id: &str, snapshot: &TargetSnapshot) {
        let parent_id = snapshot
            .target()
            .and_then(|target| target.parent_id())
            .map(str::to_string);
        let Some(watch) = self.watches.get_mut(shortcut_id) else {
            return;
        };
        let current = watch.parent.as_ref().map(|(folder_id, _)| folder_id.clone());
        if current == parent_id {
            return;
        }
        watch.parent = match parent_id {
            Some(folder_id) => match self
                .store
                .subscribe(Collection::Folders, Filter::id(folder_id.as_str()))
            {
                Ok(mut subscription) => {
                    // Initial push describes the folder the snapshot already saw.
                    let _ = subscription.latest();
                    Some((folder_id, subscription))
                }
                Err(err) => {
                    debug!(
                        "event=shortcut_feed module=feed status=skip source=parent shortcut_id={} error={}",
                        shortcut_id, err
                    );
                    None
                }
            },
            None => None,
        };
    }

    fn drain_parent(&mut self, shortcut_id: &str) {
        let changed = self
            .watches
            .get_mut(shortcut_id)
            .and_then(|watch| watch.parent.as_mut())
            .and_then(|(_, subscription)| subscription.latest())
            .is_some();
        if changed {
            self.apply(ResolverEvent::TargetParentChanged {
                shortcut_id: shortcut_id.to_string(),
            });
        }
    }
}
