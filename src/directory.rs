//! The conversation directory: every registered view, fed from one change
//! pipeline.

use crate::changes::{ChangeBatch, RejectedChange};
use crate::error::{DirectoryError, Result};
use crate::registry::ViewKind;
use crate::subscriptions::{
    DirectoryEvent, DropReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{Conversation, ConversationId};
use crate::view::{LiveView, Members, ViewDelta};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Directory configuration.
#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    /// Used by [`ViewHandle::subscribe`].
    pub subscription: SubscriptionConfig,

    /// Panic when a view is looked up by an unregistered name.
    /// Default: on in debug builds.
    pub panic_on_unknown_view: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            subscription: SubscriptionConfig::default(),
            panic_on_unknown_view: cfg!(debug_assertions),
        }
    }
}

/// Members of every view at one version.
#[derive(Clone, Debug)]
pub struct DirectorySnapshot {
    version: u64,
    /// Indexed by [`ViewKind::index`].
    views: Vec<Members>,
}

impl DirectorySnapshot {
    fn empty() -> Self {
        Self {
            version: 0,
            views: ViewKind::ALL.iter().map(|_| Members::default()).collect(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn members(&self, kind: ViewKind) -> &Members {
        &self.views[kind.index()]
    }

    pub fn contains(&self, kind: ViewKind, id: ConversationId) -> bool {
        self.members(kind).contains(id)
    }

    /// Views that currently contain `id`, in registry order.
    pub fn views_containing(&self, id: ConversationId) -> Vec<ViewKind> {
        ViewKind::ALL
            .into_iter()
            .filter(|kind| self.contains(*kind, id))
            .collect()
    }
}

impl Default for DirectorySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Outcome of one [`Directory::ingest`] call.
#[derive(Clone, Debug, Default)]
pub struct IngestReport {
    /// Published version after the batch.
    pub version: u64,
    /// Coalesced records applied to the views. A conversation inserted and
    /// deleted within the batch is not counted.
    pub applied: usize,
    pub rejected: Vec<RejectedChange>,
    /// Non-empty deltas only.
    pub deltas: BTreeMap<ViewKind, ViewDelta>,
}

impl IngestReport {
    pub fn delta(&self, kind: ViewKind) -> Option<&ViewDelta> {
        self.deltas.get(&kind)
    }

    /// Whether any view changed.
    pub fn changed_views(&self) -> bool {
        !self.deltas.is_empty()
    }
}

struct Shared {
    config: DirectoryConfig,
    /// Current members of every view, swapped whole after each batch.
    published: RwLock<Arc<DirectorySnapshot>>,
    /// Writer-side views in registry order. Held for the whole of an
    /// ingest, including notification.
    writer: Mutex<Vec<LiveView>>,
    subscriptions: SubscriptionManager,
}

impl Shared {
    fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.published.read().clone()
    }

    fn publish(&self, version: u64, views: &[LiveView]) {
        let snapshot = DirectorySnapshot {
            version,
            views: views.iter().map(LiveView::current_members).collect(),
        };
        *self.published.write() = Arc::new(snapshot);
    }

    fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        // Excludes a concurrent ingest, so the initial snapshot and the
        // first delta line up.
        let _writer = self.writer.lock();

        let followed = config.filter.followed_views();
        let send_initial = config.send_initial_snapshot;
        let handle = self.subscriptions.subscribe(config);

        if send_initial {
            let snapshot = self.snapshot();
            for view in followed {
                let event = DirectoryEvent::ViewSnapshot {
                    view,
                    version: snapshot.version(),
                    members: snapshot.members(view).to_vec(),
                };
                // On overflow the subscriber has already been sent `Dropped`.
                if !self.subscriptions.send_to(handle.id, event) {
                    return handle;
                }
            }
        }

        if self.subscriptions.mark_caught_up(handle.id).is_err() {
            tracing::trace!(subscription = handle.id.0, "subscriber dropped before catching up");
        }
        handle
    }
}

/// Owns the live views and the subscriptions to them.
///
/// One caller (the store's change pipeline) drives [`Directory::ingest`];
/// any number of readers use [`ViewHandle`]s or [`Directory::snapshot`].
pub struct Directory {
    shared: Arc<Shared>,
}

impl Directory {
    pub fn new(config: DirectoryConfig) -> Self {
        let views = ViewKind::ALL.into_iter().map(LiveView::new).collect();
        Self {
            shared: Arc::new(Shared {
                config,
                published: RwLock::new(Arc::new(DirectorySnapshot::empty())),
                writer: Mutex::new(views),
                subscriptions: SubscriptionManager::new(),
            }),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.shared.config
    }

    /// Rebuild every view from a full enumeration of conversations.
    ///
    /// Used on cold start and account switch. Subscribers receive
    /// [`DirectoryEvent::Reloaded`] rather than deltas. Returns the new
    /// version.
    pub fn load<I>(&self, conversations: I) -> u64
    where
        I: IntoIterator<Item = Conversation>,
    {
        let conversations: Vec<Conversation> = conversations.into_iter().collect();
        let mut views = self.shared.writer.lock();

        for view in views.iter_mut() {
            view.rebuild(&conversations);
        }

        let version = self.shared.snapshot().version() + 1;
        self.shared.publish(version, &views);
        self.shared.subscriptions.broadcast_reloaded(version);

        tracing::debug!(version, conversations = conversations.len(), "directory loaded");
        version
    }

    /// Apply one batch of conversation changes to every view.
    ///
    /// Malformed records are skipped and reported. All views are published
    /// together, then subscribers are notified. An empty batch changes
    /// nothing and keeps the version.
    pub fn ingest(&self, batch: ChangeBatch) -> IngestReport {
        let (records, rejected) = batch.coalesce();
        for r in &rejected {
            tracing::warn!(
                position = r.position,
                conversation = %r.id,
                error = %r.error,
                "skipping change record"
            );
        }

        let mut views = self.shared.writer.lock();
        let current = self.shared.snapshot().version();

        if records.is_empty() {
            return IngestReport {
                version: current,
                applied: 0,
                rejected,
                deltas: BTreeMap::new(),
            };
        }

        let deltas: Vec<ViewDelta> = views
            .iter_mut()
            .map(|view| view.apply_coalesced(&records))
            .collect();

        let version = current + 1;
        self.shared.publish(version, &views);

        let subscriptions = &self.shared.subscriptions;
        for (view, delta) in views.iter().zip(&deltas) {
            if !delta.is_empty() {
                subscriptions.broadcast_view_changed(view.kind(), version, delta);
            }
        }
        for record in &records {
            let change = record.change_info();
            if !change.is_empty() {
                subscriptions.broadcast_conversation_changed(version, &change);
            }
        }

        tracing::debug!(
            version,
            applied = records.len(),
            rejected = rejected.len(),
            "ingested change batch"
        );

        IngestReport {
            version,
            applied: records.len(),
            rejected,
            deltas: views
                .iter()
                .map(LiveView::kind)
                .zip(deltas)
                .filter(|(_, delta)| !delta.is_empty())
                .collect(),
        }
    }

    pub fn view(&self, kind: ViewKind) -> ViewHandle {
        ViewHandle {
            shared: Arc::clone(&self.shared),
            target: Target::Registered(kind),
        }
    }

    /// Look up a view by its registry name.
    ///
    /// # Panics
    ///
    /// On an unknown name when `panic_on_unknown_view` is set. Otherwise the
    /// lookup is logged and a detached, permanently empty view is returned.
    pub fn view_named(&self, name: &str) -> ViewHandle {
        match self.try_view_named(name) {
            Ok(handle) => handle,
            Err(err) => {
                if self.shared.config.panic_on_unknown_view {
                    panic!("{err}");
                }
                tracing::error!(view = name, "lookup of unregistered view");
                ViewHandle {
                    shared: Arc::clone(&self.shared),
                    target: Target::Detached(name.to_string()),
                }
            }
        }
    }

    pub fn try_view_named(&self, name: &str) -> Result<ViewHandle> {
        ViewKind::from_name(name)
            .map(|kind| self.view(kind))
            .ok_or_else(|| DirectoryError::UnknownView(name.to_string()))
    }

    /// Every view, in registry order.
    pub fn all_views(&self) -> Vec<ViewHandle> {
        ViewKind::ALL.into_iter().map(|kind| self.view(kind)).collect()
    }

    /// Members of all views at one version.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        self.shared.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.shared.snapshot().version()
    }

    /// Subscribe with an arbitrary filter over views and conversations.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.shared.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.subscriptions.unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.shared.subscriptions.subscription_count()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

#[derive(Clone)]
enum Target {
    Registered(ViewKind),
    Detached(String),
}

/// Reader handle on one view.
///
/// Handles stay valid for the life of the directory's shared state and
/// always read the latest published version.
#[derive(Clone)]
pub struct ViewHandle {
    shared: Arc<Shared>,
    target: Target,
}

impl ViewHandle {
    /// `None` for a detached handle returned for an unknown name.
    pub fn kind(&self) -> Option<ViewKind> {
        match self.target {
            Target::Registered(kind) => Some(kind),
            Target::Detached(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match &self.target {
            Target::Registered(kind) => kind.name(),
            Target::Detached(name) => name,
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self.target, Target::Detached(_))
    }

    /// Members as of the latest published batch.
    pub fn current_members(&self) -> Members {
        match self.target {
            Target::Registered(kind) => self.shared.snapshot().members(kind).clone(),
            Target::Detached(_) => Members::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.current_members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_members().is_empty()
    }

    pub fn contains(&self, id: ConversationId) -> bool {
        self.current_members().contains(id)
    }

    /// Index of `id` in this view. O(log n).
    pub fn position(&self, id: ConversationId) -> Option<usize> {
        self.current_members().index_of(id)
    }

    pub fn version(&self) -> u64 {
        self.shared.snapshot().version()
    }

    /// Subscribe to this view with the directory's default subscription
    /// settings.
    pub fn subscribe(&self) -> SubscriptionHandle {
        self.subscribe_with(self.shared.config.subscription.clone())
    }

    /// Subscribe to this view. The view filter of `config` is replaced by
    /// this view; conversation filters are kept.
    pub fn subscribe_with(&self, mut config: SubscriptionConfig) -> SubscriptionHandle {
        match &self.target {
            Target::Registered(kind) => {
                config.filter.views = Some(vec![*kind]);
                config.filter.include_view_changes = true;
                self.shared.subscribe(config)
            }
            Target::Detached(name) => {
                SubscriptionHandle::dropped(DropReason::UnknownView(name.clone()))
            }
        }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.shared.subscriptions.unsubscribe(id);
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandle")
            .field("name", &self.name())
            .field("detached", &self.is_detached())
            .finish()
    }
}
