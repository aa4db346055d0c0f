//! Subscription manager for broadcasting directory events.

use crate::changes::ConversationChangeInfo;
use crate::error::{DirectoryError, Result};
use crate::registry::ViewKind;
use crate::view::ViewDelta;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DirectoryEvent, DropReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};

/// Internal subscription state.
struct Subscription {
    config: SubscriptionConfig,
    /// One slot larger than `config.buffer_size`, so the final `Dropped`
    /// event always fits.
    sender: Sender<DirectoryEvent>,
    /// Whether the initial snapshot has been sent.
    caught_up: bool,
}

impl Subscription {
    /// Try to send an event. Returns false if buffer is full (subscriber will be dropped).
    fn try_send(&self, event: DirectoryEvent) -> bool {
        if self.sender.len() >= self.config.buffer_size.max(1) {
            return false;
        }
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(crossbeam_channel::TrySendError::Full(_)) => false,
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
        }
    }

    /// Last event of a subscription that fell behind. Uses the reserved slot.
    fn notify_overflow(&self) {
        let _ = self.sender.try_send(DirectoryEvent::Dropped {
            reason: DropReason::BufferOverflow,
        });
    }

    fn filter(&self) -> &SubscriptionFilter {
        &self.config.filter
    }
}

/// Manages subscriptions and broadcasts events.
pub struct SubscriptionManager {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    /// Create a new subscription manager.
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new subscription.
    ///
    /// Returns a handle for receiving events. The subscription receives no
    /// live events until [`SubscriptionManager::mark_caught_up`] is called.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1) + 1);

        let subscription = Subscription {
            config,
            sender,
            caught_up: false,
        };

        self.subscriptions.write().insert(id, subscription);

        SubscriptionHandle { id, receiver }
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Send dropped event (best effort)
            let _ = sub.sender.try_send(DirectoryEvent::Dropped {
                reason: DropReason::Unsubscribed,
            });
        }
    }

    /// Mark a subscription as caught up (initial snapshot delivered).
    pub fn mark_caught_up(&self, id: SubscriptionId) -> Result<()> {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.get_mut(&id) {
            sub.caught_up = true;
            if !sub.try_send(DirectoryEvent::CaughtUp) {
                sub.notify_overflow();
                subs.remove(&id);
                return Err(DirectoryError::SubscriptionDropped);
            }
        }
        Ok(())
    }

    /// Get subscription count.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Get the config for a subscription.
    pub fn get_config(&self, id: SubscriptionId) -> Option<SubscriptionConfig> {
        self.subscriptions.read().get(&id).map(|s| s.config.clone())
    }

    // --- Broadcasting ---

    /// Broadcast a view delta to subscribers following that view.
    pub fn broadcast_view_changed(&self, view: ViewKind, version: u64, delta: &ViewDelta) {
        let event = DirectoryEvent::ViewChanged {
            view,
            version,
            delta: delta.clone(),
        };

        self.broadcast(|sub| sub.caught_up && sub.filter().wants_view(view), event);
    }

    /// Broadcast a conversation change to subscribers following it.
    pub fn broadcast_conversation_changed(&self, version: u64, change: &ConversationChangeInfo) {
        let id = change.id;
        let event = DirectoryEvent::ConversationChanged {
            version,
            change: change.clone(),
        };

        self.broadcast(|sub| sub.caught_up && sub.filter().wants_conversation(id), event);
    }

    /// Broadcast a full reload to every view subscriber.
    pub fn broadcast_reloaded(&self, version: u64) {
        let event = DirectoryEvent::Reloaded { version };

        self.broadcast(
            |sub| sub.caught_up && sub.filter().include_view_changes,
            event,
        );
    }

    /// Internal broadcast helper. Drops subscribers that fail to receive.
    fn broadcast<F>(&self, filter: F, event: DirectoryEvent)
    where
        F: Fn(&Subscription) -> bool,
    {
        let mut to_remove = Vec::new();

        {
            let subs = self.subscriptions.read();
            for (id, sub) in subs.iter() {
                if filter(sub) && !sub.try_send(event.clone()) {
                    to_remove.push(*id);
                }
            }
        }

        // Remove dropped subscriptions
        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                if let Some(sub) = subs.remove(&id) {
                    tracing::trace!(subscription = id.0, "dropping slow subscriber");
                    sub.notify_overflow();
                }
            }
        }
    }

    /// Send an event directly to a subscription (for the initial snapshot).
    ///
    /// Returns false if the subscription was dropped. A full buffer drops
    /// the subscriber with [`DropReason::BufferOverflow`], as a broadcast
    /// would.
    pub fn send_to(&self, id: SubscriptionId, event: DirectoryEvent) -> bool {
        let delivered = {
            let subs = self.subscriptions.read();
            match subs.get(&id) {
                Some(sub) => sub.try_send(event),
                None => return false,
            }
        };

        if !delivered {
            if let Some(sub) = self.subscriptions.write().remove(&id) {
                tracing::trace!(subscription = id.0, "dropping subscriber during snapshot");
                sub.notify_overflow();
            }
        }
        delivered
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConversationId;
    use crate::view::Positioned;
    use std::time::Duration;

    fn insert_delta(id: u64) -> ViewDelta {
        ViewDelta {
            inserted: vec![Positioned {
                id: ConversationId(id),
                index: 0,
            }],
            ..Default::default()
        }
    }

    fn live(manager: &SubscriptionManager, filter: SubscriptionFilter) -> SubscriptionHandle {
        let handle = manager.subscribe(SubscriptionConfig {
            filter,
            ..Default::default()
        });
        manager.mark_caught_up(handle.id).unwrap();
        let caught_up = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(caught_up, DirectoryEvent::CaughtUp));
        handle
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        assert!(matches!(
            event,
            DirectoryEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_broadcast_to_matching_view() {
        let manager = SubscriptionManager::new();
        let handle = live(&manager, SubscriptionFilter::view(ViewKind::Archived));

        manager.broadcast_view_changed(ViewKind::Archived, 1, &insert_delta(4));

        let event = handle.recv_timeout(Duration::from_millis(100)).unwrap();
        match event {
            DirectoryEvent::ViewChanged {
                view,
                version,
                delta,
            } => {
                assert_eq!(view, ViewKind::Archived);
                assert_eq!(version, 1);
                assert_eq!(delta.inserted_ids(), vec![ConversationId(4)]);
            }
            _ => panic!("Expected ViewChanged event, got {:?}", event),
        }
    }

    #[test]
    fn test_broadcast_filters_other_views() {
        let manager = SubscriptionManager::new();
        let handle = live(&manager, SubscriptionFilter::view(ViewKind::Archived));

        manager.broadcast_view_changed(ViewKind::Cleared, 1, &insert_delta(4));

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[test]
    fn test_conversation_filter() {
        let manager = SubscriptionManager::new();
        let handle = live(
            &manager,
            SubscriptionFilter::conversations(vec![ConversationId(1)]),
        );

        let other = crate::changes::ConversationChangeInfo {
            id: ConversationId(2),
            inserted: true,
            deleted: false,
            changed_keys: Default::default(),
        };
        let mine = crate::changes::ConversationChangeInfo {
            id: ConversationId(1),
            ..other.clone()
        };

        manager.broadcast_conversation_changed(3, &other);
        manager.broadcast_conversation_changed(3, &mine);
        manager.broadcast_view_changed(ViewKind::Archived, 3, &insert_delta(1));

        let events = handle.drain();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DirectoryEvent::ConversationChanged { change, .. } if change.id == ConversationId(1)
        ));
    }

    #[test]
    fn test_drop_slow_subscriber() {
        let manager = SubscriptionManager::new();
        let config = SubscriptionConfig {
            buffer_size: 2,
            filter: SubscriptionFilter::all(),
            ..Default::default()
        };
        let handle = manager.subscribe(config);
        manager.mark_caught_up(handle.id).unwrap();

        // Flood with events
        for i in 0..10 {
            manager.broadcast_view_changed(ViewKind::Archived, i, &insert_delta(i));
        }

        // Subscriber should be dropped
        assert_eq!(manager.subscription_count(), 0);

        let events = handle.drain();
        assert!(matches!(events[0], DirectoryEvent::CaughtUp));
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events.last(),
            Some(DirectoryEvent::Dropped {
                reason: DropReason::BufferOverflow
            })
        ));
    }

    #[test]
    fn test_send_to_full_buffer_reports_overflow() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 1,
            ..Default::default()
        });

        assert!(manager.send_to(handle.id, DirectoryEvent::Reloaded { version: 1 }));
        assert!(!manager.send_to(handle.id, DirectoryEvent::Reloaded { version: 2 }));
        assert!(!manager.send_to(handle.id, DirectoryEvent::Reloaded { version: 3 }));
        assert_eq!(manager.subscription_count(), 0);

        let events = handle.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DirectoryEvent::Reloaded { version: 1 }));
        assert!(matches!(
            events[1],
            DirectoryEvent::Dropped {
                reason: DropReason::BufferOverflow
            }
        ));
        assert!(handle.recv().is_err());
    }

    #[test]
    fn test_not_caught_up_doesnt_receive() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::all(),
            ..Default::default()
        });
        // NOT marking as caught up

        manager.broadcast_reloaded(1);

        let result = handle.recv_timeout(Duration::from_millis(50));
        assert!(result.is_err());
    }
}
