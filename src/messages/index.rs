//! Message index for lifecycle bookkeeping and per-conversation lookups.

use super::message::{
    expiring_before, DeliveryOutcome, EventId, ExpirationPolicy, Message, MessageNonce,
};
use crate::error::{DirectoryError, Result};
use crate::types::{ConversationId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Messages by nonce, with a per-conversation secondary index.
pub struct MessageIndex {
    /// Nonce -> message.
    messages: RwLock<HashMap<MessageNonce, Message>>,

    /// Conversation -> nonces of its messages.
    by_conversation: RwLock<HashMap<ConversationId, Vec<MessageNonce>>>,

    policy: RwLock<ExpirationPolicy>,

    /// Policy restored by [`MessageIndex::reset_default_expiration`].
    initial_policy: ExpirationPolicy,
}

impl MessageIndex {
    pub fn new(policy: ExpirationPolicy) -> Self {
        Self {
            messages: RwLock::new(HashMap::new()),
            by_conversation: RwLock::new(HashMap::new()),
            policy: RwLock::new(policy),
            initial_policy: policy,
        }
    }

    /// Add a message, replacing any message with the same nonce.
    pub fn insert(&self, message: Message) {
        let nonce = message.nonce;
        let conversation = message.conversation;

        let previous = self.messages.write().insert(nonce, message);

        let mut by_conversation = self.by_conversation.write();
        if let Some(previous) = previous {
            if previous.conversation == conversation {
                return;
            }
            if let Some(nonces) = by_conversation.get_mut(&previous.conversation) {
                nonces.retain(|n| *n != nonce);
            }
        }
        by_conversation.entry(conversation).or_default().push(nonce);
    }

    pub fn get(&self, nonce: MessageNonce) -> Option<Message> {
        self.messages.read().get(&nonce).cloned()
    }

    /// Look up a message by nonce within one conversation.
    pub fn find(&self, conversation: ConversationId, nonce: MessageNonce) -> Option<Message> {
        self.messages
            .read()
            .get(&nonce)
            .filter(|m| m.conversation == conversation)
            .cloned()
    }

    pub fn policy(&self) -> ExpirationPolicy {
        *self.policy.read()
    }

    /// Override the expiration window for subsequent sends.
    pub fn set_default_expiration(&self, expiration: Duration) {
        self.policy.write().default_expiration = expiration;
    }

    pub fn reset_default_expiration(&self) {
        *self.policy.write() = self.initial_policy;
    }

    pub fn mark_sent(&self, nonce: MessageNonce, now: Timestamp) -> Result<()> {
        let policy = self.policy();
        self.update(nonce, |m| m.mark_sent(now, &policy))
    }

    pub fn confirm_delivery(
        &self,
        nonce: MessageNonce,
        event_id: EventId,
        now: Timestamp,
    ) -> Result<DeliveryOutcome> {
        let policy = self.policy();
        let outcome = self.update(nonce, |m| m.confirm_delivery(event_id, now, &policy))?;
        if outcome == DeliveryOutcome::Resent {
            tracing::debug!(%nonce, "confirmation arrived after expiry, resending");
        }
        Ok(outcome)
    }

    pub fn expire(&self, nonce: MessageNonce, now: Timestamp) -> Result<()> {
        self.update(nonce, |m| m.expire(now))
    }

    pub fn resend(&self, nonce: MessageNonce, now: Timestamp) -> Result<()> {
        let policy = self.policy();
        self.update(nonce, |m| m.resend(now, &policy))
    }

    pub fn remove(&self, nonce: MessageNonce) -> Result<()> {
        self.update(nonce, Message::remove)
    }

    /// Record expiry for every message whose deadline passed.
    ///
    /// Returns the nonces that expired on this call.
    pub fn expire_due(&self, now: Timestamp) -> Vec<MessageNonce> {
        let mut expired: Vec<MessageNonce> = self
            .messages
            .write()
            .values_mut()
            .filter_map(|m| m.expire_if_due(now).then_some(m.nonce))
            .collect();
        expired.sort_unstable();

        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "messages expired");
        }
        expired
    }

    /// Nonces of messages that will expire before `instant`, soonest first.
    ///
    /// Includes overdue messages until [`MessageIndex::expire_due`] records
    /// their expiry.
    pub fn expiring_before(&self, instant: Timestamp) -> Vec<MessageNonce> {
        let messages = self.messages.read();
        expiring_before(messages.values(), instant)
            .into_iter()
            .map(|m| m.nonce)
            .collect()
    }

    /// Messages of a conversation in timeline order.
    pub fn messages_in(&self, conversation: ConversationId) -> Vec<Message> {
        let by_conversation = self.by_conversation.read();
        let messages = self.messages.read();

        let mut found: Vec<Message> = by_conversation
            .get(&conversation)
            .into_iter()
            .flatten()
            .filter_map(|nonce| messages.get(nonce).cloned())
            .collect();
        found.sort_by_key(|m| (m.sort_timestamp(), m.nonce));
        found
    }

    /// Incoming messages newer than `since` that count as unread.
    pub fn unread_count(&self, conversation: ConversationId, since: Option<Timestamp>) -> usize {
        self.messages_in(conversation)
            .iter()
            .filter(|m| m.should_generate_unread_count())
            .filter(|m| since.map_or(true, |since| m.sort_timestamp() > since))
            .count()
    }

    /// Timestamp of the newest message that is not removed.
    pub fn last_activity(&self, conversation: ConversationId) -> Option<Timestamp> {
        self.messages_in(conversation)
            .iter()
            .filter(|m| !m.is_removed())
            .map(Message::sort_timestamp)
            .max()
    }

    /// Get count of messages.
    pub fn count(&self) -> usize {
        self.messages.read().len()
    }

    fn update<T>(
        &self,
        nonce: MessageNonce,
        f: impl FnOnce(&mut Message) -> Result<T>,
    ) -> Result<T> {
        let mut messages = self.messages.write();
        let message = messages
            .get_mut(&nonce)
            .ok_or(DirectoryError::MessageNotFound(nonce))?;
        f(message)
    }
}

impl Default for MessageIndex {
    fn default() -> Self {
        Self::new(ExpirationPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{DeliveryState, MessageKind};

    const CONV: ConversationId = ConversationId(7);

    fn outgoing(index: &MessageIndex, now: Timestamp) -> MessageNonce {
        let message = Message::outgoing(CONV, MessageKind::Text, None, now);
        let nonce = message.nonce;
        index.insert(message);
        nonce
    }

    #[test]
    fn test_missing_message() {
        let index = MessageIndex::default();
        let nonce = MessageNonce::random();
        let err = index.mark_sent(nonce, Timestamp(0)).unwrap_err();
        assert_eq!(err, DirectoryError::MessageNotFound(nonce));
    }

    #[test]
    fn test_expiration_scenario() {
        let index = MessageIndex::default();
        index.set_default_expiration(Duration::from_secs(2));

        let t0 = Timestamp::from_secs(1_000);
        let nonce = outgoing(&index, t0);
        index.mark_sent(nonce, t0).unwrap();

        assert!(index.expire_due(Timestamp::from_secs(1_001)).is_empty());

        let later = Timestamp::from_secs(1_003);
        assert_eq!(index.expire_due(later), vec![nonce]);
        let message = index.get(nonce).unwrap();
        assert!(message.is_expired());
        assert_eq!(message.delivery_state(later), DeliveryState::Expired);

        let outcome = index
            .confirm_delivery(nonce, EventId::new("late"), later)
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Resent);
        assert_eq!(
            index.get(nonce).unwrap().expiration_date(),
            Some(later.after(Duration::from_secs(2)))
        );

        index.reset_default_expiration();
        assert_eq!(index.policy(), ExpirationPolicy::default());
    }

    #[test]
    fn test_expiring_before_skips_delivered() {
        let index = MessageIndex::default();
        let t0 = Timestamp::from_secs(10);

        let waiting = outgoing(&index, t0);
        let delivered = outgoing(&index, t0);
        let pending = outgoing(&index, t0);
        index.mark_sent(waiting, t0).unwrap();
        index.mark_sent(delivered, t0).unwrap();
        index
            .confirm_delivery(delivered, EventId::new("1"), t0)
            .unwrap();

        let horizon = Timestamp::from_secs(100);
        assert_eq!(index.expiring_before(horizon), vec![waiting]);
        assert!(index.expiring_before(t0).is_empty());
        assert_eq!(
            index.get(pending).unwrap().delivery_state(horizon),
            DeliveryState::Pending
        );
    }

    #[test]
    fn test_timeline_order_and_activity() {
        let index = MessageIndex::default();
        let late = outgoing(&index, Timestamp::from_secs(30));
        let early = outgoing(&index, Timestamp::from_secs(10));
        index.insert(Message::outgoing(
            ConversationId(99),
            MessageKind::Text,
            None,
            Timestamp::from_secs(50),
        ));

        let timeline: Vec<MessageNonce> = index.messages_in(CONV).iter().map(|m| m.nonce).collect();
        assert_eq!(timeline, vec![early, late]);
        assert_eq!(index.last_activity(CONV), Some(Timestamp::from_secs(30)));

        index.remove(late).unwrap();
        assert_eq!(index.last_activity(CONV), Some(Timestamp::from_secs(10)));
        assert_eq!(index.messages_in(CONV).len(), 2);
    }

    #[test]
    fn test_unread_count() {
        let index = MessageIndex::default();
        for (i, kind) in [MessageKind::Text, MessageKind::System, MessageKind::Image]
            .into_iter()
            .enumerate()
        {
            index.insert(Message::incoming(
                MessageNonce::random(),
                EventId::new(format!("e{i}")),
                CONV,
                kind,
                None,
                Timestamp::from_secs(i as i64 + 1),
            ));
        }
        outgoing(&index, Timestamp::from_secs(4));

        assert_eq!(index.unread_count(CONV, None), 2);
        assert_eq!(index.unread_count(CONV, Some(Timestamp::from_secs(1))), 1);
        assert_eq!(index.unread_count(ConversationId(1), None), 0);
    }

    #[test]
    fn test_find_checks_conversation() {
        let index = MessageIndex::default();
        let nonce = outgoing(&index, Timestamp(0));
        assert!(index.find(CONV, nonce).is_some());
        assert!(index.find(ConversationId(8), nonce).is_none());
        assert_eq!(index.count(), 1);
    }
}
