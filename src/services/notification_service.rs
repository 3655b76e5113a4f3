use crate::config::NotificationConfig;
use crate::domain::ConversationId;
use crate::domain::message::MessageRecord;
use crate::domain::notification::MessagePosted;
use crate::error::Result;
use crate::storage::{LogStore, StoreEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Fans new-message events out to local subscribers.
///
/// Events travel store pub/sub between processes and land in
/// per-conversation local broadcast channels here. Delivery is at-most-once
/// with no replay; the message log is the durable record.
#[derive(Clone, Debug)]
pub struct NotificationService {
    store: Arc<dyn LogStore>,
    channels: Arc<DashMap<ConversationId, broadcast::Sender<MessagePosted>>>,
    channel_prefix: String,
    conversation_channel_capacity: usize,
}

impl NotificationService {
    /// Creates a new notification service handle.
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, config: &NotificationConfig) -> Self {
        Self {
            store,
            channels: Arc::new(DashMap::new()),
            channel_prefix: config.channel_prefix.clone(),
            conversation_channel_capacity: config.conversation_channel_capacity,
        }
    }

    /// Publishes a new-message event on the conversation's channel. Only
    /// subscribers connected at publish time receive it.
    ///
    /// # Errors
    /// Returns an error if the record cannot be encoded or the publish fails.
    pub async fn publish(&self, conversation_id: ConversationId, record: &MessageRecord) -> Result<()> {
        let channel = format!("{}{conversation_id}", self.channel_prefix);
        let payload = serde_json::to_vec(record)?;
        self.store.publish(&channel, &payload).await
    }

    /// Returns a receiver of events for one conversation. Dropping the
    /// receiver is the only cancellation; its channel is reclaimed by a
    /// later GC pass once no receivers remain.
    #[tracing::instrument(skip(self), fields(conversation_id = %conversation_id))]
    pub fn subscribe(&self, conversation_id: ConversationId) -> broadcast::Receiver<MessagePosted> {
        let tx = self
            .channels
            .entry(conversation_id)
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(self.conversation_channel_capacity);
                tx
            })
            .value()
            .clone();

        tx.subscribe()
    }

    /// Opens the store-level pattern subscription covering every
    /// conversation channel. Consumed by the notification worker.
    ///
    /// # Errors
    /// Returns an error if the subscription fails.
    pub async fn subscribe_realtime(&self) -> Result<broadcast::Receiver<StoreEvent>> {
        let pattern = format!("{}*", self.channel_prefix);
        self.store.subscribe_pattern(&pattern).await
    }

    /// Routes one store event into its conversation's local channel. Events
    /// outside the conversation namespace, with a malformed id, or with an
    /// undecodable payload are logged and dropped.
    pub fn dispatch_event(&self, event: &StoreEvent) {
        let Some(suffix) = event.channel.strip_prefix(&self.channel_prefix) else {
            tracing::debug!(channel = %event.channel, "Ignoring event outside the conversation namespace");
            return;
        };
        let Ok(conversation_id) = suffix.parse::<ConversationId>() else {
            tracing::warn!(channel = %event.channel, "Ignoring event with a malformed conversation id");
            return;
        };
        let Ok(record) = serde_json::from_slice::<MessageRecord>(&event.payload) else {
            tracing::warn!(conversation_id, "Ignoring event with an undecodable payload");
            return;
        };

        if let Some(tx) = self.channels.get(&conversation_id) {
            tracing::trace!(conversation_id, "Dispatched event to local channel");
            let _ = tx.send(MessagePosted { conversation_id, record });
        } else {
            tracing::debug!(conversation_id, "No local subscriber for event");
        }
    }

    /// Performs a garbage collection cycle to reclaim conversation channels
    /// with no remaining receivers.
    pub fn perform_gc(&self) {
        tracing::debug!("Starting notification channel GC cycle");
        let mut reclaimed = 0;

        self.channels.retain(|_, sender| {
            let active = sender.receiver_count() > 0;
            if !active {
                reclaimed += 1;
            }
            active
        });

        if reclaimed > 0 {
            tracing::info!(reclaimed, "Notification channel GC reclaimed stale channels");
        }
    }
}
