use crate::config::{MessagingConfig, ReadReceiptScope};
use crate::domain::ConversationId;
use crate::domain::message::{MessageRecord, NewMessage, utc_now};
use crate::error::Result;
use crate::services::notification_service::NotificationService;
use crate::storage::MessageLog;

/// The surface the embedding application talks to: log operations plus the
/// publish half of the notification bus, in the right order.
#[derive(Clone, Debug)]
pub struct MessageService {
    log: MessageLog,
    notifier: NotificationService,
    read_receipt_scope: ReadReceiptScope,
}

impl MessageService {
    #[must_use]
    pub fn new(log: MessageLog, notifier: NotificationService, config: &MessagingConfig) -> Self {
        Self { log, notifier, read_receipt_scope: config.read_receipt_scope }
    }

    /// Appends a message to the conversation's log, then publishes it to
    /// subscribers. Returns the record as stored (server `sent_at`, id
    /// assigned when the client sent none) so the caller can update its own
    /// conversation metadata, such as a last-activity timestamp.
    ///
    /// # Errors
    /// Returns an error if the append or the publish fails. A publish
    /// failure after a successful append leaves the message durably stored.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, message),
        fields(conversation_id = %conversation_id, sender_id = %message.sender_id)
    )]
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<MessageRecord> {
        let record = message.into_record(utc_now());
        self.log.append(conversation_id, &record).await?;
        tracing::debug!("Message appended to conversation log");

        self.notifier.publish(conversation_id, &record).await?;
        Ok(record)
    }

    /// Returns one page of the conversation's history, newest first. `page`
    /// is 1-based; an out-of-range page is empty.
    ///
    /// # Errors
    /// Returns an error if the read fails or an entry is malformed.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self),
        fields(conversation_id = %conversation_id)
    )]
    pub async fn list_messages(
        &self,
        conversation_id: ConversationId,
        page: usize,
        limit: usize,
    ) -> Result<Vec<MessageRecord>> {
        let mut records = self.log.read_all(conversation_id).await?;
        records.reverse();

        let start = page.saturating_sub(1).saturating_mul(limit);
        Ok(records.into_iter().skip(start).take(limit).collect())
    }

    /// Returns the conversation's most recent message, if any.
    ///
    /// # Errors
    /// Returns an error if the read fails or an entry is malformed.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(conversation_id = %conversation_id))]
    pub async fn last_message(&self, conversation_id: ConversationId) -> Result<Option<MessageRecord>> {
        let mut records = self.log.read_all(conversation_id).await?;
        Ok(records.pop())
    }

    /// Marks the conversation's unread messages read on behalf of
    /// `reader_email`, under the configured receipt scope. Returns how many
    /// records changed; calling again changes nothing.
    ///
    /// # Errors
    /// Returns an error if the store fails or an entry is malformed.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, reader_email),
        fields(conversation_id = %conversation_id)
    )]
    pub async fn mark_read(&self, conversation_id: ConversationId, reader_email: &str) -> Result<u64> {
        let updated = self.log.mark_read(conversation_id, reader_email, self.read_receipt_scope).await?;
        if updated > 0 {
            tracing::debug!(updated, "Marked conversation messages read");
        }
        Ok(updated)
    }

    /// Drops the conversation's entire history. Called by whatever owns
    /// conversation lifecycles when the conversation itself is deleted.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(conversation_id = %conversation_id))]
    pub async fn purge(&self, conversation_id: ConversationId) -> Result<()> {
        self.log.purge(conversation_id).await
    }
}
