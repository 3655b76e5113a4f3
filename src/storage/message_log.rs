use crate::config::{MessagingConfig, ReadReceiptScope};
use crate::domain::ConversationId;
use crate::domain::message::{MessageRecord, utc_now};
use crate::error::Result;
use crate::storage::LogStore;
use std::sync::Arc;

/// Append-ordered message history, one store list per conversation, keyed
/// `<key_prefix><conversation_id>` and holding JSON-encoded records.
#[derive(Debug, Clone)]
pub struct MessageLog {
    store: Arc<dyn LogStore>,
    key_prefix: String,
    max_log_len: i64,
}

impl MessageLog {
    #[must_use]
    pub fn new(store: Arc<dyn LogStore>, config: &MessagingConfig) -> Self {
        Self { store, key_prefix: config.key_prefix.clone(), max_log_len: config.max_log_len }
    }

    fn key(&self, conversation_id: ConversationId) -> String {
        format!("{}{conversation_id}", self.key_prefix)
    }

    /// Appends a record to the conversation's tail, then trims the list to
    /// the configured retention cap when one is set. Content validation is
    /// the caller's concern.
    ///
    /// # Errors
    /// Returns an error if encoding or the store write fails.
    pub async fn append(&self, conversation_id: ConversationId, record: &MessageRecord) -> Result<()> {
        let key = self.key(conversation_id);
        let entry = serde_json::to_string(record)?;
        self.store.append(&key, &entry).await?;

        if self.max_log_len > 0 {
            self.store.trim_to_latest(&key, self.max_log_len).await?;
        }

        Ok(())
    }

    /// Reads the conversation's full history, oldest first. A conversation
    /// with no stored messages reads as empty, whether or not its key ever
    /// existed.
    ///
    /// # Errors
    /// Returns `AppError::Codec` on the first malformed entry; a partial
    /// sequence is never returned.
    pub async fn read_all(&self, conversation_id: ConversationId) -> Result<Vec<MessageRecord>> {
        let entries = self.store.read_range(&self.key(conversation_id)).await?;

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            records.push(serde_json::from_str(&entry)?);
        }

        Ok(records)
    }

    /// Marks every unread record matching `scope` as read by stamping
    /// `is_read`/`is_read_at` and rewriting it at its original list index.
    /// Returns the number of records rewritten; already-read records make
    /// this idempotent.
    ///
    /// The pass is not atomic across entries, but each rewrite is a
    /// compare-and-set against the entry the read pass saw. An entry that
    /// moved or changed in the meantime, say under a concurrent append's
    /// retention trim or a racing pass, is skipped rather than clobbered
    /// and gets marked on a later call.
    ///
    /// # Errors
    /// Returns an error if the store fails or an entry is malformed.
    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader_email: &str,
        scope: ReadReceiptScope,
    ) -> Result<u64> {
        let key = self.key(conversation_id);
        let entries = self.store.read_range(&key).await?;
        let now = utc_now();
        let mut updated = 0;

        for (index, entry) in entries.iter().enumerate() {
            let mut record: MessageRecord = serde_json::from_str(entry)?;
            if record.is_read || !scope_matches(scope, &record, reader_email) {
                continue;
            }

            record.mark_read(now);
            let rewritten = serde_json::to_string(&record)?;
            if self.store.write_at_if(&key, index, entry, &rewritten).await? {
                updated += 1;
            } else {
                tracing::debug!(
                    conversation_id,
                    index,
                    "Entry changed under the mark-read pass, skipping"
                );
            }
        }

        Ok(updated)
    }

    /// Removes the conversation's history entirely. The hook for the owner
    /// of conversation lifecycles to cascade a deletion into the log.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn purge(&self, conversation_id: ConversationId) -> Result<()> {
        self.store.remove(&self.key(conversation_id)).await
    }
}

fn scope_matches(scope: ReadReceiptScope, record: &MessageRecord, reader_email: &str) -> bool {
    match scope {
        ReadReceiptScope::Received => record.sender_email != reader_email,
        ReadReceiptScope::Sent => record.sender_email == reader_email,
    }
}
