use crate::domain::ConversationId;
use crate::domain::message::MessageRecord;

/// Event fanned out to local subscribers when a new message lands in a
/// conversation's log. Delivery is at-most-once; the log itself is the
/// durable source of truth.
#[derive(Debug, Clone)]
pub struct MessagePosted {
    pub conversation_id: ConversationId,
    pub record: MessageRecord,
}
