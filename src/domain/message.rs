use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime};

// Wall-clock timestamps are UTC by contract and stored at second precision,
// e.g. "2024-09-09 11:13:07".
time::serde::format_description!(
    wire_timestamp,
    PrimitiveDateTime,
    "[year]-[month]-[day] [hour]:[minute]:[second]"
);

/// One chat message plus its read-state metadata, as stored in a
/// conversation's message list and published to subscribers.
///
/// The JSON encoding keeps the historical wire names (`isRead`, `isReadAt`);
/// absent optional fields decode to their defaults and unknown fields are
/// ignored, so records written by older deployments stay readable.
///
/// After append, only `is_read` and `is_read_at` are ever mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Client-supplied or server-assigned identifier. Legacy records may
    /// carry a JSON integer here; it is normalized to a string on decode.
    #[serde(default, deserialize_with = "id_from_wire")]
    pub id: Option<String>,
    pub content: String,
    pub sender_id: i64,
    pub sender_email: String,
    /// Display name of the author, frozen at send time.
    pub sent_by: String,
    /// Assigned by the server at append time, never by the client.
    #[serde(with = "wire_timestamp")]
    pub sent_at: PrimitiveDateTime,
    #[serde(rename = "isRead", default)]
    pub is_read: bool,
    #[serde(rename = "isReadAt", default, with = "wire_timestamp::option")]
    pub is_read_at: Option<PrimitiveDateTime>,
}

impl MessageRecord {
    /// Flips the record to read, stamping when the transition happened.
    pub const fn mark_read(&mut self, at: PrimitiveDateTime) {
        self.is_read = true;
        self.is_read_at = Some(at);
    }
}

/// Caller-provided parts of a message about to be sent. The sender identity
/// and display name come from the embedding application's user store;
/// content validation (non-empty, length limits) is also the caller's
/// concern.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Option<String>,
    pub content: String,
    pub sender_id: i64,
    pub sender_email: String,
    pub sent_by: String,
}

impl NewMessage {
    /// Builds the record that will be appended: server-assigned `sent_at`,
    /// a generated id when the client supplied none, and unread state.
    #[must_use]
    pub fn into_record(self, sent_at: PrimitiveDateTime) -> MessageRecord {
        MessageRecord {
            id: Some(self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
            content: self.content,
            sender_id: self.sender_id,
            sender_email: self.sender_email,
            sent_by: self.sent_by,
            sent_at,
            is_read: false,
            is_read_at: None,
        }
    }
}

/// Current wall-clock time in the wire's fixed zone and precision.
pub(crate) fn utc_now() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_utc();
    let now = now.replace_nanosecond(0).unwrap_or(now);
    PrimitiveDateTime::new(now.date(), now.time())
}

fn id_from_wire<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<WireId>::deserialize(deserializer)?.map(|id| match id {
        WireId::Text(text) => text,
        WireId::Number(number) => number.to_string(),
    }))
}
