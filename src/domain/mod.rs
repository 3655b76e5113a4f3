pub mod message;
pub mod notification;

/// Identifier of a conversation, owned by the external relational store and
/// referenced here by value only.
pub type ConversationId = i64;
