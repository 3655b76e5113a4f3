pub mod message_service;
pub mod notification_service;

pub use message_service::MessageService;
pub use notification_service::NotificationService;
