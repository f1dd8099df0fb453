mod chat;
mod message;
mod preview;

pub use chat::{ChatListResponse, OnlineStatus, Participant, RawChat};
pub use message::{ChatMessage, MessageStatus, MessageType};
pub use preview::ConversationPreview;

/// Validation limits shared by the inbound schemas
pub(crate) const MAX_USER_ID_LENGTH: usize = 128;
pub(crate) const MAX_NAME_LENGTH: usize = 100;
pub(crate) const MAX_MESSAGE_LENGTH: usize = 10000;
pub(crate) const MAX_URL_LENGTH: usize = 2048;
