mod client;
mod events;
mod handlers;

pub use client::SocketClient;
pub use events::{
    InboundEvent, MessageHistoryEvent, MessageSentEvent, MessageStatusEvent, NewChatEvent,
    OutboundEvent, ReceiveMessageEvent, ServerErrorEvent, TypingStatusEvent,
};
pub use handlers::EventHandlers;

use crate::error::Result;
use crate::models::{MessageStatus, MessageType};

/// Live connection to the chat server.
///
/// Implemented by [`SocketClient`]; tests substitute their own.
pub trait ChatTransport: Send + Sync {
    /// Open the connection. Calling it again while open does nothing.
    fn connect(&self);

    fn disconnect(&self);

    /// Tell the server which user this connection belongs to.
    ///
    /// The identity is kept and re-sent after every reconnect.
    fn register(&self, user_id: &str) -> Result<()>;

    /// Fire-and-forget send of an outbound event
    fn emit(&self, event: OutboundEvent) -> Result<()>;

    fn handlers(&self) -> &EventHandlers;

    fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        media_url: Option<&str>,
    ) -> Result<()> {
        let message_type = if media_url.is_some() {
            MessageType::Media
        } else {
            MessageType::Text
        };
        self.emit(OutboundEvent::SendMessage {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            media_url: media_url.map(String::from),
            message_type,
        })
    }

    fn emit_message_sent(&self, sender_id: &str, receiver_id: &str) -> Result<()> {
        self.emit(OutboundEvent::MessageSent {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
        })
    }

    fn emit_typing(&self, sender_id: &str, receiver_id: &str, is_typing: bool) -> Result<()> {
        self.emit(OutboundEvent::Typing {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            is_typing,
        })
    }

    fn update_message_status(&self, message_id: &str, status: MessageStatus) -> Result<()> {
        self.emit(OutboundEvent::UpdateMessageStatus {
            message_id: message_id.to_string(),
            status,
        })
    }

    /// Ask for the history between two users; answered by a `messageHistory` event
    fn get_messages(&self, sender_id: &str, receiver_id: &str) -> Result<()> {
        self.emit(OutboundEvent::GetMessages {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
        })
    }
}
