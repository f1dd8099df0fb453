use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::models::{ChatMessage, MessageStatus, MessageType, RawChat, MAX_USER_ID_LENGTH};

const MAX_ERROR_LENGTH: usize = 1000;

/// Events sent from the client to the chat server.
///
/// Frames are `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    #[serde(rename_all = "camelCase")]
    Register { user_id: String },
    #[serde(rename_all = "camelCase")]
    GetMessages {
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: String,
        receiver_id: String,
        content: String,
        media_url: Option<String>,
        message_type: MessageType,
    },
    #[serde(rename_all = "camelCase")]
    MessageSent {
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        sender_id: String,
        receiver_id: String,
        is_typing: bool,
    },
    #[serde(rename_all = "camelCase")]
    UpdateMessageStatus {
        message_id: String,
        status: MessageStatus,
    },
}

impl OutboundEvent {
    pub fn to_frame(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MessageHistoryEvent {
    #[garde(dive)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveMessageEvent {
    #[serde(default)]
    #[garde(length(max = MAX_USER_ID_LENGTH))]
    pub chat_id: Option<String>,
    #[garde(dive)]
    pub message: ChatMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewChatEvent {
    #[garde(dive)]
    pub chat: RawChat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentEvent {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub sender_id: String,
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub receiver_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusEvent {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub message_id: String,
    #[garde(skip)]
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatusEvent {
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub sender_id: String,
    #[garde(skip)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ServerErrorEvent {
    #[garde(length(max = MAX_ERROR_LENGTH))]
    pub message: String,
}

/// Events pushed by the chat server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InboundEvent {
    MessageHistory(MessageHistoryEvent),
    ReceiveMessage(ReceiveMessageEvent),
    NewChat(NewChatEvent),
    MessageSent(MessageSentEvent),
    MessageStatusUpdated(MessageStatusEvent),
    TypingStatus(TypingStatusEvent),
    Error(ServerErrorEvent),
}

impl InboundEvent {
    /// Parse a text frame and check its payload against the event schema
    pub fn parse(text: &str) -> Result<Self, ChatError> {
        let event: InboundEvent =
            serde_json::from_str(text).map_err(|e| ChatError::InvalidEvent {
                event: "unknown",
                reason: e.to_string(),
            })?;
        event.validate_payload()?;
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::MessageHistory(_) => "messageHistory",
            InboundEvent::ReceiveMessage(_) => "receiveMessage",
            InboundEvent::NewChat(_) => "newChat",
            InboundEvent::MessageSent(_) => "messageSent",
            InboundEvent::MessageStatusUpdated(_) => "messageStatusUpdated",
            InboundEvent::TypingStatus(_) => "typingStatus",
            InboundEvent::Error(_) => "error",
        }
    }

    fn validate_payload(&self) -> Result<(), ChatError> {
        let result = match self {
            InboundEvent::MessageHistory(e) => e.validate(),
            InboundEvent::ReceiveMessage(e) => e.validate(),
            InboundEvent::NewChat(e) => e.validate(),
            InboundEvent::MessageSent(e) => e.validate(),
            InboundEvent::MessageStatusUpdated(e) => e.validate(),
            InboundEvent::TypingStatus(e) => e.validate(),
            InboundEvent::Error(e) => e.validate(),
        };
        result.map_err(|report| ChatError::InvalidEvent {
            event: self.name(),
            reason: report.to_string(),
        })
    }
}
