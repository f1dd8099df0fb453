use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use super::{MAX_MESSAGE_LENGTH, MAX_URL_LENGTH, MAX_USER_ID_LENGTH};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Media,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub id: String,
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub sender_id: String,
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub receiver_id: String,
    #[serde(default)]
    #[garde(length(max = MAX_MESSAGE_LENGTH))]
    pub content: Option<String>,
    #[serde(default)]
    #[garde(length(max = MAX_URL_LENGTH))]
    pub media_url: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub message_type: MessageType,
    #[serde(default)]
    #[garde(skip)]
    pub status: MessageStatus,
    #[serde(default)]
    #[garde(skip)]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Text shown in list previews; media messages without a caption show a placeholder
    pub fn preview_text(&self) -> String {
        match (&self.content, self.message_type) {
            (Some(text), _) if !text.is_empty() => text.clone(),
            (_, MessageType::Media) => "Media".to_string(),
            _ => String::new(),
        }
    }

    /// Whether this message was exchanged between the two given users, in either direction
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}
