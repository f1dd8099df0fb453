use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, OnlineStatus, RawChat};

/// List-view summary of a two-party conversation, keyed by the counterpart's id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPreview {
    pub user_id: String,
    pub user_name: String,
    pub profile_image: Option<String>,
    pub online_status: OnlineStatus,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
}

impl ConversationPreview {
    pub fn from_raw(chat: &RawChat, local_user_id: &str) -> Self {
        let other = chat.counterpart(local_user_id);
        Self {
            user_id: other.id.clone(),
            user_name: other.name.clone().unwrap_or_default(),
            profile_image: other.profile_image.clone(),
            online_status: other.online_status,
            last_message: chat.last_message.clone(),
            last_message_time: chat.updated_at,
        }
    }

    /// Timestamp used for ordering; missing times sort as the epoch
    pub fn sort_key(&self) -> DateTime<Utc> {
        self.last_message_time.unwrap_or_default()
    }

    /// Fold a live message into the preview. Older messages than the one shown are ignored.
    pub fn merge_message(&mut self, message: &ChatMessage) {
        let newer = match (message.created_at, self.last_message_time) {
            (Some(incoming), Some(current)) => incoming >= current,
            _ => true,
        };
        if newer {
            self.last_message = Some(message.preview_text());
            self.last_message_time = message.created_at.or(self.last_message_time);
        }
    }
}
