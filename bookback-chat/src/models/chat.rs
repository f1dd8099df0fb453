use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use super::{MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, MAX_URL_LENGTH, MAX_USER_ID_LENGTH};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    #[default]
    Offline,
}

/// One side of a chat as the server embeds it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Participant {
    #[serde(rename = "_id")]
    #[garde(length(min = 1, max = MAX_USER_ID_LENGTH))]
    pub id: String,
    #[serde(rename = "Name", default)]
    #[garde(length(max = MAX_NAME_LENGTH))]
    pub name: Option<String>,
    #[serde(rename = "profileImage", default)]
    #[garde(length(max = MAX_URL_LENGTH))]
    pub profile_image: Option<String>,
    #[serde(rename = "onlineStatus", default)]
    #[garde(skip)]
    pub online_status: OnlineStatus,
}

/// Chat record as returned by the chat list endpoint and the `newChat` event.
///
/// The two participants are unordered; callers pick the counterpart relative
/// to the local user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RawChat {
    #[serde(rename = "_id", default)]
    #[garde(length(max = MAX_USER_ID_LENGTH))]
    pub id: Option<String>,
    #[serde(rename = "userId1")]
    #[garde(dive)]
    pub participant_a: Participant,
    #[serde(rename = "userId2")]
    #[garde(dive)]
    pub participant_b: Participant,
    #[serde(default)]
    #[garde(length(max = MAX_MESSAGE_LENGTH))]
    pub last_message: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RawChat {
    /// The participant that is not `local_user_id`.
    ///
    /// Falls back to the first participant when neither side matches.
    pub fn counterpart(&self, local_user_id: &str) -> &Participant {
        if self.participant_a.id == local_user_id {
            &self.participant_b
        } else {
            &self.participant_a
        }
    }
}

/// Body of the chat list endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatListResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "chatList", default)]
    pub chat_list: Vec<RawChat>,
}
