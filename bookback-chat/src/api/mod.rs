mod chat;

pub use chat::HttpChatApi;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::ChatListResponse;

/// Where the initial conversation list comes from
#[async_trait]
pub trait ChatListSource: Send + Sync {
    async fn fetch_chat_list(&self, user_id: &str) -> Result<ChatListResponse>;
}
