use async_trait::async_trait;
use garde::Validate;
use tracing::{debug, warn};
use url::Url;

use super::ChatListSource;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::models::ChatListResponse;

/// REST client for the chat list endpoint
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpChatApi {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| ChatError::Config(format!("api url {}: {}", config.api_base_url, e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            token: config.api_token.clone(),
        })
    }

    /// `{base}/chat/list/{user_id}`
    fn chat_list_url(&self, user_id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::Config(format!("api url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["chat", "list", user_id]);
        Ok(url)
    }
}

#[async_trait]
impl ChatListSource for HttpChatApi {
    async fn fetch_chat_list(&self, user_id: &str) -> Result<ChatListResponse> {
        let url = self.chat_list_url(user_id)?;
        debug!(url = %url, "Fetching chat list");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Http(format!("unexpected status {}", status)));
        }

        let body = response.text().await?;
        let mut parsed: ChatListResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        // Drop records that fail the schema instead of failing the whole list
        let before = parsed.chat_list.len();
        parsed.chat_list.retain(|chat| match chat.validate() {
            Ok(()) => true,
            Err(report) => {
                warn!(error = %report, "Skipping invalid chat record");
                false
            }
        });
        if parsed.chat_list.len() != before {
            debug!(
                kept = parsed.chat_list.len(),
                dropped = before - parsed.chat_list.len(),
                "Filtered chat list"
            );
        }

        Ok(parsed)
    }
}
