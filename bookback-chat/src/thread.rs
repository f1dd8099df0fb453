use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::models::{ChatMessage, MessageStatus};
use crate::websocket::{
    ChatTransport, MessageHistoryEvent, MessageStatusEvent, ReceiveMessageEvent,
    TypingStatusEvent,
};

/// Copy of an open thread as handed to UI consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshot {
    pub counterpart_id: String,
    pub messages: Vec<ChatMessage>,
    pub counterpart_typing: bool,
}

/// Messages exchanged between the local user and one counterpart
#[derive(Debug, Clone)]
pub struct MessageThread {
    local_user_id: String,
    counterpart_id: String,
    messages: Vec<ChatMessage>,
    counterpart_typing: bool,
}

impl MessageThread {
    pub fn new(local_user_id: impl Into<String>, counterpart_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            counterpart_id: counterpart_id.into(),
            messages: Vec::new(),
            counterpart_typing: false,
        }
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_counterpart_typing(&self) -> bool {
        self.counterpart_typing
    }

    pub fn snapshot(&self) -> ThreadSnapshot {
        ThreadSnapshot {
            counterpart_id: self.counterpart_id.clone(),
            messages: self.messages.clone(),
            counterpart_typing: self.counterpart_typing,
        }
    }

    /// Replace the thread with a history batch, oldest first.
    ///
    /// A non-empty batch with nothing for this conversation is a late reply
    /// for a previously open thread and is ignored. Returns true when applied.
    pub fn apply_history(&mut self, event: MessageHistoryEvent) -> bool {
        let batch_len = event.messages.len();
        let mut messages: Vec<ChatMessage> = event
            .messages
            .into_iter()
            .filter(|m| m.is_between(&self.local_user_id, &self.counterpart_id))
            .collect();
        if batch_len > 0 && messages.is_empty() {
            debug!(counterpart = %self.counterpart_id, "History for another conversation, ignored");
            return false;
        }
        messages.sort_by_key(|m| m.created_at.unwrap_or_default());
        self.messages = messages;
        debug!(count = self.messages.len(), counterpart = %self.counterpart_id, "Loaded history");
        true
    }

    /// Append a live message if it belongs here. Returns true when the thread changed.
    pub fn apply_received(&mut self, event: ReceiveMessageEvent) -> bool {
        let message = event.message;
        if !message.is_between(&self.local_user_id, &self.counterpart_id) {
            return false;
        }
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        if message.sender_id == self.counterpart_id {
            self.counterpart_typing = false;
        }
        self.messages.push(message);
        true
    }

    pub fn apply_status(&mut self, event: &MessageStatusEvent) -> bool {
        match self.messages.iter_mut().find(|m| m.id == event.message_id) {
            Some(message) => {
                message.status = event.status;
                true
            }
            None => false,
        }
    }

    pub fn apply_typing(&mut self, event: &TypingStatusEvent) -> bool {
        if event.sender_id != self.counterpart_id {
            return false;
        }
        self.counterpart_typing = event.is_typing;
        true
    }

    /// Incoming messages not yet marked read
    pub fn unread_incoming(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages
            .iter()
            .filter(|m| m.sender_id == self.counterpart_id && m.status != MessageStatus::Read)
    }

    pub fn request_history<T: ChatTransport + ?Sized>(&self, transport: &T) -> Result<()> {
        transport.get_messages(&self.local_user_id, &self.counterpart_id)
    }

    /// Send a text message and announce it so both chat lists refresh
    pub fn send_text<T: ChatTransport + ?Sized>(&self, transport: &T, content: &str) -> Result<()> {
        transport.send_message(&self.local_user_id, &self.counterpart_id, content, None)?;
        transport.emit_message_sent(&self.local_user_id, &self.counterpart_id)
    }

    pub fn set_typing<T: ChatTransport + ?Sized>(&self, transport: &T, is_typing: bool) -> Result<()> {
        transport.emit_typing(&self.local_user_id, &self.counterpart_id, is_typing)
    }

    /// Report every unread incoming message as read. Returns how many were reported.
    pub fn mark_read<T: ChatTransport + ?Sized>(&mut self, transport: &T) -> Result<usize> {
        let ids: Vec<String> = self.unread_incoming().map(|m| m.id.clone()).collect();
        for id in &ids {
            transport.update_message_status(id, MessageStatus::Read)?;
            if let Some(message) = self.messages.iter_mut().find(|m| &m.id == id) {
                message.status = MessageStatus::Read;
            }
        }
        Ok(ids.len())
    }
}
