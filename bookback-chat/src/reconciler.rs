//! Local view of "my conversations".
//!
//! Merges the pulled chat list with pushed events. All methods are
//! synchronous; the owning task serializes calls.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{ChatError, Result};
use crate::models::{ChatListResponse, ConversationPreview};
use crate::thread::ThreadSnapshot;
use crate::websocket::{MessageSentEvent, NewChatEvent, ReceiveMessageEvent};

/// Informational, non-error message for the list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Notice {
    NoChats,
}

/// What the owner should do after an event has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Followup {
    Nothing,
    Refetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// First load; failures clear the list
    Initial,
    /// Reload after an invalidating event; failures keep the current list
    Refresh,
}

/// Immutable copy of the list state handed to UI consumers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatListSnapshot {
    pub previews: Vec<ConversationPreview>,
    pub unread: HashSet<String>,
    pub notice: Option<Notice>,
    pub loading: bool,
    pub open_conversation: Option<String>,
    /// The open conversation's messages, filled in by the service
    pub thread: Option<ThreadSnapshot>,
}

impl ChatListSnapshot {
    pub fn is_unread(&self, user_id: &str) -> bool {
        self.unread.contains(user_id)
    }
}

pub struct ChatListReconciler {
    local_user_id: String,
    previews: Vec<ConversationPreview>,
    unread: HashSet<String>,
    open_conversation: Option<String>,
    notice: Option<Notice>,
}

impl ChatListReconciler {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            previews: Vec::new(),
            unread: HashSet::new(),
            open_conversation: None,
            notice: None,
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn previews(&self) -> &[ConversationPreview] {
        &self.previews
    }

    pub fn unread(&self) -> &HashSet<String> {
        &self.unread
    }

    pub fn is_unread(&self, user_id: &str) -> bool {
        self.unread.contains(user_id)
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice
    }

    pub fn open_conversation(&self) -> Option<&str> {
        self.open_conversation.as_deref()
    }

    pub fn snapshot(&self, loading: bool) -> ChatListSnapshot {
        ChatListSnapshot {
            previews: self.previews.clone(),
            unread: self.unread.clone(),
            notice: self.notice,
            loading,
            open_conversation: self.open_conversation.clone(),
            thread: None,
        }
    }

    /// Replace the list with a fetch result. Server order is kept as-is.
    pub fn apply_fetch(&mut self, result: Result<ChatListResponse>, kind: FetchKind) {
        match result {
            Ok(response) if response.success && !response.chat_list.is_empty() => {
                self.previews = response
                    .chat_list
                    .iter()
                    .map(|chat| ConversationPreview::from_raw(chat, &self.local_user_id))
                    .collect();
                self.dedupe();
                self.notice = None;
                debug!(count = self.previews.len(), "Chat list loaded");
            }
            Ok(_) => {
                info!("No chats found");
                self.previews.clear();
                self.notice = Some(Notice::NoChats);
            }
            Err(ChatError::MalformedResponse(reason)) => {
                info!(reason = %reason, "Chat list response unusable, showing empty list");
                self.previews.clear();
                self.notice = Some(Notice::NoChats);
            }
            Err(e) => match kind {
                FetchKind::Initial => {
                    error!(error = %e, "Failed to load chat list");
                    self.previews.clear();
                    self.notice = None;
                }
                FetchKind::Refresh => {
                    error!(error = %e, "Failed to refresh chat list, keeping current entries");
                }
            },
        }
    }

    /// Insert or overwrite the preview for the chat's counterpart and mark it unread
    pub fn handle_new_chat(&mut self, event: &NewChatEvent) {
        let preview = ConversationPreview::from_raw(&event.chat, &self.local_user_id);
        let user_id = preview.user_id.clone();

        match self.position(&user_id) {
            Some(index) => self.previews[index] = preview,
            None => self.previews.insert(0, preview),
        }
        self.sort();
        self.notice = None;
        self.unread.insert(user_id);
    }

    /// A message between the local user and someone else was sent.
    ///
    /// The event carries no text, so the list is invalidated instead of merged.
    pub fn handle_message_sent(&mut self, event: &MessageSentEvent) -> Followup {
        let Some(counterpart) = self.counterpart_of(&event.sender_id, &event.receiver_id) else {
            debug!(
                sender = %event.sender_id,
                receiver = %event.receiver_id,
                "Ignoring messageSent for another user"
            );
            return Followup::Nothing;
        };

        self.mark_unread(counterpart);
        Followup::Refetch
    }

    /// Merge a live message into the matching preview
    pub fn handle_receive_message(&mut self, event: &ReceiveMessageEvent) -> Followup {
        let message = &event.message;
        let Some(counterpart) = self.counterpart_of(&message.sender_id, &message.receiver_id)
        else {
            return Followup::Nothing;
        };

        match self.position(&counterpart) {
            Some(index) => {
                self.previews[index].merge_message(message);
                self.sort();
                // Only incoming messages are unseen
                if message.sender_id == counterpart {
                    self.mark_unread(counterpart);
                }
                Followup::Nothing
            }
            None => {
                if message.sender_id == counterpart {
                    self.mark_unread(counterpart);
                }
                Followup::Refetch
            }
        }
    }

    /// Open a conversation: clears its unread marker and returns its preview, if listed
    pub fn select_conversation(&mut self, user_id: &str) -> Option<ConversationPreview> {
        self.unread.remove(user_id);
        self.open_conversation = Some(user_id.to_string());
        self.position(user_id).map(|i| self.previews[i].clone())
    }

    pub fn close_conversation(&mut self) {
        self.open_conversation = None;
    }

    fn counterpart_of(&self, sender_id: &str, receiver_id: &str) -> Option<String> {
        if sender_id == self.local_user_id {
            Some(receiver_id.to_string())
        } else if receiver_id == self.local_user_id {
            Some(sender_id.to_string())
        } else {
            None
        }
    }

    fn mark_unread(&mut self, user_id: String) {
        if self.open_conversation.as_deref() == Some(user_id.as_str()) {
            return;
        }
        self.unread.insert(user_id);
    }

    fn position(&self, user_id: &str) -> Option<usize> {
        self.previews.iter().position(|p| p.user_id == user_id)
    }

    /// Most recent first; stable so equal timestamps keep their order
    fn sort(&mut self) {
        self.previews
            .sort_by_key(|p| std::cmp::Reverse(p.sort_key()));
    }

    /// Keep the first entry per counterpart if the server sent duplicates
    fn dedupe(&mut self) {
        let mut seen = HashSet::new();
        self.previews.retain(|p| seen.insert(p.user_id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatMessage, MessageStatus, MessageType, RawChat};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn raw_chat(a: &str, b: &str, name: &str, last: &str, time: Option<DateTime<Utc>>) -> RawChat {
        serde_json::from_value(json!({
            "userId1": { "_id": a },
            "userId2": { "_id": b, "Name": name },
            "last_message": last,
            "updated_at": time,
        }))
        .unwrap()
    }

    fn new_chat(other: &str, last: &str, time: Option<DateTime<Utc>>) -> NewChatEvent {
        NewChatEvent {
            chat: raw_chat("U1", other, &format!("name-{}", other), last, time),
        }
    }

    fn sent(sender: &str, receiver: &str) -> MessageSentEvent {
        MessageSentEvent {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
        }
    }

    fn received(sender: &str, receiver: &str, text: &str, time: DateTime<Utc>) -> ReceiveMessageEvent {
        ReceiveMessageEvent {
            chat_id: None,
            message: ChatMessage {
                id: format!("m-{}", time.timestamp()),
                sender_id: sender.to_string(),
                receiver_id: receiver.to_string(),
                content: Some(text.to_string()),
                media_url: None,
                message_type: MessageType::Text,
                status: MessageStatus::Sent,
                created_at: Some(time),
            },
        }
    }

    fn assert_sorted(rec: &ChatListReconciler) {
        for pair in rec.previews().windows(2) {
            assert!(pair[0].sort_key() >= pair[1].sort_key());
        }
    }

    fn assert_unique(rec: &ChatListReconciler) {
        let ids: HashSet<_> = rec.previews().iter().map(|p| &p.user_id).collect();
        assert_eq!(ids.len(), rec.previews().len());
    }

    #[test]
    fn test_new_chat_scenario() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&NewChatEvent {
            chat: raw_chat("U1", "U2", "Bob", "hi", Some(at(1))),
        });

        assert_eq!(rec.previews().len(), 1);
        let p = &rec.previews()[0];
        assert_eq!(p.user_id, "U2");
        assert_eq!(p.user_name, "Bob");
        assert_eq!(p.last_message.as_deref(), Some("hi"));
        assert_eq!(p.last_message_time, Some(at(1)));
        assert_eq!(rec.unread().len(), 1);
        assert!(rec.is_unread("U2"));

        rec.handle_new_chat(&NewChatEvent {
            chat: raw_chat("U1", "U2", "Bob", "hi again", Some(at(2))),
        });
        assert_eq!(rec.previews().len(), 1);
        assert_eq!(rec.previews()[0].last_message.as_deref(), Some("hi again"));
        assert_eq!(rec.previews()[0].last_message_time, Some(at(2)));
        assert_eq!(rec.unread().len(), 1);
    }

    #[test]
    fn test_new_chat_counterpart_when_local_user_is_second() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&NewChatEvent {
            chat: raw_chat("U3", "U1", "Me", "hello", Some(at(1))),
        });
        assert_eq!(rec.previews()[0].user_id, "U3");
    }

    #[test]
    fn test_new_counterpart_grows_list_by_one() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        rec.handle_new_chat(&new_chat("U3", "b", Some(at(2))));
        let before = rec.previews().len();
        rec.handle_new_chat(&new_chat("U4", "c", Some(at(3))));
        assert_eq!(rec.previews().len(), before + 1);
    }

    #[test]
    fn test_new_chat_sequences_stay_unique_and_sorted() {
        let ids = ["U2", "U3", "U4", "U5"];
        let mut rec = ChatListReconciler::new("U1");
        // Deterministic walk over ids and times, including missing timestamps
        for step in 0..64u32 {
            let other = ids[(step as usize * 7 + 3) % ids.len()];
            let time = if step % 5 == 0 {
                None
            } else {
                Some(at((step * 11) % 24))
            };
            rec.handle_new_chat(&new_chat(other, &format!("msg {}", step), time));
            assert_unique(&rec);
            assert_sorted(&rec);
        }
        assert_eq!(rec.previews().len(), ids.len());
    }

    #[test]
    fn test_missing_timestamp_sorts_last() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "no time", None));
        rec.handle_new_chat(&new_chat("U3", "timed", Some(at(5))));
        assert_eq!(rec.previews()[0].user_id, "U3");
        assert_eq!(rec.previews()[1].user_id, "U2");
    }

    #[test]
    fn test_message_sent_by_local_user_marks_receiver() {
        let mut rec = ChatListReconciler::new("U1");
        let follow = rec.handle_message_sent(&sent("U1", "U2"));
        assert_eq!(follow, Followup::Refetch);
        assert!(rec.is_unread("U2"));
    }

    #[test]
    fn test_message_sent_to_local_user_marks_sender() {
        let mut rec = ChatListReconciler::new("U1");
        let follow = rec.handle_message_sent(&sent("U3", "U1"));
        assert_eq!(follow, Followup::Refetch);
        assert!(rec.is_unread("U3"));
    }

    #[test]
    fn test_message_sent_for_other_users_is_ignored() {
        let mut rec = ChatListReconciler::new("U1");
        let follow = rec.handle_message_sent(&sent("U3", "U4"));
        assert_eq!(follow, Followup::Nothing);
        assert!(rec.unread().is_empty());
    }

    #[test]
    fn test_message_sent_in_open_conversation_is_not_unread() {
        let mut rec = ChatListReconciler::new("U1");
        let _ = rec.select_conversation("U2");
        let follow = rec.handle_message_sent(&sent("U2", "U1"));
        assert_eq!(follow, Followup::Refetch);
        assert!(!rec.is_unread("U2"));
    }

    #[test]
    fn test_select_clears_only_that_conversation() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        rec.handle_new_chat(&new_chat("U3", "b", Some(at(2))));
        assert!(rec.is_unread("U2") && rec.is_unread("U3"));

        let opened = rec.select_conversation("U2").unwrap();
        assert_eq!(opened.user_id, "U2");
        assert!(!rec.is_unread("U2"));
        assert!(rec.is_unread("U3"));
        assert_eq!(rec.open_conversation(), Some("U2"));

        rec.close_conversation();
        assert_eq!(rec.open_conversation(), None);
    }

    #[test]
    fn test_receive_message_merges_without_refetch() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "old", Some(at(1))));
        rec.handle_new_chat(&new_chat("U3", "newer", Some(at(2))));
        let _ = rec.select_conversation("U2");
        rec.close_conversation();

        let follow = rec.handle_receive_message(&received("U2", "U1", "fresh", at(3)));
        assert_eq!(follow, Followup::Nothing);
        assert_eq!(rec.previews()[0].user_id, "U2");
        assert_eq!(rec.previews()[0].last_message.as_deref(), Some("fresh"));
        assert!(rec.is_unread("U2"));
    }

    #[test]
    fn test_own_message_does_not_mark_unread() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "old", Some(at(1))));
        let _ = rec.select_conversation("U2");
        rec.close_conversation();

        let follow = rec.handle_receive_message(&received("U1", "U2", "mine", at(2)));
        assert_eq!(follow, Followup::Nothing);
        assert!(!rec.is_unread("U2"));
        assert_eq!(rec.previews()[0].last_message.as_deref(), Some("mine"));
    }

    #[test]
    fn test_receive_message_from_unknown_user_requests_refetch() {
        let mut rec = ChatListReconciler::new("U1");
        let follow = rec.handle_receive_message(&received("U9", "U1", "hey", at(1)));
        assert_eq!(follow, Followup::Refetch);
        assert!(rec.is_unread("U9"));
        assert!(rec.previews().is_empty());
    }

    #[test]
    fn test_initial_fetch_keeps_server_order() {
        let mut rec = ChatListReconciler::new("U1");
        let response = ChatListResponse {
            success: true,
            chat_list: vec![
                raw_chat("U1", "U2", "Bob", "older", Some(at(1))),
                raw_chat("U3", "U1", "Carol", "newer", Some(at(5))),
            ],
        };
        rec.apply_fetch(Ok(response), FetchKind::Initial);

        let ids: Vec<_> = rec.previews().iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(ids, vec!["U2", "U3"]);
        assert_eq!(rec.notice(), None);
    }

    #[test]
    fn test_empty_fetch_shows_notice() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        rec.apply_fetch(
            Ok(ChatListResponse {
                success: true,
                chat_list: vec![],
            }),
            FetchKind::Initial,
        );
        assert!(rec.previews().is_empty());
        assert_eq!(rec.notice(), Some(Notice::NoChats));
    }

    #[test]
    fn test_malformed_fetch_shows_notice() {
        let mut rec = ChatListReconciler::new("U1");
        rec.apply_fetch(
            Err(ChatError::MalformedResponse("expected value".to_string())),
            FetchKind::Initial,
        );
        assert!(rec.previews().is_empty());
        assert_eq!(rec.notice(), Some(Notice::NoChats));
    }

    #[test]
    fn test_failed_initial_fetch_clears_without_notice() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        rec.apply_fetch(
            Err(ChatError::Http("connection refused".to_string())),
            FetchKind::Initial,
        );
        assert!(rec.previews().is_empty());
        assert_eq!(rec.notice(), None);
    }

    #[test]
    fn test_failed_refresh_keeps_entries() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        rec.apply_fetch(
            Err(ChatError::Http("connection refused".to_string())),
            FetchKind::Refresh,
        );
        assert_eq!(rec.previews().len(), 1);
    }

    #[test]
    fn test_fetch_drops_duplicate_counterparts() {
        let mut rec = ChatListReconciler::new("U1");
        rec.apply_fetch(
            Ok(ChatListResponse {
                success: true,
                chat_list: vec![
                    raw_chat("U1", "U2", "Bob", "first", Some(at(3))),
                    raw_chat("U2", "U1", "Bob", "second", Some(at(1))),
                ],
            }),
            FetchKind::Initial,
        );
        assert_eq!(rec.previews().len(), 1);
        assert_eq!(rec.previews()[0].last_message.as_deref(), Some("first"));
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut rec = ChatListReconciler::new("U1");
        rec.handle_new_chat(&new_chat("U2", "a", Some(at(1))));
        let snap = rec.snapshot(true);
        assert!(snap.loading);
        assert!(snap.is_unread("U2"));
        assert_eq!(snap.previews.len(), 1);
    }
}
