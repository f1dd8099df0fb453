//! Task that owns a [`ChatListReconciler`] and the open [`MessageThread`].
//!
//! Push events and user commands are funnelled into one task, so every
//! mutation of the list and the thread happens in arrival order. Each push is
//! offered to both, which lets a single transport handler per event serve the
//! list and the conversation view at once. Fetches are awaited on the
//! same task: events that arrive while a fetch is in flight are applied on top
//! of its result rather than being overwritten by it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::ChatListSource;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::reconciler::{ChatListReconciler, ChatListSnapshot, FetchKind, Followup};
use crate::thread::MessageThread;
use crate::websocket::{
    ChatTransport, MessageHistoryEvent, MessageSentEvent, MessageStatusEvent, NewChatEvent,
    ReceiveMessageEvent, TypingStatusEvent,
};

enum Push {
    NewChat(NewChatEvent),
    MessageSent(MessageSentEvent),
    ReceiveMessage(ReceiveMessageEvent),
    MessageHistory(MessageHistoryEvent),
    MessageStatus(MessageStatusEvent),
    Typing(TypingStatusEvent),
}

enum Command {
    Select(String),
    Close,
    SendText(String),
    SetTyping(bool),
    Refresh,
    Shutdown,
}

/// Handle to a running chat list service
pub struct ChatListHandle {
    snapshots: watch::Receiver<ChatListSnapshot>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl ChatListHandle {
    /// Latest published state
    pub fn snapshot(&self) -> ChatListSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that can await state changes independently of this handle
    pub fn subscribe(&self) -> watch::Receiver<ChatListSnapshot> {
        self.snapshots.clone()
    }

    /// Open a conversation: clear its unread marker and load its history.
    ///
    /// The thread shows up in [`ChatListSnapshot::thread`].
    pub fn select(&self, user_id: &str) -> Result<()> {
        self.send(Command::Select(user_id.to_string()))
    }

    pub fn close_conversation(&self) -> Result<()> {
        self.send(Command::Close)
    }

    /// Send a text message in the open conversation
    pub fn send_text(&self, content: &str) -> Result<()> {
        self.send(Command::SendText(content.to_string()))
    }

    pub fn set_typing(&self, is_typing: bool) -> Result<()> {
        self.send(Command::SetTyping(is_typing))
    }

    /// Reload the list right away
    pub fn refresh(&self) -> Result<()> {
        self.send(Command::Refresh)
    }

    /// Stop the service and wait for its task to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Chat list task ended abnormally");
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ChatError::ServiceClosed)
    }
}

/// Start the chat list service for `local_user_id`.
///
/// Installs the list and thread handlers on the transport, connects and registers, then
/// loads the initial list.
pub fn spawn<T, S>(
    transport: Arc<T>,
    source: Arc<S>,
    local_user_id: impl Into<String>,
    config: &ChatConfig,
) -> ChatListHandle
where
    T: ChatTransport + 'static,
    S: ChatListSource + 'static,
{
    let local_user_id = local_user_id.into();
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(ChatListSnapshot {
        loading: true,
        ..ChatListSnapshot::default()
    });

    install_handlers(transport.as_ref(), push_tx);

    transport.connect();
    if let Err(e) = transport.register(&local_user_id) {
        warn!(error = %e, "Failed to register with chat server");
    }

    let service = Service {
        transport,
        source,
        reconciler: ChatListReconciler::new(local_user_id),
        thread: None,
        snapshots: snapshot_tx,
        debounce: config.refetch_debounce,
    };
    let task = tokio::spawn(service.run(push_rx, command_rx));

    ChatListHandle {
        snapshots: snapshot_rx,
        commands: command_tx,
        task,
    }
}

fn install_handlers<T: ChatTransport + ?Sized>(transport: &T, push_tx: mpsc::UnboundedSender<Push>) {
    let handlers = transport.handlers();

    let tx = push_tx.clone();
    handlers.on_new_chat(move |event| {
        let _ = tx.send(Push::NewChat(event));
    });
    let tx = push_tx.clone();
    handlers.on_message_sent(move |event| {
        let _ = tx.send(Push::MessageSent(event));
    });
    let tx = push_tx.clone();
    handlers.on_receive_message(move |event| {
        let _ = tx.send(Push::ReceiveMessage(event));
    });
    let tx = push_tx.clone();
    handlers.on_message_history(move |event| {
        let _ = tx.send(Push::MessageHistory(event));
    });
    let tx = push_tx.clone();
    handlers.on_message_status_updated(move |event| {
        let _ = tx.send(Push::MessageStatus(event));
    });
    handlers.on_typing_status(move |event| {
        let _ = push_tx.send(Push::Typing(event));
    });
}

struct Service<T, S> {
    transport: Arc<T>,
    source: Arc<S>,
    reconciler: ChatListReconciler,
    thread: Option<MessageThread>,
    snapshots: watch::Sender<ChatListSnapshot>,
    debounce: Duration,
}

impl<T: ChatTransport, S: ChatListSource> Service<T, S> {
    async fn run(
        mut self,
        mut push_rx: mpsc::UnboundedReceiver<Push>,
        mut command_rx: mpsc::UnboundedReceiver<Command>,
    ) {
        self.fetch(FetchKind::Initial).await;

        let mut refetch_at: Option<Instant> = None;

        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(Command::Select(user_id)) => {
                            self.open_thread(&user_id);
                            self.publish(false);
                        }
                        Some(Command::Close) => {
                            self.reconciler.close_conversation();
                            self.thread = None;
                            self.publish(false);
                        }
                        Some(Command::SendText(content)) => self.send_text(&content),
                        Some(Command::SetTyping(is_typing)) => self.set_typing(is_typing),
                        Some(Command::Refresh) => {
                            refetch_at = None;
                            self.fetch(FetchKind::Refresh).await;
                        }
                        Some(Command::Shutdown) | None => {
                            info!("Chat list service stopping");
                            break;
                        }
                    }
                }
                Some(push) = push_rx.recv() => {
                    let followup = self.apply_push(push);
                    self.publish(false);

                    if followup == Followup::Refetch {
                        if refetch_at.is_none() {
                            refetch_at = Some(Instant::now() + self.debounce);
                        } else {
                            debug!("Re-fetch already scheduled, coalescing");
                        }
                    }
                }
                _ = tokio::time::sleep_until(refetch_at.unwrap_or_else(Instant::now)), if refetch_at.is_some() => {
                    refetch_at = None;
                    self.fetch(FetchKind::Refresh).await;
                }
            }
        }
    }

    /// Apply a pushed event to the list and, when it concerns it, the open thread
    fn apply_push(&mut self, push: Push) -> Followup {
        match push {
            Push::NewChat(event) => {
                self.reconciler.handle_new_chat(&event);
                Followup::Nothing
            }
            Push::MessageSent(event) => self.reconciler.handle_message_sent(&event),
            Push::ReceiveMessage(event) => {
                let followup = self.reconciler.handle_receive_message(&event);
                if let Some(thread) = self.thread.as_mut() {
                    if thread.apply_received(event) {
                        self.mark_thread_read();
                    }
                }
                followup
            }
            Push::MessageHistory(event) => {
                if let Some(thread) = self.thread.as_mut() {
                    if thread.apply_history(event) {
                        self.mark_thread_read();
                    }
                }
                Followup::Nothing
            }
            Push::MessageStatus(event) => {
                if let Some(thread) = self.thread.as_mut() {
                    thread.apply_status(&event);
                }
                Followup::Nothing
            }
            Push::Typing(event) => {
                if let Some(thread) = self.thread.as_mut() {
                    thread.apply_typing(&event);
                }
                Followup::Nothing
            }
        }
    }

    fn open_thread(&mut self, user_id: &str) {
        match self.reconciler.select_conversation(user_id) {
            Some(preview) => {
                info!(user = %preview.user_id, name = %preview.user_name, "Opened conversation")
            }
            None => info!(user = %user_id, "Opened conversation not in the list"),
        }
        let thread = MessageThread::new(self.reconciler.local_user_id(), user_id);
        if let Err(e) = thread.request_history(self.transport.as_ref()) {
            warn!(error = %e, "Failed to request message history");
        }
        self.thread = Some(thread);
    }

    fn send_text(&self, content: &str) {
        let Some(thread) = self.thread.as_ref() else {
            warn!("No conversation open, message not sent");
            return;
        };
        if let Err(e) = thread.send_text(self.transport.as_ref(), content) {
            warn!(error = %e, to = %thread.counterpart_id(), "Failed to send message");
        }
    }

    fn set_typing(&self, is_typing: bool) {
        if let Some(thread) = self.thread.as_ref() {
            if let Err(e) = thread.set_typing(self.transport.as_ref(), is_typing) {
                debug!(error = %e, "Failed to send typing status");
            }
        }
    }

    /// Report incoming messages in the open thread as read
    fn mark_thread_read(&mut self) {
        let Some(thread) = self.thread.as_mut() else {
            return;
        };
        match thread.mark_read(self.transport.as_ref()) {
            Ok(0) => {}
            Ok(count) => debug!(count, "Marked messages read"),
            Err(e) => warn!(error = %e, "Failed to mark messages read"),
        }
    }

    async fn fetch(&mut self, kind: FetchKind) {
        self.publish(true);
        let result = self
            .source
            .fetch_chat_list(self.reconciler.local_user_id())
            .await;
        self.reconciler.apply_fetch(result, kind);
        self.publish(false);
    }

    fn publish(&self, loading: bool) {
        let mut snapshot = self.reconciler.snapshot(loading);
        snapshot.thread = self.thread.as_ref().map(MessageThread::snapshot);
        self.snapshots.send_replace(snapshot);
    }
}
