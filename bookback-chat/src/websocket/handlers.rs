use std::sync::{Arc, Mutex};

use tracing::{debug, error, warn};

use super::events::{
    InboundEvent, MessageHistoryEvent, MessageSentEvent, MessageStatusEvent, NewChatEvent,
    ReceiveMessageEvent, ServerErrorEvent, TypingStatusEvent,
};

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A single replaceable handler. Setting a new one drops the previous.
struct Slot<T>(Mutex<Option<Handler<T>>>);

impl<T> Slot<T> {
    fn new() -> Self {
        Self(Mutex::new(None))
    }

    fn set(&self, handler: Handler<T>) {
        match self.0.lock() {
            Ok(mut guard) => *guard = Some(handler),
            Err(e) => error!("Handler slot poisoned: {}", e),
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = None;
        }
    }

    /// Returns false when no handler is installed
    fn call(&self, value: T) -> bool {
        // Clone out of the lock so a handler may replace itself
        let handler = match self.0.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        match handler {
            Some(h) => {
                h(value);
                true
            }
            None => false,
        }
    }
}

/// Handler registry for inbound events, one active handler per event
pub struct EventHandlers {
    new_chat: Slot<NewChatEvent>,
    message_sent: Slot<MessageSentEvent>,
    receive_message: Slot<ReceiveMessageEvent>,
    message_status_updated: Slot<MessageStatusEvent>,
    typing_status: Slot<TypingStatusEvent>,
    message_history: Slot<MessageHistoryEvent>,
    error: Slot<ServerErrorEvent>,
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self {
            new_chat: Slot::new(),
            message_sent: Slot::new(),
            receive_message: Slot::new(),
            message_status_updated: Slot::new(),
            typing_status: Slot::new(),
            message_history: Slot::new(),
            error: Slot::new(),
        }
    }

    pub fn on_new_chat(&self, handler: impl Fn(NewChatEvent) + Send + Sync + 'static) {
        self.new_chat.set(Arc::new(handler));
    }

    pub fn on_message_sent(&self, handler: impl Fn(MessageSentEvent) + Send + Sync + 'static) {
        self.message_sent.set(Arc::new(handler));
    }

    pub fn on_receive_message(
        &self,
        handler: impl Fn(ReceiveMessageEvent) + Send + Sync + 'static,
    ) {
        self.receive_message.set(Arc::new(handler));
    }

    pub fn on_message_status_updated(
        &self,
        handler: impl Fn(MessageStatusEvent) + Send + Sync + 'static,
    ) {
        self.message_status_updated.set(Arc::new(handler));
    }

    pub fn on_typing_status(&self, handler: impl Fn(TypingStatusEvent) + Send + Sync + 'static) {
        self.typing_status.set(Arc::new(handler));
    }

    pub fn on_message_history(
        &self,
        handler: impl Fn(MessageHistoryEvent) + Send + Sync + 'static,
    ) {
        self.message_history.set(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(ServerErrorEvent) + Send + Sync + 'static) {
        self.error.set(Arc::new(handler));
    }

    /// Remove every installed handler
    pub fn clear(&self) {
        self.new_chat.clear();
        self.message_sent.clear();
        self.receive_message.clear();
        self.message_status_updated.clear();
        self.typing_status.clear();
        self.message_history.clear();
        self.error.clear();
    }

    /// Route an event to its handler. Returns false if nobody was listening.
    pub fn dispatch(&self, event: InboundEvent) -> bool {
        let name = event.name();
        let handled = match event {
            InboundEvent::NewChat(e) => self.new_chat.call(e),
            InboundEvent::MessageSent(e) => self.message_sent.call(e),
            InboundEvent::ReceiveMessage(e) => self.receive_message.call(e),
            InboundEvent::MessageStatusUpdated(e) => self.message_status_updated.call(e),
            InboundEvent::TypingStatus(e) => self.typing_status.call(e),
            InboundEvent::MessageHistory(e) => self.message_history.call(e),
            InboundEvent::Error(e) => {
                warn!(message = %e.message, "Chat server reported an error");
                self.error.call(e)
            }
        };
        if !handled {
            debug!(event = name, "No handler installed, event dropped");
        }
        handled
    }

    /// Deliver an error raised by the client itself to the error handler.
    /// Unlike [`dispatch`](Self::dispatch) this is not attributed to the server.
    pub(crate) fn report_local_error(&self, message: String) -> bool {
        self.error.call(ServerErrorEvent { message })
    }

    /// Parse, validate and dispatch a raw text frame. Malformed frames are logged and dropped.
    pub fn dispatch_frame(&self, text: &str) -> bool {
        match InboundEvent::parse(text) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                let preview: String = text.chars().take(100).collect();
                warn!(error = %e, preview = %preview, "Dropping malformed event");
                false
            }
        }
    }
}
