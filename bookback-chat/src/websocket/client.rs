use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::events::OutboundEvent;
use super::handlers::EventHandlers;
use super::ChatTransport;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};

/// Internal message type for the write channel
enum WriteMessage {
    Data(String),
    Close,
}

/// State of one `connect()` cycle, shared between the client and its connection task.
///
/// A fresh link is created on every `connect()` so a task that is still winding
/// down after `disconnect()` can never touch the next cycle's state.
struct Link {
    write_tx: StdMutex<Option<mpsc::UnboundedSender<WriteMessage>>>,
    connected: AtomicBool,
    /// Identity announced on the current socket, reset on every drop
    announced: StdMutex<Option<String>>,
}

impl Link {
    fn new() -> Self {
        Self {
            write_tx: StdMutex::new(None),
            connected: AtomicBool::new(false),
            announced: StdMutex::new(None),
        }
    }

    fn send(&self, data: String) -> Result<()> {
        let guard = self.write_tx.lock().map_err(|_| ChatError::NotConnected)?;
        match guard.as_ref() {
            Some(tx) => tx
                .send(WriteMessage::Data(data))
                .map_err(|_| ChatError::NotConnected),
            None => Err(ChatError::NotConnected),
        }
    }

    /// Send `register` unless this socket already carries `user_id`
    fn announce(&self, user_id: &str) -> Result<bool> {
        let mut announced = self.announced.lock().map_err(|_| ChatError::NotConnected)?;
        if announced.as_deref() == Some(user_id) {
            return Ok(false);
        }
        let frame = OutboundEvent::Register {
            user_id: user_id.to_string(),
        }
        .to_frame()?;
        self.send(frame)?;
        *announced = Some(user_id.to_string());
        info!(user_id = %user_id, "Registered with chat server");
        Ok(true)
    }

    fn install(&self, tx: mpsc::UnboundedSender<WriteMessage>) {
        if let Ok(mut guard) = self.write_tx.lock() {
            *guard = Some(tx);
        }
        self.connected.store(true, Ordering::SeqCst);
    }

    fn reset(&self) {
        if let Ok(mut guard) = self.write_tx.lock() {
            *guard = None;
        }
        if let Ok(mut announced) = self.announced.lock() {
            *announced = None;
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn close(&self) {
        if let Ok(guard) = self.write_tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(WriteMessage::Close);
            }
        }
    }
}

/// WebSocket client for the BookBack chat server.
///
/// Owns one live connection at a time, reconnects with a bounded number of
/// attempts, and re-announces the registered user on every new socket.
pub struct SocketClient {
    server_url: String,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    identity: Arc<StdMutex<Option<String>>>,
    handlers: Arc<EventHandlers>,
    link: Arc<StdMutex<Option<Arc<Link>>>>,
    shutdown_tx: StdMutex<Option<broadcast::Sender<()>>>,
}

impl SocketClient {
    pub fn new(config: &ChatConfig) -> Self {
        info!(url = %config.socket_url, "Using chat server URL");
        Self {
            server_url: config.socket_url.clone(),
            reconnect_attempts: config.reconnect_attempts,
            reconnect_delay: config.reconnect_delay,
            identity: Arc::new(StdMutex::new(None)),
            handlers: Arc::new(EventHandlers::new()),
            link: Arc::new(StdMutex::new(None)),
            shutdown_tx: StdMutex::new(None),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// True between `connect()` and `disconnect()` (or giving up on reconnection)
    pub fn is_initialized(&self) -> bool {
        self.link.lock().map(|l| l.is_some()).unwrap_or(false)
    }

    /// True while a socket is open
    pub fn is_connected(&self) -> bool {
        self.current_link()
            .map(|l| l.connected.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// The identity last passed to `register`
    pub fn registered_user(&self) -> Option<String> {
        self.identity.lock().ok().and_then(|id| id.clone())
    }

    fn current_link(&self) -> Option<Arc<Link>> {
        self.link.lock().ok().and_then(|l| l.clone())
    }

    fn send_frame(&self, event: OutboundEvent) -> Result<()> {
        let json = event.to_frame()?;
        let preview: String = json.chars().take(100).collect();
        debug!(preview = %preview, "Sending event to server");

        match self.current_link() {
            Some(link) => link.send(json).inspect_err(|_| {
                warn!("Cannot send event: not connected to server");
            }),
            None => {
                warn!("Cannot send event: client not started");
                Err(ChatError::NotConnected)
            }
        }
    }
}

impl ChatTransport for SocketClient {
    fn connect(&self) {
        let link = {
            let mut slot = match self.link.lock() {
                Ok(slot) => slot,
                Err(e) => {
                    error!("Connection state poisoned: {}", e);
                    return;
                }
            };
            if slot.is_some() {
                debug!("Already connected, ignoring connect()");
                return;
            }
            let link = Arc::new(Link::new());
            *slot = Some(link.clone());
            link
        };

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        if let Ok(mut guard) = self.shutdown_tx.lock() {
            *guard = Some(shutdown_tx);
        }

        let task = ConnectionTask {
            server_url: self.server_url.clone(),
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: self.reconnect_delay,
            identity: self.identity.clone(),
            handlers: self.handlers.clone(),
            slot: self.link.clone(),
            link,
        };
        tokio::spawn(task.run(shutdown_rx));
    }

    fn disconnect(&self) {
        info!("Initiating graceful disconnect");
        let link = self.link.lock().ok().and_then(|mut l| l.take());
        if let Some(link) = link {
            link.close();
        }
        // Dropping the sender also wakes a task sleeping between attempts
        if let Ok(mut guard) = self.shutdown_tx.lock() {
            if let Some(tx) = guard.take() {
                let _ = tx.send(());
            }
        }
    }

    fn register(&self, user_id: &str) -> Result<()> {
        if let Ok(mut identity) = self.identity.lock() {
            *identity = Some(user_id.to_string());
        }
        match self.current_link() {
            Some(link) if link.connected.load(Ordering::SeqCst) => {
                link.announce(user_id)?;
            }
            _ => debug!(user_id = %user_id, "Not connected yet, will register on connect"),
        }
        Ok(())
    }

    fn emit(&self, event: OutboundEvent) -> Result<()> {
        self.send_frame(event)
    }

    fn handlers(&self) -> &EventHandlers {
        &self.handlers
    }
}

/// Background task driving one `connect()` cycle, including reconnects
struct ConnectionTask {
    server_url: String,
    reconnect_attempts: u32,
    reconnect_delay: Duration,
    identity: Arc<StdMutex<Option<String>>>,
    handlers: Arc<EventHandlers>,
    slot: Arc<StdMutex<Option<Arc<Link>>>>,
    link: Arc<Link>,
}

impl ConnectionTask {
    async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut retries = 0u32;

        loop {
            if !matches!(
                shutdown_rx.try_recv(),
                Err(broadcast::error::TryRecvError::Empty)
            ) {
                info!("Shutdown signal received, stopping reconnection");
                break;
            }

            info!(url = %self.server_url, "Connecting to chat server");

            match connect_async(&self.server_url).await {
                Ok((ws_stream, _)) => {
                    info!("Connected to chat server");
                    retries = 0;

                    let (mut ws_write, mut ws_read) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<WriteMessage>();
                    self.link.install(tx);

                    // Re-announce on every socket so the server can route to this one
                    let identity = self.identity.lock().ok().and_then(|id| id.clone());
                    if let Some(user_id) = identity {
                        if let Err(e) = self.link.announce(&user_id) {
                            error!(error = %e, "Failed to queue register event");
                        }
                    }

                    let mut should_reconnect = true;
                    loop {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                info!("Shutdown signal received, closing connection gracefully");
                                if let Err(e) = ws_write.send(Message::Close(None)).await {
                                    warn!(error = %e, "Failed to send close frame");
                                }
                                should_reconnect = false;
                                break;
                            }
                            Some(msg) = rx.recv() => {
                                match msg {
                                    WriteMessage::Data(data) => {
                                        if ws_write.send(Message::Text(data)).await.is_err() {
                                            error!("Failed to send event to server");
                                            break;
                                        }
                                    }
                                    WriteMessage::Close => {
                                        info!("Close requested, sending close frame");
                                        if let Err(e) = ws_write.send(Message::Close(None)).await {
                                            warn!(error = %e, "Failed to send close frame");
                                        }
                                        should_reconnect = false;
                                        break;
                                    }
                                }
                            }
                            msg = ws_read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        self.handlers.dispatch_frame(&text);
                                    }
                                    Some(Ok(Message::Close(_))) | None => {
                                        info!("Server closed connection");
                                        break;
                                    }
                                    Some(Err(e)) => {
                                        error!(error = %e, "WebSocket error");
                                        break;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }

                    self.link.reset();
                    info!("Disconnected from chat server");

                    if !should_reconnect {
                        break;
                    }
                }
                Err(e) => {
                    error!(error = %e, url = %self.server_url, "Failed to connect to chat server");
                }
            }

            if retries >= self.reconnect_attempts {
                error!(
                    attempts = self.reconnect_attempts,
                    "Giving up on chat server after repeated failures"
                );
                self.release();
                self.handlers.report_local_error(format!(
                    "Unable to reach chat server after {} attempts",
                    self.reconnect_attempts
                ));
                return;
            }
            retries += 1;

            debug!(
                attempt = retries,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping reconnection");
                    break;
                }
            }
        }

        self.release();
    }

    /// Clear the client's link if it is still ours, so `connect()` may start over
    fn release(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.as_ref().is_some_and(|l| Arc::ptr_eq(l, &self.link)) {
                *slot = None;
            }
        }
    }
}
