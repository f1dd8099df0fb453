//! Real-time chat client for the BookBack marketplace.
//!
//! [`websocket::SocketClient`] owns the live connection to the chat server,
//! [`reconciler::ChatListReconciler`] keeps the conversation list in step with
//! pushed events, and [`service`] runs the two together on one task.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod reconciler;
pub mod service;
pub mod thread;
pub mod websocket;

pub use api::{ChatListSource, HttpChatApi};
pub use config::ChatConfig;
pub use error::{ChatError, Result};
pub use reconciler::{ChatListReconciler, ChatListSnapshot, Notice};
pub use service::ChatListHandle;
pub use thread::{MessageThread, ThreadSnapshot};
pub use websocket::{ChatTransport, SocketClient};
