use std::sync::Arc;

use bookback_chat::{service, ChatConfig, ChatTransport, HttpChatApi, Notice, SocketClient};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ChatConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let user_id = match std::env::var("BOOKBACK_USER_ID") {
        Ok(id) if !id.is_empty() => id,
        _ => {
            error!("BOOKBACK_USER_ID must be set to the logged-in user's id");
            std::process::exit(1);
        }
    };

    let api = match HttpChatApi::new(&config) {
        Ok(api) => Arc::new(api),
        Err(e) => {
            error!("Failed to create chat API client: {}", e);
            std::process::exit(1);
        }
    };
    let transport = Arc::new(SocketClient::new(&config));
    transport.handlers().on_error(|e| warn!("Chat error: {}", e.message));

    let handle = service::spawn(transport.clone(), api, user_id.clone(), &config);
    let mut updates = handle.subscribe();

    info!(user_id = %user_id, "Watching conversations, press Ctrl+C to quit");

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                if snapshot.notice == Some(Notice::NoChats) {
                    println!("No chats yet");
                    continue;
                }
                println!("--- {} conversations ---", snapshot.previews.len());
                for preview in &snapshot.previews {
                    let marker = if snapshot.is_unread(&preview.user_id) { "*" } else { " " };
                    println!(
                        "{} {:<24} {}",
                        marker,
                        preview.user_name,
                        preview.last_message.as_deref().unwrap_or("")
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    transport.disconnect();
}
