//! Group Chat Relay Library
//!
//! A WebSocket relay where every connection shares one chat room, built
//! with tokio-tungstenite around a single-writer hub.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `Hub` is the only owner of room membership; sessions reach it through
//!   a cloneable `HubHandle`
//! - Each connection is a `Session` with an inbound pump (client → hub)
//!   and an outbound pump (hub → client)
//! - No locks needed - membership changes and fan-out are serialized by
//!   the hub's command loop
//!
//! # Backpressure
//! The hub never waits on a member: when a member's outbound queue is full
//! the message is dropped for that member and counted. Readers, on the
//! other hand, wait for room in the hub's command channel, so a busy hub
//! slows every sender down.
//!
//! # Timeouts
//! There are none. A client that goes silent without closing its transport
//! keeps its session until the transport fails.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{handle_connection, GuestResolver, Hub};
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     let hub = Hub::spawn(256);
//!     let resolver = Arc::new(GuestResolver::new());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         tokio::spawn(handle_connection(stream, hub.clone(), resolver.clone(), 32));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod hub;
pub mod identity;
pub mod message;
pub mod room;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::Client;
pub use config::ServerConfig;
pub use connection::{adapt, CloseHandle, Connection, MessageReader, MessageWriter, WsConnection};
pub use error::{AppError, ConfigError, ConnectionError, DeliveryError, HubError, IdentityError};
pub use handler::handle_connection;
pub use hub::{Hub, HubCommand, HubHandle, HubSnapshot};
pub use identity::{GuestResolver, IdentityResolver, StaticResolver};
pub use message::{Envelope, IncomingMessage};
pub use room::Room;
pub use session::{accept, Session, SessionEnd, SessionSummary};
pub use types::{Identity, SessionId};
