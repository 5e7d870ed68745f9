//! Group chat relay - Entry Point
//!
//! Starts the TCP listener and the Hub actor, accepting connections.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chat_relay::{handle_connection, GuestResolver, Hub, IdentityResolver, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Bind address from command line or environment, capacities from environment
    let config = ServerConfig::from_env()?;

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat relay listening on {}", config.addr);

    // Start the Hub actor
    let hub = Hub::spawn(config.command_capacity);
    let resolver: Arc<dyn IdentityResolver> = Arc::new(GuestResolver::new());

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let hub = hub.clone();
                let resolver = resolver.clone();
                let outbound_capacity = config.outbound_capacity;

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) =
                        handle_connection(stream, hub, resolver, outbound_capacity).await
                    {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
