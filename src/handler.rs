//! WebSocket connection handler
//!
//! Handles individual TCP connections: WebSocket handshake, identity
//! resolution from the `token` query parameter of the upgrade request,
//! then hands the connection to a session for its lifetime.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, info, warn};

use crate::connection::WsConnection;
use crate::error::AppError;
use crate::hub::HubHandle;
use crate::identity::IdentityResolver;
use crate::session::{self, SessionSummary};

/// Handle a new TCP connection
///
/// Returns `None` when the identity was rejected and no session was created.
pub async fn handle_connection(
    stream: TcpStream,
    hub: HubHandle,
    resolver: Arc<dyn IdentityResolver>,
    outbound_capacity: usize,
) -> Result<Option<SessionSummary>, AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, keeping the token from the request URI
    let mut token = None;
    let mut ws_stream = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            token = request.uri().query().and_then(query_token);
            Ok(response)
        },
    )
    .await?;

    let identity = match resolver.resolve(token.as_deref().unwrap_or_default()).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!("Rejected connection from {}: {}", peer_addr, e);
            let _ = ws_stream.close(None).await;
            return Ok(None);
        }
    };

    info!(
        "{} ({}) connected from {}",
        identity.display_name, identity.unique_id, peer_addr
    );

    let summary = session::accept(
        &hub,
        identity,
        WsConnection::new(ws_stream),
        outbound_capacity,
    )
    .await?;

    Ok(Some(summary))
}

/// Extract and URL-decode the `token` query parameter
///
/// `+` is read as a space, as in form-encoded queries.
fn query_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "token" {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|s| s.into_owned())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::time::{timeout, Duration};
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::hub::Hub;
    use crate::identity::{GuestResolver, StaticResolver};
    use crate::message::Envelope;

    const WAIT: Duration = Duration::from_secs(5);

    async fn serve(resolver: Arc<dyn IdentityResolver>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hub = Hub::spawn(16);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, hub.clone(), resolver.clone(), 8));
            }
        });
        format!("ws://{}/room", addr)
    }

    #[test]
    fn test_query_token() {
        assert_eq!(query_token("token=Alice"), Some("Alice".to_string()));
        assert_eq!(
            query_token("room=main&token=Al%20ice+B"),
            Some("Al ice B".to_string())
        );
        assert_eq!(query_token("room=main"), None);
        assert_eq!(query_token("token=caf%C3%A9"), Some("café".to_string()));
    }

    #[test]
    fn test_query_token_keeps_malformed_escapes() {
        // A sign after '%' is not a hex digit
        assert_eq!(query_token("token=a%+4b"), Some("a% 4b".to_string()));
        assert_eq!(query_token("token=a%-4b"), Some("a%-4b".to_string()));
        assert_eq!(query_token("token=100%"), Some("100%".to_string()));
        assert_eq!(query_token("token=%zz"), Some("%zz".to_string()));
        // Escapes that are not UTF-8 yield no token
        assert_eq!(query_token("token=%FF"), None);
    }

    /// Next envelope from the server, skipping control frames
    async fn next_envelope<S>(ws: &mut S) -> Envelope
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let frame = timeout(WAIT, ws.next()).await.unwrap().unwrap().unwrap();
            match frame {
                Message::Text(text) => return Envelope::decode(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let url = serve(Arc::new(GuestResolver::new())).await;
        let (mut alice, _) = tokio_tungstenite::connect_async(format!("{}?token=Alice", url))
            .await
            .unwrap();

        // Control frames are not messages
        alice.send(Message::Ping(vec![1, 2, 3].into())).await.unwrap();
        alice
            .send(Message::Text(r#"{"body":"hi"}"#.into()))
            .await
            .unwrap();
        // Binary frames carry the same JSON
        alice
            .send(Message::Binary(br#"{"body":"bin"}"#.to_vec().into()))
            .await
            .unwrap();

        let envelope = next_envelope(&mut alice).await;
        assert_eq!(envelope.name, "Alice");
        assert_eq!(envelope.body, "hi");

        let envelope = next_envelope(&mut alice).await;
        assert_eq!(envelope.name, "Alice");
        assert_eq!(envelope.body, "bin");
    }

    #[tokio::test]
    async fn test_rejected_identity_is_closed() {
        let url = serve(Arc::new(StaticResolver::new())).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("{}?token=nobody", url))
            .await
            .unwrap();

        let frame = timeout(WAIT, ws.next()).await.unwrap();
        assert!(matches!(frame, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
    }
}
