//! Client struct definition
//!
//! The hub-side view of a registered session: its id, display name and the
//! sending end of its outbound queue.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::DeliveryError;
use crate::message::Envelope;
use crate::types::SessionId;

/// Registered client as held by the hub
///
/// The hub holds the only sender of the outbound queue, so dropping a
/// `Client` closes that queue.
#[derive(Debug)]
pub struct Client {
    /// Session this client belongs to
    pub id: SessionId,
    /// Display name, for logging only
    pub display_name: String,
    /// Hub → session outbound queue
    outbound: mpsc::Sender<Envelope>,
}

impl Client {
    /// Create a new client with the given ID and outbound queue
    pub fn new(
        id: SessionId,
        display_name: impl Into<String>,
        outbound: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            outbound,
        }
    }

    /// Enqueue without waiting
    ///
    /// A full queue drops the message for this client only.
    pub fn try_deliver(&self, envelope: Envelope) -> Result<(), DeliveryError> {
        self.outbound.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn envelope(body: &str) -> Envelope {
        Envelope {
            name: "Alice".to_string(),
            body: body.to_string(),
            when: Utc::now(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn test_client_delivers_until_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let client = Client::new(SessionId::new(), "Alice", tx);

        assert_eq!(client.try_deliver(envelope("one")), Ok(()));
        assert_eq!(client.try_deliver(envelope("two")), Err(DeliveryError::Full));
        assert_eq!(rx.recv().await.unwrap().body, "one");
    }

    #[tokio::test]
    async fn test_client_closed_queue() {
        let (tx, rx) = mpsc::channel(4);
        let client = Client::new(SessionId::new(), "Alice", tx);
        drop(rx);

        assert_eq!(client.try_deliver(envelope("gone")), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_dropping_client_closes_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let client = Client::new(SessionId::new(), "Alice", tx);
        client.try_deliver(envelope("last")).unwrap();
        drop(client);

        assert_eq!(rx.recv().await.unwrap().body, "last");
        assert!(rx.recv().await.is_none());
    }
}
