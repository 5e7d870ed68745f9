//! Client session
//!
//! One session per accepted connection, driven by two pumps:
//! - the inbound pump reads client messages, stamps them with the sender's
//!   display name, avatar and the server time, and submits them to the hub
//! - the outbound pump drains the session's outbound queue onto the wire
//!
//! Either pump failing closes the adapter, which ends the other. There is
//! no timeout: a client that stays silent without dropping the transport
//! keeps its session until the transport itself fails.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::connection::{adapt, Connection, Inbound, MessageReader, MessageWriter, Outbound};
use crate::error::HubError;
use crate::hub::HubHandle;
use crate::message::Envelope;
use crate::types::{Identity, SessionId};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Transport closed or failed, or the outbound side gave up
    Closed,
    /// Client sent something that is not a message
    DecodeFailure,
    /// The hub stopped accepting commands
    HubUnavailable,
}

/// What a finished session did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    /// Messages read from the client and submitted to the hub
    pub received: u64,
    /// Messages written to the client
    pub sent: u64,
    pub end: SessionEnd,
}

/// Server-side state for one live connection, before it starts
pub struct Session<C> {
    id: SessionId,
    identity: Identity,
    connection: C,
    outbound_capacity: usize,
}

impl<C: Connection> Session<C> {
    pub fn new(identity: Identity, connection: C, outbound_capacity: usize) -> Self {
        Self {
            id: SessionId::new(),
            identity,
            connection,
            outbound_capacity,
        }
    }

    /// Join the hub, run both pumps to completion, then leave
    ///
    /// The join is submitted before either pump starts, and exactly one
    /// leave follows once the inbound pump exits. Fails only if the hub is
    /// already gone at join time.
    pub async fn run(self, hub: &HubHandle) -> Result<SessionSummary, HubError> {
        let Session {
            id,
            identity,
            connection,
            outbound_capacity,
        } = self;

        let (queue_tx, queue_rx) = mpsc::channel(outbound_capacity);
        let (mut inbound, mut outbound) = adapt(connection);

        let client = Client::new(id, identity.display_name.clone(), queue_tx);
        if let Err(e) = hub.join(client).await {
            outbound.close().await;
            return Err(e);
        }
        info!("Session {} started for {}", id, identity.display_name);

        let writer = tokio::spawn(outbound_pump(id, queue_rx, outbound));

        let (received, end) = inbound_pump(id, &identity, &mut inbound, hub).await;
        inbound.close();

        // A gone hub has already dropped our queue along with its room
        if hub.leave(id).await.is_err() {
            debug!("Hub gone before leave of {}", id);
        }

        let sent = match writer.await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("Outbound pump for {} failed: {}", id, e);
                0
            }
        };

        info!(
            "Session {} ended ({:?}), received {}, sent {}",
            id, end, received, sent
        );

        Ok(SessionSummary {
            id,
            received,
            sent,
            end,
        })
    }
}

/// Accept a connection for an already resolved identity
///
/// Runs on the calling task until the session ends.
pub async fn accept<C: Connection>(
    hub: &HubHandle,
    identity: Identity,
    connection: C,
    outbound_capacity: usize,
) -> Result<SessionSummary, HubError> {
    Session::new(identity, connection, outbound_capacity)
        .run(hub)
        .await
}

/// Read, stamp and submit messages until the connection fails
///
/// Submitting waits for room in the hub's command channel, so a busy hub
/// throttles every reader.
pub async fn inbound_pump<R: MessageReader>(
    id: SessionId,
    identity: &Identity,
    inbound: &mut Inbound<R>,
    hub: &HubHandle,
) -> (u64, SessionEnd) {
    let mut received = 0;
    loop {
        match inbound.receive().await {
            Ok(message) => {
                let envelope = message.stamp(identity, Utc::now());
                received += 1;
                if hub.broadcast(envelope).await.is_err() {
                    warn!("Hub unavailable, ending inbound pump for {}", id);
                    return (received, SessionEnd::HubUnavailable);
                }
            }
            Err(e) if e.is_decode() => {
                warn!("Invalid message from {}: {}", id, e);
                return (received, SessionEnd::DecodeFailure);
            }
            Err(e) => {
                debug!("Inbound pump for {} ended: {}", id, e);
                return (received, SessionEnd::Closed);
            }
        }
    }
}

/// Write queued envelopes until the queue closes or a send fails
///
/// Once the hub closes the queue, whatever is still buffered is written
/// before the pump exits. Always closes the adapter on the way out.
pub async fn outbound_pump<W: MessageWriter>(
    id: SessionId,
    mut queue: mpsc::Receiver<Envelope>,
    mut outbound: Outbound<W>,
) -> u64 {
    let mut sent = 0;
    while let Some(envelope) = queue.recv().await {
        if let Err(e) = outbound.send(&envelope).await {
            debug!("Send to {} failed: {}", id, e);
            break;
        }
        sent += 1;
    }
    outbound.close().await;
    debug!("Outbound pump for {} ended", id);
    sent
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::connection::memory::{self, MemoryPeer};
    use crate::hub::Hub;

    const WAIT: Duration = Duration::from_secs(5);

    fn start(hub: &HubHandle, identity: Identity) -> (JoinHandle<SessionSummary>, MemoryPeer) {
        let (conn, peer) = memory::pair();
        let hub = hub.clone();
        let task = tokio::spawn(async move { accept(&hub, identity, conn, 8).await.unwrap() });
        (task, peer)
    }

    async fn wait_for_members(hub: &HubHandle, count: usize) {
        timeout(WAIT, async {
            loop {
                if hub.snapshot().await.unwrap().members.len() == count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("member count not reached");
    }

    #[tokio::test]
    async fn test_message_reaches_every_member_with_server_stamp() {
        let hub = Hub::spawn(16);
        let alice = Identity::new("u-a", "Alice").with_avatar("https://a.example/a.png");
        let (task_a, mut peer_a) = start(&hub, alice);
        let (task_b, mut peer_b) = start(&hub, Identity::new("u-b", "Bob"));
        wait_for_members(&hub, 2).await;

        let before = Utc::now();
        peer_a.send_text(r#"{"body":"hello","name":"Mallory","when":"1999-01-01T00:00:00Z"}"#);

        for peer in [&mut peer_a, &mut peer_b] {
            let envelope = timeout(WAIT, peer.next_envelope()).await.unwrap().unwrap();
            assert_eq!(envelope.body, "hello");
            assert_eq!(envelope.name, "Alice");
            assert_eq!(envelope.avatar_url.as_deref(), Some("https://a.example/a.png"));
            assert!(envelope.when >= before);
            assert!(envelope.when <= Utc::now());
        }

        drop(peer_a);
        drop(peer_b);
        let summary_a = timeout(WAIT, task_a).await.unwrap().unwrap();
        let summary_b = timeout(WAIT, task_b).await.unwrap().unwrap();
        assert_eq!(summary_a.received, 1);
        assert_eq!(summary_a.end, SessionEnd::Closed);
        assert_eq!(summary_b.received, 0);
        wait_for_members(&hub, 0).await;
    }

    #[tokio::test]
    async fn test_decode_failure_ends_only_that_session() {
        let hub = Hub::spawn(16);
        let (task_a, peer_a) = start(&hub, Identity::new("u-a", "Alice"));
        let (_task_b, mut peer_b) = start(&hub, Identity::new("u-b", "Bob"));
        wait_for_members(&hub, 2).await;

        peer_a.send_text("{broken");
        let summary = timeout(WAIT, task_a).await.unwrap().unwrap();
        assert_eq!(summary.end, SessionEnd::DecodeFailure);
        assert_eq!(peer_a.shutdowns(), 1);
        wait_for_members(&hub, 1).await;

        // Bob's session and the hub carry on
        peer_b.send_body("still up");
        let envelope = timeout(WAIT, peer_b.next_envelope()).await.unwrap().unwrap();
        assert_eq!(envelope.body, "still up");
        assert_eq!(envelope.name, "Bob");
    }

    #[tokio::test]
    async fn test_send_failure_ends_session_and_leaves() {
        let hub = Hub::spawn(16);
        let (task_a, peer_a) = start(&hub, Identity::new("u-a", "Alice"));
        let (_task_b, peer_b) = start(&hub, Identity::new("u-b", "Bob"));
        wait_for_members(&hub, 2).await;

        // Alice stops reading; her next write fails
        drop(peer_a.from_server);
        peer_b.send_body("ping");

        let summary = timeout(WAIT, task_a).await.unwrap().unwrap();
        assert_eq!(summary.end, SessionEnd::Closed);
        assert_eq!(summary.sent, 0);
        wait_for_members(&hub, 1).await;
        drop(peer_a.to_server);
    }

    #[tokio::test]
    async fn test_outbound_pump_drains_after_queue_closed() {
        let (conn, mut peer) = memory::pair();
        let (_inbound, outbound) = adapt(conn);
        let (tx, rx) = mpsc::channel(4);
        for body in ["one", "two", "three"] {
            tx.send(Envelope {
                name: "Alice".to_string(),
                body: body.to_string(),
                when: Utc::now(),
                avatar_url: None,
            })
            .await
            .unwrap();
        }
        drop(tx);

        let sent = outbound_pump(SessionId::new(), rx, outbound).await;
        assert_eq!(sent, 3);
        for body in ["one", "two", "three"] {
            assert_eq!(peer.next_envelope().await.unwrap().body, body);
        }
        assert_eq!(peer.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_accept_fails_without_hub() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let hub = HubHandle::new(sender);
        let (conn, peer) = memory::pair();

        let result = accept(&hub, Identity::new("u-a", "Alice"), conn, 8).await;
        assert!(matches!(result, Err(HubError::Unavailable)));
        assert_eq!(peer.shutdowns(), 1);
    }
}
