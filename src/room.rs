//! Room struct definition
//!
//! The membership set of the single chat room. Only the hub loop ever
//! touches a `Room`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::client::Client;
use crate::error::DeliveryError;
use crate::message::Envelope;
use crate::types::SessionId;

/// Per-broadcast delivery tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Enqueued on a member's outbound queue
    pub delivered: usize,
    /// Member queue was full
    pub dropped: usize,
    /// Member queue was already closed
    pub skipped: usize,
}

/// Group chat room
///
/// Membership only, no ordering among members.
#[derive(Debug, Default)]
pub struct Room {
    members: HashMap<SessionId, Client>,
}

impl Room {
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    /// Add a client. A second join with the same id replaces the first.
    pub fn join(&mut self, client: Client) {
        self.members.insert(client.id, client);
    }

    /// Remove a client if present
    ///
    /// Returns the removed client; dropping it closes its outbound queue.
    /// Removing an absent id is a no-op.
    pub fn leave(&mut self, id: SessionId) -> Option<Client> {
        self.members.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current member ids, in no particular order
    pub fn member_ids(&self) -> Vec<SessionId> {
        self.members.keys().copied().collect()
    }

    /// Offer a copy of the envelope to every current member
    ///
    /// Never waits: full queues drop the message for that member only.
    pub fn fan_out(&self, envelope: &Envelope) -> FanOut {
        let mut tally = FanOut::default();
        for client in self.members.values() {
            match client.try_deliver(envelope.clone()) {
                Ok(()) => tally.delivered += 1,
                Err(DeliveryError::Full) => {
                    warn!(
                        "Outbound queue full for {} ({}), message dropped",
                        client.display_name,
                        client.id
                    );
                    tally.dropped += 1;
                }
                Err(DeliveryError::Closed) => {
                    debug!("Outbound queue closed for {}, skipping", client.id);
                    tally.skipped += 1;
                }
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tokio::sync::mpsc;

    fn envelope(body: &str) -> Envelope {
        Envelope {
            name: "Alice".to_string(),
            body: body.to_string(),
            when: Utc::now(),
            avatar_url: None,
        }
    }

    fn client(capacity: usize) -> (Client, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Client::new(SessionId::new(), "test", tx), rx)
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new();
        assert!(room.is_empty());
        assert_eq!(room.len(), 0);
    }

    #[test]
    fn test_room_join_and_leave() {
        let mut room = Room::new();
        let (a, _rx_a) = client(4);
        let (b, _rx_b) = client(4);
        let (a_id, b_id) = (a.id, b.id);

        room.join(a);
        room.join(b);
        assert_eq!(room.len(), 2);

        assert!(room.leave(a_id).is_some());
        assert_eq!(room.member_ids(), vec![b_id]);

        // Leaving twice is a no-op
        assert!(room.leave(a_id).is_none());
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_room_fan_out_counts() {
        let mut room = Room::new();
        let (open, mut open_rx) = client(4);
        let (full, _full_rx) = client(1);
        let (closed, closed_rx) = client(4);
        full.try_deliver(envelope("filler")).unwrap();
        drop(closed_rx);

        room.join(open);
        room.join(full);
        room.join(closed);

        let tally = room.fan_out(&envelope("hello"));
        assert_eq!(
            tally,
            FanOut {
                delivered: 1,
                dropped: 1,
                skipped: 1
            }
        );
        assert_eq!(open_rx.try_recv().unwrap().body, "hello");
    }
}
