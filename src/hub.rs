//! Hub actor implementation
//!
//! The single authority over room membership and message fan-out. All
//! state lives inside the `Hub` and is touched only by its own loop; other
//! tasks reach it through a `HubHandle`, which submits commands over one
//! bounded FIFO channel. The loop processes exactly one command at a time,
//! so a broadcast never observes a half-applied join or leave.
//!
//! Broadcasts never wait on a member: a full outbound queue drops the
//! message for that member and bumps the `dropped` counter.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::Client;
use crate::error::HubError;
use crate::message::Envelope;
use crate::room::Room;
use crate::types::SessionId;

/// Commands sent from sessions to the Hub actor
#[derive(Debug)]
pub enum HubCommand {
    /// Register a session's outbound queue
    Join { client: Client },
    /// Unregister a session and close its outbound queue
    Leave { id: SessionId },
    /// Fan an envelope out to every current member
    Broadcast { envelope: Envelope },
    /// Report membership and counters
    Snapshot { reply: oneshot::Sender<HubSnapshot> },
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    /// Current members, in no particular order
    pub members: Vec<SessionId>,
    /// Broadcast commands processed
    pub broadcasts: u64,
    /// Envelopes enqueued across all members
    pub delivered: u64,
    /// Envelopes dropped because a member's queue was full
    pub dropped: u64,
}

/// The Hub actor
///
/// Runs until every `HubHandle` has been dropped. Per-session failures
/// never stop it.
pub struct Hub {
    room: Room,
    broadcasts: u64,
    delivered: u64,
    dropped: u64,
    /// Command receiver channel
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Create a new Hub with the given command receiver
    pub fn new(receiver: mpsc::Receiver<HubCommand>) -> Self {
        Self {
            room: Room::new(),
            broadcasts: 0,
            delivered: 0,
            dropped: 0,
            receiver,
        }
    }

    /// Create the command channel, spawn the loop and return its handle
    pub fn spawn(command_capacity: usize) -> HubHandle {
        let (sender, receiver) = mpsc::channel(command_capacity);
        tokio::spawn(Hub::new(receiver).run());
        HubHandle::new(sender)
    }

    /// Run the Hub event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("Hub started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Hub shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Join { client } => self.handle_join(client),
            HubCommand::Leave { id } => self.handle_leave(id),
            HubCommand::Broadcast { envelope } => self.handle_broadcast(envelope),
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_join(&mut self, client: Client) {
        info!(
            "{} joined ({}), members: {}",
            client.display_name,
            client.id,
            self.room.len() + 1
        );
        self.room.join(client);
    }

    fn handle_leave(&mut self, id: SessionId) {
        // Dropping the client closes its outbound queue
        match self.room.leave(id) {
            Some(client) => info!(
                "{} left ({}), members: {}",
                client.display_name,
                id,
                self.room.len()
            ),
            None => debug!("Leave for unknown session {}", id),
        }
    }

    fn handle_broadcast(&mut self, envelope: Envelope) {
        let tally = self.room.fan_out(&envelope);
        self.broadcasts += 1;
        self.delivered += tally.delivered as u64;
        self.dropped += tally.dropped as u64;
        debug!(
            "Message from {} sent to {} members ({} dropped, {} closed)",
            envelope.name, tally.delivered, tally.dropped, tally.skipped
        );
    }

    fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            members: self.room.member_ids(),
            broadcasts: self.broadcasts,
            delivered: self.delivered,
            dropped: self.dropped,
        }
    }
}

/// Submission side of the hub
///
/// Cheap to clone; every session holds one. Each call waits for room in the
/// command channel, which is where a slow hub pushes back on readers.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub fn new(sender: mpsc::Sender<HubCommand>) -> Self {
        Self { sender }
    }

    async fn submit(&self, cmd: HubCommand) -> Result<(), HubError> {
        self.sender.send(cmd).await.map_err(|_| HubError::Unavailable)
    }

    pub async fn join(&self, client: Client) -> Result<(), HubError> {
        self.submit(HubCommand::Join { client }).await
    }

    pub async fn leave(&self, id: SessionId) -> Result<(), HubError> {
        self.submit(HubCommand::Leave { id }).await
    }

    pub async fn broadcast(&self, envelope: Envelope) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast { envelope }).await
    }

    /// Ask the hub for its current state
    ///
    /// Answered after every command submitted before it.
    pub async fn snapshot(&self) -> Result<HubSnapshot, HubError> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| HubError::Unavailable)
    }
}
