//! Message protocol definitions
//!
//! JSON messages exchanged over the connection. Clients send an
//! `IncomingMessage` carrying only a body; the server stamps it into an
//! immutable `Envelope` and broadcasts that to every member of the room.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Identity;

/// Client → Server message
///
/// Only `body` is read. Any `name`, `when` or `avatarURL` a client sends is
/// ignored since those are assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    pub body: String,
}

impl IncomingMessage {
    /// Decode a client payload from JSON text
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Decode a client payload from raw JSON bytes (binary frames)
    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Stamp this message with the sender identity and the server time
    pub fn stamp(self, sender: &Identity, when: DateTime<Utc>) -> Envelope {
        Envelope {
            name: sender.display_name.clone(),
            body: self.body,
            when,
            avatar_url: sender.avatar_url.clone(),
        }
    }
}

/// Server → Client message
///
/// Immutable once constructed. Carries no session reference: after
/// broadcast it is a plain value cloned into each member's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender display name
    pub name: String,
    /// Message text
    pub body: String,
    /// Server-assigned timestamp
    pub when: DateTime<Utc>,
    /// Sender avatar, omitted from the wire when absent
    #[serde(
        rename = "avatarURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub avatar_url: Option<String>,
}

impl Envelope {
    /// Encode as a JSON text frame
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
