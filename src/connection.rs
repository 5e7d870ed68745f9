//! Connection adapter
//!
//! Wraps one bidirectional, message-oriented connection and exposes
//! blocking `receive`/`send` of discrete messages. A connection is split
//! into an [`Inbound`] half for the inbound pump and an [`Outbound`] half
//! for the outbound pump. Both halves share a [`CloseHandle`], so closing
//! from either pump unblocks the other and a second close is a no-op.
//!
//! There are no retries at this layer. Any error ends the owning session.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;

use crate::error::ConnectionError;
use crate::message::{Envelope, IncomingMessage};

/// Receiving side of a connection
#[async_trait]
pub trait MessageReader: Send + 'static {
    /// Wait for the next client message.
    ///
    /// Malformed payloads surface as [`ConnectionError::Decode`], distinct
    /// from [`ConnectionError::Closed`].
    async fn receive(&mut self) -> Result<IncomingMessage, ConnectionError>;
}

/// Sending side of a connection
#[async_trait]
pub trait MessageWriter: Send + 'static {
    async fn send(&mut self, envelope: &Envelope) -> Result<(), ConnectionError>;

    /// Tell the peer we are done. Called at most once by [`Outbound::close`].
    async fn shutdown(&mut self);
}

/// A connection that can be split into independent reader and writer halves
pub trait Connection: Send + 'static {
    type Reader: MessageReader;
    type Writer: MessageWriter;

    fn split(self) -> (Self::Reader, Self::Writer);
}

/// Shared, idempotent close signal for both halves of one connection
#[derive(Debug, Clone)]
pub struct CloseHandle {
    state: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Mark the connection closed.
    ///
    /// Returns true only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.state.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for CloseHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a connection into adapter halves sharing one close signal
pub fn adapt<C: Connection>(connection: C) -> (Inbound<C::Reader>, Outbound<C::Writer>) {
    let (reader, writer) = connection.split();
    let close = CloseHandle::new();
    (
        Inbound {
            reader,
            close: close.clone(),
        },
        Outbound {
            writer,
            close,
            shut_down: false,
        },
    )
}

/// Inbound half, driven by the inbound pump
pub struct Inbound<R> {
    reader: R,
    close: CloseHandle,
}

impl<R: MessageReader> Inbound<R> {
    /// Receive the next message, or fail once the adapter is closed
    pub async fn receive(&mut self) -> Result<IncomingMessage, ConnectionError> {
        if self.close.is_closed() {
            return Err(ConnectionError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.close.closed() => Err(ConnectionError::Closed),
            result = self.reader.receive() => result,
        }
    }

    /// Close the adapter. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        self.close.close()
    }
}

/// Outbound half, driven by the outbound pump
pub struct Outbound<W> {
    writer: W,
    close: CloseHandle,
    shut_down: bool,
}

impl<W: MessageWriter> Outbound<W> {
    /// Send one envelope, or fail once the adapter is closed
    pub async fn send(&mut self, envelope: &Envelope) -> Result<(), ConnectionError> {
        if self.close.is_closed() {
            return Err(ConnectionError::Closed);
        }
        tokio::select! {
            biased;
            _ = self.close.closed() => Err(ConnectionError::Closed),
            result = self.writer.send(envelope) => result,
        }
    }

    /// Close the adapter and shut the writer down exactly once
    pub async fn close(&mut self) {
        self.close.close();
        if !self.shut_down {
            self.shut_down = true;
            self.writer.shutdown().await;
        }
    }
}

/// WebSocket connection over any async byte stream
pub struct WsConnection<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsConnection<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

impl<S> Connection for WsConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WsReader<S>;
    type Writer = WsWriter<S>;

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.stream.split();
        (WsReader { stream }, WsWriter { sink })
    }
}

pub struct WsReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

#[async_trait]
impl<S> MessageReader for WsReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn receive(&mut self) -> Result<IncomingMessage, ConnectionError> {
        while let Some(frame) = self.stream.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Err(ConnectionError::Closed);
                }
                Err(e) => return Err(e.into()),
            };
            match frame {
                Message::Text(text) => return Ok(IncomingMessage::decode(&text)?),
                Message::Binary(bytes) => return Ok(IncomingMessage::decode_bytes(&bytes)?),
                Message::Close(_) => return Err(ConnectionError::Closed),
                // Pong replies are queued by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
        Err(ConnectionError::Closed)
    }
}

pub struct WsWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> MessageWriter for WsWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, envelope: &Envelope) -> Result<(), ConnectionError> {
        let json = envelope.encode()?;
        match self.sink.send(Message::Text(json.into())).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Err(ConnectionError::Closed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn shutdown(&mut self) {
        // Sends a close frame
        let _ = self.sink.close().await;
    }
}

/// In-process connection
///
/// Text goes in and out as JSON strings, exactly as it would on a socket,
/// so malformed payloads exercise the real decode path.
pub mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Connection, MessageReader, MessageWriter};
    use crate::error::ConnectionError;
    use crate::message::{Envelope, IncomingMessage};

    /// Server side of an in-memory connection
    pub struct MemoryConnection {
        inbound: mpsc::UnboundedReceiver<String>,
        outbound: mpsc::UnboundedSender<String>,
        shutdowns: Arc<AtomicUsize>,
    }

    /// Client side of an in-memory connection
    ///
    /// Dropping `to_server` ends the server's reads; dropping `from_server`
    /// makes the server's sends fail.
    pub struct MemoryPeer {
        pub to_server: mpsc::UnboundedSender<String>,
        pub from_server: mpsc::UnboundedReceiver<String>,
        shutdowns: Arc<AtomicUsize>,
    }

    /// Create a connected server/client pair
    pub fn pair() -> (MemoryConnection, MemoryPeer) {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let shutdowns = Arc::new(AtomicUsize::new(0));
        (
            MemoryConnection {
                inbound,
                outbound,
                shutdowns: shutdowns.clone(),
            },
            MemoryPeer {
                to_server,
                from_server,
                shutdowns,
            },
        )
    }

    impl MemoryPeer {
        /// Send raw text as the client would put it on the wire
        pub fn send_text(&self, text: impl Into<String>) -> bool {
            self.to_server.send(text.into()).is_ok()
        }

        /// Send a well-formed chat message
        pub fn send_body(&self, body: &str) -> bool {
            self.send_text(serde_json::json!({ "body": body }).to_string())
        }

        /// Next envelope written by the server, None once the writer is gone
        pub async fn next_envelope(&mut self) -> Option<Envelope> {
            let text = self.from_server.recv().await?;
            Envelope::decode(&text).ok()
        }

        /// How many times the server shut its writer down
        pub fn shutdowns(&self) -> usize {
            self.shutdowns.load(Ordering::SeqCst)
        }
    }

    impl Connection for MemoryConnection {
        type Reader = MemoryReader;
        type Writer = MemoryWriter;

        fn split(self) -> (Self::Reader, Self::Writer) {
            (
                MemoryReader {
                    inbound: self.inbound,
                },
                MemoryWriter {
                    outbound: self.outbound,
                    shutdowns: self.shutdowns,
                },
            )
        }
    }

    pub struct MemoryReader {
        inbound: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl MessageReader for MemoryReader {
        async fn receive(&mut self) -> Result<IncomingMessage, ConnectionError> {
            match self.inbound.recv().await {
                Some(text) => Ok(IncomingMessage::decode(&text)?),
                None => Err(ConnectionError::Closed),
            }
        }
    }

    pub struct MemoryWriter {
        outbound: mpsc::UnboundedSender<String>,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageWriter for MemoryWriter {
        async fn send(&mut self, envelope: &Envelope) -> Result<(), ConnectionError> {
            let json = envelope.encode()?;
            self.outbound
                .send(json)
                .map_err(|_| ConnectionError::Closed)
        }

        async fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }
}
