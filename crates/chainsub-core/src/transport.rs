//! Transport adapter traits.
//!
//! The persistent pub/sub connection (socket handshake, keep-alive, framing,
//! per-channel replay) lives behind these traits. The subscription controller
//! only sequences calls on them and consumes the events they emit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::token::TokenProvider;

/// A publication delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub channel: String,
    pub data: Vec<u8>,
    /// Stream offset assigned by the broker, when it tracks one.
    pub offset: u64,
}

/// Connection-level events emitted by a transport client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connecting,
    Connected,
    Disconnected { reason: String },
    /// Non-fatal transport error.
    Error { message: String },
    /// Free-form server message.
    Message { data: Vec<u8> },
    ServerSubscribing { channel: String },
    ServerSubscribed { channel: String },
    ServerUnsubscribed { channel: String },
    Join { channel: String },
    Leave { channel: String },
    /// Publication on the shared connection, not bound to a channel subscription.
    ServerPublication(Publication),
}

pub type EventSender = mpsc::UnboundedSender<ClientEvent>;
pub type PublicationSender = mpsc::UnboundedSender<Publication>;

/// Everything a transport needs to build one client.
#[derive(Clone)]
pub struct ClientOptions {
    pub url: String,
    pub name: String,
    pub token: Option<String>,
    /// Called by the transport when the token expires mid-session.
    pub token_provider: Arc<dyn TokenProvider>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_server_ping_delay: Duration,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("url", &self.url)
            .field("name", &self.name)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("max_server_ping_delay", &self.max_server_ping_delay)
            .finish_non_exhaustive()
    }
}

/// Per-channel delivery options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionOptions {
    /// Ask the broker to replay publications missed during brief disconnects.
    pub recoverable: bool,
}

/// Factory for transport clients. One client is built per session attempt.
pub trait Transport: Send + Sync + 'static {
    /// Build an unconnected client. Lifecycle events and connection-level
    /// publications must be sent on `events`.
    fn client(
        &self,
        options: ClientOptions,
        events: EventSender,
    ) -> Result<Box<dyn TransportClient>, TransportError>;
}

/// One persistent connection.
#[async_trait]
pub trait TransportClient: Send {
    /// Create (but do not subscribe) a channel subscription whose
    /// publications are sent on `publications`.
    fn new_subscription(
        &mut self,
        channel: &str,
        options: SubscriptionOptions,
        publications: PublicationSender,
    ) -> Result<Box<dyn ChannelSubscription>, TransportError>;

    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the connection. Must be safe to call more than once.
    async fn close(&mut self);
}

/// A single channel subscription on a [`TransportClient`].
#[async_trait]
pub trait ChannelSubscription: Send {
    fn channel(&self) -> &str;

    async fn subscribe(&mut self) -> Result<(), TransportError>;

    async fn unsubscribe(&mut self) -> Result<(), TransportError>;
}
