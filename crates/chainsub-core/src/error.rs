//! Error types for the subscription pipeline.

use thiserror::Error;

/// Errors raised by a transport adapter.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The persistent connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A channel subscription could not be created or subscribed.
    #[error("subscribe to '{channel}' failed: {reason}")]
    Subscribe { channel: String, reason: String },

    /// A channel subscription could not be released.
    #[error("unsubscribe from '{channel}' failed: {reason}")]
    Unsubscribe { channel: String, reason: String },

    /// The client was already closed.
    #[error("transport client closed")]
    Closed,
}

/// Errors from a [`TokenProvider`](crate::token::TokenProvider).
#[derive(Debug, Clone, Error)]
pub enum TokenError {
    #[error("token fetch failed: {0}")]
    Fetch(String),

    /// The provider holds no token to refresh.
    #[error("no token available")]
    Empty,
}

/// A payload that could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// A non-fatal error delivered to [`EventHandler::on_error`](crate::handler::EventHandler).
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A publication on `channel` was malformed and has been dropped.
    #[error("decode failed on '{channel}': {source}")]
    Decode {
        channel: String,
        #[source]
        source: DecodeError,
    },

    /// A reconnect attempt failed; the session keeps retrying.
    #[error("reconnect attempt {attempt} failed: {source}")]
    Reconnect {
        attempt: u32,
        #[source]
        source: SubscribeError,
    },

    /// Releasing the previous channel set during a reconnect failed.
    #[error("teardown before reconnect failed: {0}")]
    Teardown(TransportError),
}

/// Setup errors, fatal to a `subscribe` call.
#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("token acquisition failed: {0}")]
    Token(#[from] TokenError),

    #[error("connect failed: {0}")]
    Connect(TransportError),

    #[error("subscribing '{channel}' failed: {source}")]
    Subscribe {
        channel: String,
        #[source]
        source: TransportError,
    },

    #[error("transport error: {0}")]
    Transport(TransportError),
}

impl SubscribeError {
    /// Returns `true` if the failure happened before any network connection was made.
    pub fn is_token_error(&self) -> bool {
        matches!(self, Self::Token(_))
    }
}

/// Errors returned when a session is torn down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Last error seen while releasing channels; every channel was still attempted.
    #[error("teardown error: {0}")]
    Teardown(#[from] TransportError),

    /// The session task exited before acknowledging the request.
    #[error("session already closed")]
    Closed,
}
