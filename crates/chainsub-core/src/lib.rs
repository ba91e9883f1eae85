//! chainsub-core — foundation types and traits for ChainSub.
//!
//! # Overview
//!
//! ChainSub keeps a resumable subscription to a blockchain-indexing service
//! open over a persistent pub/sub connection. The core crate defines:
//!
//! - [`ControlEvent`] / [`TransactionEvent`] / [`StatusCode`]: event model
//! - [`ResumeCursor`]: monotonic last-confirmed-block cursor
//! - [`ChannelPlan`] / [`ChannelRole`]: deterministic channel naming
//! - [`Encoding`]: JSON and protobuf payload decoding
//! - [`EventHandler`]: the consumer's callback capability set
//! - [`TokenProvider`]: authentication token capability
//! - [`transport`] module: the transport adapter traits
//! - [`ReconnectPolicy`]: bounded backoff for session rebuilds

pub mod channel;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod event;
pub mod handler;
pub mod retry;
pub mod token;
pub mod transport;

pub use channel::{ChannelPlan, ChannelRole, DEFAULT_CHANNEL_PREFIX};
pub use codec::Encoding;
pub use cursor::ResumeCursor;
pub use error::{DecodeError, DispatchError, SessionError, SubscribeError, TokenError, TransportError};
pub use event::{ControlEvent, StatusCode, TransactionEvent};
pub use handler::EventHandler;
pub use retry::{ReconnectConfig, ReconnectPolicy};
pub use token::{StaticTokenProvider, TokenProvider};
pub use transport::{
    ChannelSubscription, ClientEvent, ClientOptions, Publication, SubscriptionOptions, Transport,
    TransportClient,
};
