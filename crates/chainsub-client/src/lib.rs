//! chainsub-client — resumable multi-channel subscriptions.
//!
//! # Features
//! - One session task per subscription, events handled sequentially
//! - Resume from the last confirmed block after every reconnect
//! - Control / main / mempool channel multiplexing gated by handler capabilities
//! - JSON connection-level and protobuf per-channel dispatch
//! - Bounded reconnect retries with exponential backoff
//! - In-memory transport for tests and simulation

pub mod client;
pub mod config;
mod dispatcher;
pub mod memory;
pub mod metrics;
pub mod multiplexer;
mod session;
pub mod state;

pub use client::{SubscriberClient, Subscription};
pub use config::{ConfigError, SubscriberConfig};
pub use memory::MemoryTransport;
pub use metrics::SessionMetrics;
pub use multiplexer::{ChannelMultiplexer, ChannelSet};
pub use state::{Action, SessionState};
