//! Channel roles and deterministic channel naming.
//!
//! For a subscription id `S`, prefix `P` and cursor `B`:
//!
//! ```text
//! control  →  P S :control
//! main     →  P S : B        (renamed on every reconnect as B advances)
//! mempool  →  P S :mempool
//! ```

use serde::{Deserialize, Serialize};

/// Marker identifying control channels by name.
pub const CONTROL_MARKER: &str = ":control";
/// Marker identifying mempool channels by name.
pub const MEMPOOL_MARKER: &str = ":mempool";
/// Prefix the indexing service expects on every channel name.
pub const DEFAULT_CHANNEL_PREFIX: &str = "query:";

/// Logical category of a subscribed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    Control,
    Main,
    Mempool,
}

impl ChannelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Main => "main",
            Self::Mempool => "mempool",
        }
    }

    /// Classify a channel by name substring.
    ///
    /// Used on the connection-level path, where publications are not tied
    /// to a subscription object. Anything without a marker is a data channel.
    pub fn from_channel_name(channel: &str) -> Self {
        if channel.contains(CONTROL_MARKER) {
            Self::Control
        } else if channel.contains(MEMPOOL_MARKER) {
            Self::Mempool
        } else {
            Self::Main
        }
    }
}

impl std::fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn control_channel(prefix: &str, subscription_id: &str) -> String {
    format!("{prefix}{subscription_id}{CONTROL_MARKER}")
}

pub fn main_channel(prefix: &str, subscription_id: &str, resume_block: u64) -> String {
    format!("{prefix}{subscription_id}:{resume_block}")
}

pub fn mempool_channel(prefix: &str, subscription_id: &str) -> String {
    format!("{prefix}{subscription_id}{MEMPOOL_MARKER}")
}

/// The set of channels one session subscribes to, in subscribe order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPlan {
    entries: Vec<(ChannelRole, String)>,
}

impl ChannelPlan {
    /// Derive the plan for `subscription_id` at `resume_block`.
    ///
    /// The control channel is always present; main and mempool only when
    /// the consumer can receive them.
    pub fn new(
        prefix: &str,
        subscription_id: &str,
        resume_block: u64,
        with_main: bool,
        with_mempool: bool,
    ) -> Self {
        let mut entries = vec![(ChannelRole::Control, control_channel(prefix, subscription_id))];
        if with_main {
            entries.push((
                ChannelRole::Main,
                main_channel(prefix, subscription_id, resume_block),
            ));
        }
        if with_mempool {
            entries.push((ChannelRole::Mempool, mempool_channel(prefix, subscription_id)));
        }
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelRole, &str)> {
        self.entries.iter().map(|(role, name)| (*role, name.as_str()))
    }

    pub fn name(&self, role: ChannelRole) -> Option<&str> {
        self.iter().find(|(r, _)| *r == role).map(|(_, n)| n)
    }

    pub fn role_of(&self, channel: &str) -> Option<ChannelRole> {
        self.iter().find(|(_, n)| *n == channel).map(|(r, _)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
