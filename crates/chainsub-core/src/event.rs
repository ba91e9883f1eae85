//! Event records delivered to subscribers, plus the status taxonomy.
//!
//! Both records carry prost and serde derives: per-subscription channels
//! deliver them protobuf-encoded, the connection-level publication path
//! delivers them as JSON.

use serde::{Deserialize, Serialize};

// ─── StatusCode ───────────────────────────────────────────────────────────────

/// Lifecycle status codes reported through `on_status`.
///
/// Purely informational; the consumer is not required to react to any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum StatusCode {
    Connecting = 1,
    Connected = 2,
    Disconnected = 3,
    Error = 4,
    Subscribing = 10,
    Subscribed = 11,
    Unsubscribed = 12,
    Join = 20,
    Leave = 21,
}

impl StatusCode {
    /// Numeric wire value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Map a wire value back to a known status. Codes sent by the service
    /// outside this set return `None`.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnected,
            4 => Self::Error,
            10 => Self::Subscribing,
            11 => Self::Subscribed,
            12 => Self::Unsubscribed,
            20 => Self::Join,
            21 => Self::Leave,
            _ => return None,
        })
    }

    /// Short label used in the `status` field.
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Subscribing => "subscribing",
            Self::Subscribed => "subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ─── ControlEvent ─────────────────────────────────────────────────────────────

/// A status or confirmation record.
///
/// Emitted by the controller for lifecycle changes and by the service on the
/// control channel. A `block` value, when present, is a confirmation that
/// everything up to that height has been delivered.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlEvent {
    #[prost(uint32, tag = "1")]
    #[serde(rename = "statusCode", alias = "status_code")]
    pub status_code: u32,
    #[prost(string, tag = "2")]
    pub status: String,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(uint64, optional, tag = "4")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<u64>,
}

impl ControlEvent {
    /// Build a status report with the code's default label.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        Self::labelled(code, code.label(), message)
    }

    /// Build a status report with an explicit label (e.g. `"reconnecting"`).
    pub fn labelled(code: StatusCode, status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code: code.code(),
            status: status.into(),
            message: message.into(),
            block: None,
        }
    }

    /// Attach a block height.
    pub fn with_block(mut self, block: u64) -> Self {
        self.block = Some(block);
        self
    }

    /// The known status code, if the wire value is one.
    pub fn code(&self) -> Option<StatusCode> {
        StatusCode::from_code(self.status_code)
    }
}

// ─── TransactionEvent ─────────────────────────────────────────────────────────

/// A transaction record, forwarded to the handler unmodified.
///
/// Whether it is confirmed or a mempool entry is decided by the channel that
/// delivered it, not by its contents.
#[derive(Clone, PartialEq, Eq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionEvent {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    #[serde(alias = "block_hash")]
    pub block_hash: String,
    #[prost(uint32, tag = "3")]
    #[serde(alias = "block_height")]
    pub block_height: u32,
    #[prost(uint32, tag = "4")]
    #[serde(alias = "block_time")]
    pub block_time: u32,
    #[prost(uint64, tag = "5")]
    #[serde(alias = "block_index")]
    pub block_index: u64,
    #[prost(bytes = "vec", tag = "6")]
    #[serde(with = "base64_bytes")]
    pub transaction: Vec<u8>,
    #[prost(bytes = "vec", tag = "7")]
    #[serde(alias = "merkle_proof", with = "base64_bytes")]
    pub merkle_proof: Vec<u8>,
    #[prost(string, repeated, tag = "8")]
    pub addresses: Vec<String>,
}

/// Byte fields travel as standard base64 strings in JSON.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(Vec::new()),
            Some(s) => STANDARD.decode(s.as_bytes()).map_err(D::Error::custom),
        }
    }
}
