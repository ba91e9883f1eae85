//! Payload encodings.
//!
//! The service publishes the same records two ways: JSON on the shared
//! connection, protobuf on each channel subscription.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::DecodeError;

/// Wire encoding of a publication payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Human-readable JSON, used on the connection-level path.
    Json,
    /// Compact protobuf, used on per-subscription channels.
    Protobuf,
}

impl Encoding {
    pub fn decode<T>(self, data: &[u8]) -> Result<T, DecodeError>
    where
        T: prost::Message + Default + DeserializeOwned,
    {
        match self {
            Self::Json => Ok(serde_json::from_slice(data)?),
            Self::Protobuf => Ok(T::decode(data)?),
        }
    }

    pub fn encode<T>(self, value: &T) -> Result<Vec<u8>, DecodeError>
    where
        T: prost::Message + Serialize,
    {
        match self {
            Self::Json => Ok(serde_json::to_vec(value)?),
            Self::Protobuf => Ok(value.encode_to_vec()),
        }
    }
}
