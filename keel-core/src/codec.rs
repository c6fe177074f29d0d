//! Serialisation boundary.
//!
//! The core never picks a wire format. Snapshot state and event payloads pass
//! through a [`Codec`] supplied at configuration time; [`JsonCodec`] is the
//! bundled default.

use serde::{Serialize, de::DeserializeOwned};

/// Deterministic, round-trippable encoding used for event payloads and
/// snapshot state.
pub trait Codec: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode a value to bytes.
    ///
    /// # Errors
    ///
    /// Returns a codec-specific error when the value cannot be encoded.
    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: Serialize + ?Sized;

    /// Decode bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns a codec-specific error when the bytes are malformed or do not
    /// match the shape of `T`.
    fn deserialize<T>(&self, data: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned;
}

/// JSON codec backed by `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    type Error = serde_json::Error;

    fn serialize<T>(&self, value: &T) -> Result<Vec<u8>, Self::Error>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_vec(value)
    }

    fn deserialize<T>(&self, data: &[u8]) -> Result<T, Self::Error>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(data)
    }
}
