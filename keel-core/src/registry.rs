//! Event type registry.
//!
//! Maps an [`EventType`] to the function that turns stored bytes back into a
//! payload value. The registry is assembled once through [`RegistryBuilder`]
//! and is immutable afterwards; the order of registrations never matters.
//!
//! Lookups are exact on the full event type. There is deliberately no
//! fallback from `v2` to `v1`: each schema version needs its own registration,
//! which keeps upcasting logic explicit and outside the core.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    codec::Codec,
    event::{DomainEvent, EventType, InvalidEventTypeName},
};

/// A decoded payload whose concrete type is only known to the registrant.
///
/// Aggregate event enums recover the concrete type through
/// [`EventUnion::from_payload`](crate::aggregate::EventUnion::from_payload).
pub type DecodedPayload = Box<dyn Any + Send + Sync>;

type DecodeFn<C> = fn(&C, &[u8]) -> Result<DecodedPayload, <C as Codec>::Error>;

struct Entry<C: Codec> {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn<C>,
}

impl<C: Codec> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            type_id: self.type_id,
            type_name: self.type_name,
            decode: self.decode,
        }
    }
}

/// Error raised while assembling a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    InvalidEventType(#[from] InvalidEventTypeName),
    /// Two distinct payload types claim the same event type.
    #[error(
        "event type `{event_type}` is already registered to `{existing}`, cannot register \
         `{conflicting}`"
    )]
    Conflict {
        event_type: EventType,
        existing: &'static str,
        conflicting: &'static str,
    },
}

/// Error raised while decoding stored bytes.
#[derive(Debug, Error)]
pub enum DecodeError<CodecError>
where
    CodecError: std::error::Error + 'static,
{
    #[error("no decoder registered for event type `{0}`")]
    NoDecoderRegistered(EventType),
    #[error("failed to decode `{event_type}`: {source}")]
    Codec {
        event_type: EventType,
        #[source]
        source: CodecError,
    },
}

/// Incrementally collects decoders before freezing them into a [`Registry`].
pub struct RegistryBuilder<C: Codec> {
    entries: HashMap<EventType, Entry<C>>,
}

impl<C: Codec> RegistryBuilder<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register the decoder for payload type `T`.
    ///
    /// The key is the event type derived from `T::TYPE_NAME`. Registering the
    /// same type twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidEventType`] if the type name is
    /// malformed and [`RegistryError::Conflict`] if a different type already
    /// owns the event type.
    pub fn register<T>(mut self) -> Result<Self, RegistryError>
    where
        T: DomainEvent + DeserializeOwned + Send + Sync + 'static,
    {
        let event_type = EventType::of::<T>()?;
        let entry = Entry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            decode: decode_as::<C, T>,
        };

        if let Some(existing) = self.entries.get(&event_type) {
            if existing.type_id == entry.type_id {
                return Ok(self);
            }
            return Err(RegistryError::Conflict {
                event_type,
                existing: existing.type_name,
                conflicting: entry.type_name,
            });
        }

        tracing::trace!(%event_type, type_name = entry.type_name, "registered event decoder");
        self.entries.insert(event_type, entry);
        Ok(self)
    }

    /// Freeze the builder.
    #[must_use]
    pub fn build(self) -> Registry<C> {
        Registry {
            entries: self.entries,
        }
    }
}

impl<C: Codec> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> fmt::Debug for RegistryBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("event_types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn decode_as<C, T>(codec: &C, bytes: &[u8]) -> Result<DecodedPayload, C::Error>
where
    C: Codec,
    T: DeserializeOwned + Send + Sync + 'static,
{
    let value: T = codec.deserialize(bytes)?;
    Ok(Box::new(value))
}

/// Immutable lookup table from event type to decoder.
pub struct Registry<C: Codec> {
    entries: HashMap<EventType, Entry<C>>,
}

impl<C: Codec> Registry<C> {
    #[must_use]
    pub fn builder() -> RegistryBuilder<C> {
        RegistryBuilder::new()
    }

    /// Decode `bytes` as the payload registered for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NoDecoderRegistered`] when nothing is registered
    /// for the exact event type, or [`DecodeError::Codec`] when the bytes do
    /// not decode.
    pub fn decode(
        &self,
        codec: &C,
        event_type: &EventType,
        bytes: &[u8],
    ) -> Result<DecodedPayload, DecodeError<C::Error>> {
        let entry = self
            .entries
            .get(event_type)
            .ok_or_else(|| DecodeError::NoDecoderRegistered(event_type.clone()))?;
        (entry.decode)(codec, bytes).map_err(|source| DecodeError::Codec {
            event_type: event_type.clone(),
            source,
        })
    }

    #[must_use]
    pub fn contains(&self, event_type: &EventType) -> bool {
        self.entries.contains_key(event_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Codec> Clone for Registry<C> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<C: Codec> fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("event_types", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
