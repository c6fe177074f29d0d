//! Domain events and their persisted form.
//!
//! An [`Event`] is a fact that has not yet been attached to a stream position.
//! A store turns it into a [`PersistedEvent`] on a successful append, adding
//! stream and global positions together with the cross-cutting context of the
//! call that wrote it.
//!
//! Every payload type carries a structural type name of the form
//! `<AggregateType>_<Name>_V<SchemaVersion>`. [`EventType`] is parsed from that
//! name and is the only key used to find a decoder for stored bytes, so two
//! schema versions of the same event are always distinct types.

use std::{collections::BTreeMap, convert::Infallible};

use chrono::{DateTime, Utc};
use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    id::{self, string_id},
    stream::{Sequence, StreamId, Version},
};

string_id!(
    /// Unique, time-ordered event identifier.
    EventId
);

string_id!(
    /// Identifies the end-to-end operation an event belongs to.
    CorrelationId
);

string_id!(
    /// Identifies the message that directly caused an event.
    CausationId
);

impl EventId {
    /// Generate a fresh time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(id::sequential())
    }
}

/// Open key/value bag attached to persisted events.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Returned when a payload's type name does not follow
/// `<AggregateType>_<Name>_V<SchemaVersion>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event type name `{name}`: {reason}")]
pub struct InvalidEventTypeName {
    pub name: String,
    pub reason: &'static str,
}

/// Structural identity of an event payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType {
    schema_version: u32,
    aggregate_type: String,
    name: String,
    id: String,
}

impl EventType {
    /// Parse a structural type name such as `Calculator_ValueAdded_V2`.
    ///
    /// The aggregate type and event name are normalised to `snake_case`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEventTypeName`] when the name does not have exactly
    /// three non-empty `_`-separated segments, or when the last segment is
    /// not `V` followed by a positive integer.
    pub fn parse(type_name: &str) -> Result<Self, InvalidEventTypeName> {
        let invalid = |reason| InvalidEventTypeName {
            name: type_name.to_owned(),
            reason,
        };

        let segments: Vec<&str> = type_name.split('_').collect();
        let [aggregate_type, name, version] = segments.as_slice() else {
            return Err(invalid("expected exactly three `_`-separated segments"));
        };
        if aggregate_type.is_empty() || name.is_empty() {
            return Err(invalid("aggregate type and name must not be empty"));
        }
        let digits = version
            .strip_prefix('V')
            .or_else(|| version.strip_prefix('v'))
            .ok_or_else(|| invalid("version segment must start with `V`"))?;
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("version segment is not an integer"));
        }
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(invalid("version segment must not have leading zeros"));
        }
        let schema_version: u32 = digits
            .parse()
            .map_err(|_| invalid("version segment is not an integer"))?;
        if schema_version == 0 {
            return Err(invalid("schema version must be positive"));
        }

        Ok(Self::new(
            &aggregate_type.to_snake_case(),
            &name.to_snake_case(),
            schema_version,
        ))
    }

    /// Event type of the payload type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEventTypeName`] if `T::TYPE_NAME` is malformed.
    pub fn of<T: DomainEvent>() -> Result<Self, InvalidEventTypeName> {
        Self::parse(T::TYPE_NAME)
    }

    fn new(aggregate_type: &str, name: &str, schema_version: u32) -> Self {
        Self {
            schema_version,
            aggregate_type: aggregate_type.to_owned(),
            name: name.to_owned(),
            id: format!("{aggregate_type}.{name}.v{schema_version}"),
        }
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    #[must_use]
    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical identifier, e.g. `calculator.value_added.v2`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Marker trait for concrete event payload structs.
///
/// `TYPE_NAME` is the structural name of the payload and must follow
/// `<AggregateType>_<Name>_V<SchemaVersion>`. `#[derive(DomainEvent)]` uses the
/// struct identifier, `#[event(type_name = "...")]`, or builds the name from
/// `#[event(aggregate = "...", version = N)]` and the identifier.
pub trait DomainEvent {
    const TYPE_NAME: &'static str;
}

/// Anything that can report the [`EventType`] of the value it carries.
///
/// Implemented for every [`DomainEvent`], for the event enums generated by
/// `#[derive(AggregateState)]`, and for already-encoded payloads.
pub trait Payload {
    /// # Errors
    ///
    /// Returns [`InvalidEventTypeName`] if the underlying type name is
    /// malformed.
    fn event_type(&self) -> Result<EventType, InvalidEventTypeName>;
}

impl<T: DomainEvent> Payload for T {
    fn event_type(&self) -> Result<EventType, InvalidEventTypeName> {
        EventType::of::<T>()
    }
}

/// A payload that has already been run through a codec.
///
/// This is the form in which events cross the store boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedEvent {
    pub event_type: EventType,
    pub bytes: Vec<u8>,
}

impl EncodedEvent {
    /// Encode `payload` with `codec`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::EventType`] for a malformed type name and
    /// [`EncodeError::Codec`] if serialisation fails.
    pub fn encode<P, C>(payload: &P, codec: &C) -> Result<Self, EncodeError<C::Error>>
    where
        P: Payload + Serialize,
        C: crate::codec::Codec,
    {
        let event_type = payload.event_type()?;
        let bytes = codec.serialize(payload).map_err(EncodeError::Codec)?;
        Ok(Self { event_type, bytes })
    }
}

impl Payload for EncodedEvent {
    fn event_type(&self) -> Result<EventType, InvalidEventTypeName> {
        Ok(self.event_type.clone())
    }
}

/// Error raised while encoding a payload.
#[derive(Debug, Error)]
pub enum EncodeError<CodecError>
where
    CodecError: std::error::Error + 'static,
{
    #[error(transparent)]
    EventType(#[from] InvalidEventTypeName),
    #[error("failed to encode event payload: {0}")]
    Codec(#[source] CodecError),
}

/// Explicit values for an event's identity and timestamp.
///
/// Only tests and replay tooling should need these; normal operation always
/// generates fresh values.
#[derive(Clone, Debug, Default)]
pub struct EventOverrides {
    pub event_id: Option<EventId>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventOverrides {
    #[must_use]
    pub fn event_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An immutable fact that has not yet been assigned a stream position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event<D> {
    pub event_id: EventId,
    pub data: D,
    pub timestamp: DateTime<Utc>,
}

impl<D> Event<D> {
    /// Wrap `data` with a fresh event id and the current time.
    #[must_use]
    pub fn new(data: D) -> Self {
        Self::with_overrides(data, EventOverrides::default())
    }

    #[must_use]
    pub fn with_overrides(data: D, overrides: EventOverrides) -> Self {
        Self {
            event_id: overrides.event_id.unwrap_or_else(EventId::generate),
            data,
            timestamp: overrides.timestamp.unwrap_or_else(Utc::now),
        }
    }

    /// Transform the payload, keeping identity and timestamp.
    pub fn map<U>(self, f: impl FnOnce(D) -> U) -> Event<U> {
        Event {
            event_id: self.event_id,
            data: f(self.data),
            timestamp: self.timestamp,
        }
    }

    /// Fallible form of [`map`](Self::map).
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn try_map<U, E>(self, f: impl FnOnce(D) -> Result<U, E>) -> Result<Event<U>, E> {
        Ok(Event {
            event_id: self.event_id,
            data: f(self.data)?,
            timestamp: self.timestamp,
        })
    }

    /// Attach this event to a stream position.
    ///
    /// Pure: performs no I/O. The event type is derived from the payload.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidEventTypeName`] if the payload's type name is
    /// malformed.
    pub fn to_persisted(
        self,
        stream_id: StreamId,
        position: Position,
        context: &EventContext,
    ) -> Result<PersistedEvent<D>, InvalidEventTypeName>
    where
        D: Payload,
    {
        let event_type = self.data.event_type()?;
        Ok(PersistedEvent {
            event_id: self.event_id,
            data: self.data,
            timestamp: self.timestamp,
            stream_id,
            sequence: position.sequence,
            global_sequence: position.global_sequence,
            version: position.version,
            correlation_id: context.correlation_id.clone(),
            causation_id: context.causation_id.clone(),
            metadata: context.metadata.clone(),
            event_type,
        })
    }
}

/// Where an appended event landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Position {
    /// Stream-local position, starting at 1.
    pub sequence: Sequence,
    /// Store-wide position.
    pub global_sequence: Sequence,
    /// Stream version after this event.
    pub version: Version,
}

/// Cross-cutting data stamped onto every event of one append.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventContext {
    pub correlation_id: CorrelationId,
    pub causation_id: CausationId,
    pub metadata: Metadata,
}

/// An event as recorded by a store.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedEvent<D> {
    pub event_id: EventId,
    pub data: D,
    pub timestamp: DateTime<Utc>,
    pub stream_id: StreamId,
    pub sequence: Sequence,
    pub global_sequence: Sequence,
    pub version: Version,
    pub correlation_id: CorrelationId,
    pub causation_id: CausationId,
    pub metadata: Metadata,
    pub event_type: EventType,
}

impl<D> PersistedEvent<D> {
    /// Drop persistence metadata, keeping the bare event.
    pub fn into_event(self) -> Event<D> {
        Event {
            event_id: self.event_id,
            data: self.data,
            timestamp: self.timestamp,
        }
    }

    /// Transform the payload, keeping every persistence field.
    pub fn map<U>(self, f: impl FnOnce(D) -> U) -> PersistedEvent<U> {
        match self.try_map(|_, data| Ok::<_, Infallible>(f(data))) {
            Ok(event) => event,
            Err(never) => match never {},
        }
    }

    /// Fallible form of [`map`](Self::map).
    ///
    /// `f` also receives the event type so decoders can dispatch on it.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn try_map<U, E>(
        self,
        f: impl FnOnce(&EventType, D) -> Result<U, E>,
    ) -> Result<PersistedEvent<U>, E> {
        let data = f(&self.event_type, self.data)?;
        Ok(PersistedEvent {
            event_id: self.event_id,
            data,
            timestamp: self.timestamp,
            stream_id: self.stream_id,
            sequence: self.sequence,
            global_sequence: self.global_sequence,
            version: self.version,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            metadata: self.metadata,
            event_type: self.event_type,
        })
    }
}

impl<D> From<PersistedEvent<D>> for Event<D> {
    fn from(event: PersistedEvent<D>) -> Self {
        event.into_event()
    }
}
