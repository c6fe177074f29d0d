//! Aggregates: state derived from events.
//!
//! An aggregate state type implements [`AggregateState`]; its events form a
//! closed enum ([`EventUnion`]) and `reduce` folds one event into the state.
//! [`Aggregate`] wraps such a state with its identity, version and the events
//! applied since the last save.
//!
//! `#[derive(AggregateState)]` generates the event enum and a `reduce` that
//! dispatches to your [`Apply`] impls, so the state type only has to describe
//! how each event changes it.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    codec::Codec,
    event::{Event, EventOverrides, Payload},
    id,
    registry::{DecodedPayload, RegistryBuilder, RegistryError},
    snapshot::{Snapshot, SnapshotId},
    stream::{StreamId, Version},
};

/// State of an event-sourced aggregate.
///
/// `Default` supplies the initial state. `reduce` must be pure: the same state
/// and event always produce the same result.
// ANCHOR: aggregate_state_trait
pub trait AggregateState: Default + Sized {
    /// Aggregate type name, the first half of every [`StreamId`].
    const AGGREGATE_TYPE: &'static str;

    /// Version of the state's shape. Snapshots of another version are never
    /// loaded.
    const SCHEMA_VERSION: u32;

    /// Closed set of events this aggregate accepts.
    type Event: EventUnion;

    /// Fold one event into the state.
    ///
    /// When using `#[derive(AggregateState)]`, this dispatches to your
    /// `Apply<E>` implementations. For hand-written states, implement it
    /// directly with a match expression.
    #[must_use]
    fn reduce(self, event: &Self::Event) -> Self;
}
// ANCHOR_END: aggregate_state_trait

/// Mutate aggregate state with one concrete event.
///
/// ```ignore
/// #[derive(Default)]
/// struct Calculator {
///     value: i64,
/// }
///
/// impl Apply<CalculatorAddedV1> for Calculator {
///     fn apply(&mut self, event: &CalculatorAddedV1) {
///         self.value += event.value;
///     }
/// }
/// ```
// ANCHOR: apply_trait
pub trait Apply<E> {
    fn apply(&mut self, event: &E);
}
// ANCHOR_END: apply_trait

/// The closed union of an aggregate's event payloads.
///
/// Deriving [`AggregateState`] implements this for the generated enum. A
/// hand-written union serialises as its inner payload and maps every variant
/// back from a type-erased decoded value.
pub trait EventUnion: Payload + Serialize + Clone + Sized {
    /// Structural type names of every variant.
    const TYPE_NAMES: &'static [&'static str];

    /// Recover a variant from a payload decoded by the registry.
    ///
    /// # Errors
    ///
    /// Hands the payload back unchanged when it is not one of this union's
    /// variants.
    fn from_payload(payload: DecodedPayload) -> Result<Self, DecodedPayload>;

    /// Register a decoder for every variant.
    ///
    /// # Errors
    ///
    /// Propagates [`RegistryError`] from the builder.
    fn register<C: Codec>(builder: RegistryBuilder<C>) -> Result<RegistryBuilder<C>, RegistryError>;
}

/// Error raised while loading a snapshot into an aggregate.
#[derive(Debug, Error)]
pub enum SnapshotError<CodecError>
where
    CodecError: std::error::Error + 'static,
{
    #[error("snapshot schema version {found} does not match aggregate schema version {expected}")]
    SchemaVersionMismatch { expected: u32, found: u32 },
    #[error("snapshot stream `{found}` does not match aggregate stream `{expected}`")]
    StreamMismatch { expected: StreamId, found: StreamId },
    #[error("cannot load a snapshot into an aggregate with unsaved changes")]
    UnsavedChanges,
    #[error("cannot load a snapshot into an aggregate already at version {version}")]
    AlreadyLoaded { version: Version },
    #[error("failed to decode snapshot state: {0}")]
    Decode(#[source] CodecError),
}

/// An aggregate instance: identity, version, state and pending events.
pub struct Aggregate<S: AggregateState> {
    id: String,
    version: Version,
    state: S,
    unsaved: Vec<Event<S::Event>>,
}

impl<S: AggregateState> Aggregate<S> {
    /// Fresh aggregate with a generated, time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self::with_id(id::sequential())
    }

    /// Fresh aggregate with the given id. An empty id is replaced by a
    /// generated one.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            id: if id.is_empty() { id::sequential() } else { id },
            version: 0,
            state: S::default(),
            unsaved: Vec::new(),
        }
    }

    /// Aggregate rebuilt from history. The events are not unsaved.
    #[must_use]
    pub fn from_events<I, E>(id: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Event<S::Event>>,
    {
        let mut aggregate = Self::with_id(id);
        aggregate.load(events);
        aggregate
    }

    /// Record a new event: reduce it into the state, bump the version and
    /// queue it for the next save.
    pub fn apply(&mut self, data: impl Into<S::Event>) -> &S {
        self.apply_with(data, EventOverrides::default())
    }

    /// [`apply`](Self::apply) with an explicit event id or timestamp.
    pub fn apply_with(&mut self, data: impl Into<S::Event>, overrides: EventOverrides) -> &S {
        let event = Event::with_overrides(data.into(), overrides);
        self.reduce(&event.data);
        self.unsaved.push(event);
        &self.state
    }

    /// Fold historical events into the state.
    ///
    /// Accepts bare [`Event`]s or
    /// [`PersistedEvent`](crate::event::PersistedEvent)s. Loaded events are
    /// never queued for saving.
    pub fn load<I, E>(&mut self, events: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<Event<S::Event>>,
    {
        for event in events {
            self.reduce(&event.into().data);
        }
    }

    fn reduce(&mut self, event: &S::Event) {
        self.state = std::mem::take(&mut self.state).reduce(event);
        self.version += 1;
    }

    /// Copy of the events applied since the last save.
    #[must_use]
    pub fn unsaved_events(&self) -> Vec<Event<S::Event>> {
        self.unsaved.clone()
    }

    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        !self.unsaved.is_empty()
    }

    pub fn clear_unsaved_events(&mut self) {
        self.unsaved.clear();
    }

    /// Encode the current state at the current version.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the state cannot be encoded.
    pub fn snapshot<C: Codec>(&self, codec: &C) -> Result<Snapshot, C::Error>
    where
        S: Serialize,
    {
        Ok(Snapshot {
            id: self.snapshot_id(),
            version: self.version,
            state: codec.serialize(&self.state)?,
        })
    }

    /// Replace the initial state with a snapshot's.
    ///
    /// Only valid on a pristine aggregate of the same stream and schema
    /// version. Checks run in that order: schema version, stream, unsaved
    /// changes, version.
    ///
    /// # Errors
    ///
    /// Returns the first [`SnapshotError`] precondition that fails, or
    /// [`SnapshotError::Decode`] if the state does not decode.
    pub fn load_snapshot<C: Codec>(
        &mut self,
        snapshot: &Snapshot,
        codec: &C,
    ) -> Result<(), SnapshotError<C::Error>>
    where
        S: DeserializeOwned,
    {
        if snapshot.schema_version() != S::SCHEMA_VERSION {
            return Err(SnapshotError::SchemaVersionMismatch {
                expected: S::SCHEMA_VERSION,
                found: snapshot.schema_version(),
            });
        }
        let stream_id = self.stream_id();
        if *snapshot.stream_id() != stream_id {
            return Err(SnapshotError::StreamMismatch {
                expected: stream_id,
                found: snapshot.stream_id().clone(),
            });
        }
        if self.has_unsaved_changes() {
            return Err(SnapshotError::UnsavedChanges);
        }
        if self.version > 0 {
            return Err(SnapshotError::AlreadyLoaded {
                version: self.version,
            });
        }

        self.state = codec
            .deserialize(&snapshot.state)
            .map_err(SnapshotError::Decode)?;
        self.version = snapshot.version;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn aggregate_type(&self) -> &'static str {
        S::AGGREGATE_TYPE
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        S::SCHEMA_VERSION
    }

    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(S::AGGREGATE_TYPE, self.id.as_str())
    }

    #[must_use]
    pub fn snapshot_id(&self) -> SnapshotId {
        SnapshotId::new(self.stream_id(), S::SCHEMA_VERSION)
    }

    /// Number of events folded into the state, counting from the snapshot
    /// baseline when one was loaded.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    #[must_use]
    pub const fn state(&self) -> &S {
        &self.state
    }

    #[must_use]
    pub fn into_state(self) -> S {
        self.state
    }
}

impl<S: AggregateState> Default for Aggregate<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AggregateState + Clone> Clone for Aggregate<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            version: self.version,
            state: self.state.clone(),
            unsaved: self.unsaved.clone(),
        }
    }
}

impl<S> fmt::Debug for Aggregate<S>
where
    S: AggregateState + fmt::Debug,
    S::Event: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregate")
            .field("stream_id", &self.stream_id())
            .field("version", &self.version)
            .field("state", &self.state)
            .field("unsaved", &self.unsaved)
            .finish()
    }
}
