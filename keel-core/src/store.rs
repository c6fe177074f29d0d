//! Persistence layer abstractions.
//!
//! This module describes the storage contract ([`Store`]), its request and
//! filter types, and a reference in-memory implementation. Stores deal only
//! in encoded payloads; turning bytes back into typed events is the job of
//! the [`Registry`](crate::registry::Registry) held by a session.
use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    concurrency::ConcurrencyConflict,
    event::{EncodedEvent, Event, EventContext, InvalidEventTypeName, PersistedEvent},
    snapshot::{Snapshot, SnapshotId},
    stream::{Sequence, Stream, StreamId, Version},
};

pub mod inmemory;

/// Event materialised from a store, payload still encoded.
pub type StoredEvent = PersistedEvent<Vec<u8>>;

/// Everything a store needs to append one batch.
#[derive(Clone, Debug)]
pub struct AppendRequest {
    pub stream_id: StreamId,
    pub events: Vec<Event<EncodedEvent>>,
    pub context: EventContext,
    /// Version the stream must reach after this append.
    pub expected_version: Version,
    /// Snapshot committed together with the events.
    pub snapshot: Option<Snapshot>,
}

impl AppendRequest {
    /// Request to append `events`, expecting the stream to end at
    /// `expected_version`.
    #[must_use]
    pub fn new(
        stream_id: StreamId,
        events: Vec<Event<EncodedEvent>>,
        expected_version: Version,
    ) -> Self {
        Self {
            stream_id,
            events,
            context: EventContext::default(),
            expected_version,
            snapshot: None,
        }
    }

    #[must_use]
    pub fn context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    #[must_use]
    pub fn snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Split into the non-empty event batch and the remaining fields.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::EmptyBatch`] when there are no events.
    pub fn into_batch<E>(self) -> Result<(NonEmpty<Event<EncodedEvent>>, Self), AppendError<E>>
    where
        E: std::error::Error + 'static,
    {
        let Self {
            stream_id,
            events,
            context,
            expected_version,
            snapshot,
        } = self;
        let events = NonEmpty::from_vec(events).ok_or(AppendError::EmptyBatch)?;
        Ok((
            events,
            Self {
                stream_id,
                events: Vec::new(),
                context,
                expected_version,
                snapshot,
            },
        ))
    }
}

/// Result of a successful append.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AppendResult {
    /// Stream version after the append.
    pub version: Version,
    /// Global sequence of the last event written.
    pub last_global_sequence: Sequence,
}

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// A stream cannot be saved with zero new facts.
    #[error("cannot append an empty event batch")]
    EmptyBatch,
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error("stream `{0}` has been deleted")]
    StreamDeleted(StreamId),
    #[error(transparent)]
    InvalidEventType(#[from] InvalidEventTypeName),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error + 'static> AppendError<StoreError> {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Filter describing which events should be loaded from the store.
///
/// Every bound is optional and inclusive. Version bounds are stream-local;
/// sequence bounds refer to the store-wide global sequence. Results are in
/// ascending global order unless [`descending`](Self::descending) is set, and
/// `count` truncates after ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub stream_id: Option<StreamId>,
    pub from_version: Option<Version>,
    pub to_version: Option<Version>,
    pub from_sequence: Option<Sequence>,
    pub to_sequence: Option<Sequence>,
    pub count: Option<usize>,
    pub descending: bool,
}

impl EventFilter {
    /// Every event in the store.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Every event of one stream.
    #[must_use]
    pub fn for_stream(stream_id: StreamId) -> Self {
        Self {
            stream_id: Some(stream_id),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    #[must_use]
    pub const fn to_version(mut self, version: Version) -> Self {
        self.to_version = Some(version);
        self
    }

    #[must_use]
    pub const fn from_sequence(mut self, sequence: Sequence) -> Self {
        self.from_sequence = Some(sequence);
        self
    }

    #[must_use]
    pub const fn to_sequence(mut self, sequence: Sequence) -> Self {
        self.to_sequence = Some(sequence);
        self
    }

    #[must_use]
    pub const fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.descending = true;
        self
    }

    /// Whether `event` satisfies every bound except `count`.
    #[must_use]
    pub fn matches<D>(&self, event: &PersistedEvent<D>) -> bool {
        self.stream_id.as_ref().is_none_or(|id| *id == event.stream_id)
            && self.from_version.is_none_or(|v| event.version >= v)
            && self.to_version.is_none_or(|v| event.version <= v)
            && self.from_sequence.is_none_or(|s| event.global_sequence >= s)
            && self.to_sequence.is_none_or(|s| event.global_sequence <= s)
    }
}

/// Abstraction over the persistence layer for event streams.
///
/// A store instance is scoped to exactly one tenant. Handles are cheap to
/// share across threads; every operation may be called concurrently.
///
/// The one serialisation point a backend must guarantee is the append path:
/// checking the expected version and assigning sequences for a stream must be
/// atomic with respect to every other append to that stream.
// ANCHOR: store_trait
pub trait Store: Send + Sync {
    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append a batch of events, optionally with a snapshot.
    ///
    /// The append succeeds only if `request.expected_version` equals the
    /// stream's current version plus the number of events. Events and snapshot
    /// commit together or not at all.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::EmptyBatch`] for an empty batch,
    /// [`AppendError::Conflict`] on a version mismatch,
    /// [`AppendError::StreamDeleted`] for a tombstoned stream and
    /// [`AppendError::Store`] if persistence fails.
    fn save_events(
        &self,
        request: AppendRequest,
    ) -> Result<AppendResult, AppendError<Self::Error>>;

    /// Load events matching `filter`. An empty result is not an error.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn load_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, Self::Error>;

    /// Current bookkeeping for a stream, or `None` if nothing was ever
    /// appended to it.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the lookup fails.
    fn stream(&self, stream_id: &StreamId) -> Result<Option<Stream>, Self::Error>;

    /// Tombstone a stream.
    ///
    /// Further appends fail with [`AppendError::StreamDeleted`] and the
    /// stream's snapshots are dropped. Its history stays readable.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn delete_stream(&self, stream_id: &StreamId) -> Result<(), Self::Error>;

    /// Upsert a snapshot.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the snapshot is rejected or
    /// persistence fails.
    fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), Self::Error>;

    /// # Errors
    ///
    /// Returns a store-specific error when the lookup fails.
    fn load_snapshot(&self, id: &SnapshotId) -> Result<Option<Snapshot>, Self::Error>;

    /// Remove a snapshot. Removing a missing snapshot succeeds.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), Self::Error>;

    /// Release the handle. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when releasing resources fails.
    fn close(&self) -> Result<(), Self::Error>;
}
// ANCHOR_END: store_trait
