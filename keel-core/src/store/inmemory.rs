//! In-memory event store.
//!
//! [`Store`] is the reference implementation of [`Store`](super::Store) and the
//! behavioural oracle every durable backend is measured against. It keeps one
//! tenant's log, stream table and snapshots behind a single `RwLock`.
//!
//! # Example
//!
//! ```
//! use keel_core::store::{EventFilter, Store as _, inmemory};
//!
//! let store = inmemory::Store::new();
//! assert!(store.load_events(&EventFilter::all()).unwrap().is_empty());
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    concurrency::ConcurrencyConflict,
    event::Position,
    snapshot::{Snapshot, SnapshotId},
    store::{AppendError, AppendRequest, AppendResult, EventFilter, StoredEvent},
    stream::{Sequence, Stream, StreamId, Version},
};

/// Everything one tenant owns: the global log, per-stream bookkeeping and
/// snapshots.
#[derive(Debug, Default)]
pub(crate) struct TenantState {
    streams: HashMap<StreamId, Stream>,
    /// Every event in global-sequence order.
    log: Vec<StoredEvent>,
    /// Indices into `log`, per stream, ascending.
    by_stream: HashMap<StreamId, Vec<usize>>,
    global_sequence: Sequence,
    snapshots: HashMap<SnapshotId, Snapshot>,
}

pub(crate) type SharedState = Arc<RwLock<TenantState>>;

/// Thread-safe in-memory store for a single tenant.
///
/// Clones share both state and the closed flag.
#[derive(Clone, Debug)]
pub struct Store {
    inner: SharedState,
    closed: Arc<AtomicBool>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(SharedState::default())
    }

    /// Open a fresh handle onto existing tenant state.
    pub(crate) fn with_state(inner: SharedState) -> Self {
        Self {
            inner,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), InMemoryError> {
        if self.is_closed() {
            return Err(InMemoryError::Closed);
        }
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, TenantState> {
        self.inner.read().expect("in-memory store lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, TenantState> {
        self.inner.write().expect("in-memory store lock poisoned")
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for the in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InMemoryError {
    #[error("store handle is closed")]
    Closed,
    #[error(
        "snapshot `{id}` is at version {snapshot_version}, ahead of stream version \
         {stream_version}"
    )]
    SnapshotAhead {
        id: SnapshotId,
        snapshot_version: Version,
        stream_version: Version,
    },
    #[error("snapshot for `{snapshot_stream}` cannot be saved with an append to `{stream_id}`")]
    SnapshotStreamMismatch {
        stream_id: StreamId,
        snapshot_stream: StreamId,
    },
}

impl super::Store for Store {
    type Error = InMemoryError;

    #[tracing::instrument(
        skip(self, request),
        fields(
            stream_id = %request.stream_id,
            event_count = request.events.len(),
            expected_version = request.expected_version,
        )
    )]
    fn save_events(
        &self,
        request: AppendRequest,
    ) -> Result<AppendResult, AppendError<Self::Error>> {
        self.ensure_open().map_err(AppendError::Store)?;
        let (events, request) = request.into_batch::<InMemoryError>()?;
        let AppendRequest {
            stream_id,
            context,
            expected_version,
            snapshot,
            ..
        } = request;

        if let Some(snapshot) = &snapshot
            && *snapshot.stream_id() != stream_id
        {
            return Err(AppendError::Store(InMemoryError::SnapshotStreamMismatch {
                stream_id,
                snapshot_stream: snapshot.stream_id().clone(),
            }));
        }

        let mut guard = self.write();
        let state = &mut *guard;

        let current = state
            .streams
            .get(&stream_id)
            .cloned()
            .unwrap_or_else(|| Stream::new(stream_id.clone()));
        if current.deleted {
            tracing::debug!("stream is tombstoned, rejecting append");
            return Err(AppendError::StreamDeleted(stream_id));
        }

        let end_version = current.version + events.len() as Version;
        if expected_version != end_version {
            tracing::debug!(
                stream_version = current.version,
                end_version,
                "version mismatch, rejecting append"
            );
            return Err(ConcurrencyConflict {
                stream_id,
                expected: expected_version,
                actual: end_version,
            }
            .into());
        }

        if let Some(snapshot) = &snapshot
            && snapshot.version > end_version
        {
            return Err(AppendError::Store(InMemoryError::SnapshotAhead {
                id: snapshot.id.clone(),
                snapshot_version: snapshot.version,
                stream_version: end_version,
            }));
        }

        // Stage everything before touching state so a failure leaves no trace.
        let mut global_sequence = state.global_sequence;
        let mut staged = Vec::with_capacity(events.len());
        for (version, event) in (current.version + 1..).zip(events) {
            global_sequence += 1;
            let position = Position {
                sequence: version,
                global_sequence,
                version,
            };
            let persisted = event.to_persisted(stream_id.clone(), position, &context)?;
            staged.push(persisted.map(|encoded| encoded.bytes));
        }

        let indices = state.by_stream.entry(stream_id.clone()).or_default();
        for event in staged {
            indices.push(state.log.len());
            state.log.push(event);
        }
        state.global_sequence = global_sequence;
        state.streams.insert(
            stream_id.clone(),
            Stream {
                stream_id,
                version: end_version,
                deleted: false,
            },
        );
        let with_snapshot = snapshot.is_some();
        if let Some(snapshot) = snapshot {
            state.snapshots.insert(snapshot.id.clone(), snapshot);
        }
        drop(guard);

        tracing::debug!(
            version = end_version,
            last_global_sequence = global_sequence,
            with_snapshot,
            "events appended to stream"
        );
        Ok(AppendResult {
            version: end_version,
            last_global_sequence: global_sequence,
        })
    }

    #[tracing::instrument(skip(self))]
    fn load_events(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>, Self::Error> {
        self.ensure_open()?;
        let state = self.read();

        let mut events: Vec<StoredEvent> = match &filter.stream_id {
            Some(stream_id) => state
                .by_stream
                .get(stream_id)
                .into_iter()
                .flatten()
                .map(|&index| &state.log[index])
                .filter(|event| filter.matches(event))
                .cloned()
                .collect(),
            None => state
                .log
                .iter()
                .filter(|event| filter.matches(event))
                .cloned()
                .collect(),
        };
        drop(state);

        if filter.descending {
            events.reverse();
        }
        if let Some(count) = filter.count {
            events.truncate(count);
        }

        tracing::debug!(events_loaded = events.len(), "loaded events from store");
        Ok(events)
    }

    #[tracing::instrument(skip(self), fields(stream_id = %stream_id))]
    fn stream(&self, stream_id: &StreamId) -> Result<Option<Stream>, Self::Error> {
        self.ensure_open()?;
        let stream = self.read().streams.get(stream_id).cloned();
        tracing::trace!(?stream, "retrieved stream");
        Ok(stream)
    }

    #[tracing::instrument(skip(self), fields(stream_id = %stream_id))]
    fn delete_stream(&self, stream_id: &StreamId) -> Result<(), Self::Error> {
        self.ensure_open()?;
        let mut state = self.write();
        state
            .streams
            .entry(stream_id.clone())
            .or_insert_with(|| Stream::new(stream_id.clone()))
            .deleted = true;
        state.snapshots.retain(|id, _| id.stream_id != *stream_id);
        drop(state);
        tracing::debug!("stream tombstoned");
        Ok(())
    }

    #[tracing::instrument(
        skip(self, snapshot),
        fields(id = %snapshot.id, version = snapshot.version)
    )]
    fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), Self::Error> {
        self.ensure_open()?;
        let mut state = self.write();
        let stream_version = state
            .streams
            .get(snapshot.stream_id())
            .map_or(0, |stream| stream.version);
        if snapshot.version > stream_version {
            tracing::debug!(stream_version, "snapshot ahead of stream, rejecting");
            return Err(InMemoryError::SnapshotAhead {
                id: snapshot.id,
                snapshot_version: snapshot.version,
                stream_version,
            });
        }
        state.snapshots.insert(snapshot.id.clone(), snapshot);
        drop(state);
        tracing::trace!("snapshot saved");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn load_snapshot(&self, id: &SnapshotId) -> Result<Option<Snapshot>, Self::Error> {
        self.ensure_open()?;
        let snapshot = self.read().snapshots.get(id).cloned();
        tracing::trace!(found = snapshot.is_some(), "snapshot lookup");
        Ok(snapshot)
    }

    #[tracing::instrument(skip(self), fields(id = %id))]
    fn delete_snapshot(&self, id: &SnapshotId) -> Result<(), Self::Error> {
        self.ensure_open()?;
        self.write().snapshots.remove(id);
        Ok(())
    }

    fn close(&self) -> Result<(), Self::Error> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("in-memory store handle closed");
        }
        Ok(())
    }
}
