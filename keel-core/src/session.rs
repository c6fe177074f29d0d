//! Per-tenant unit of work.
//!
//! A [`Session`] binds one tenant-scoped store to the shared [`Config`] and to
//! the cross-cutting context (correlation id, causation id, metadata) stamped
//! onto every event it saves. Loading and saving an aggregate resolve the
//! strategy configured for its type and delegate to it.

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, AggregateState, EventUnion, SnapshotError},
    codec::Codec,
    concurrency::ConcurrencyConflict,
    config::Config,
    event::{
        CausationId, CorrelationId, EncodeError, EncodedEvent, EventContext, EventType,
        InvalidEventTypeName, Metadata, PersistedEvent,
    },
    registry::{DecodeError, DecodedPayload},
    snapshot::Snapshot,
    store::{AppendError, AppendRequest, EventFilter, Store, StoredEvent},
    strategy::StoreStrategy,
    stream::StreamId,
    tenant::{ProviderError, StoreProvider, TenantId},
};

/// Error returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    #[error("aggregate type `{0}` is not configured")]
    UnknownAggregateType(&'static str),
    #[error("cannot save an aggregate without unsaved events")]
    EmptyBatch,
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error("stream `{0}` has been deleted")]
    StreamDeleted(StreamId),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError<CodecError>),
    #[error(transparent)]
    Decode(#[from] DecodeError<CodecError>),
    /// The registry decoded a payload that is not an event of the aggregate.
    #[error("event type `{event_type}` is not an event of aggregate `{aggregate_type}`")]
    UnknownPayload {
        event_type: EventType,
        aggregate_type: &'static str,
    },
    #[error(transparent)]
    InvalidEventType(#[from] InvalidEventTypeName),
    #[error("codec error: {0}")]
    Codec(#[source] CodecError),
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError, CodecError> SessionError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    /// Whether the caller lost an optimistic concurrency race and should
    /// reload and retry.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl<StoreError, CodecError> From<AppendError<StoreError>> for SessionError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    fn from(err: AppendError<StoreError>) -> Self {
        match err {
            AppendError::EmptyBatch => Self::EmptyBatch,
            AppendError::Conflict(conflict) => Self::Conflict(conflict),
            AppendError::StreamDeleted(stream_id) => Self::StreamDeleted(stream_id),
            AppendError::InvalidEventType(err) => Self::InvalidEventType(err),
            AppendError::Store(err) => Self::Store(err),
        }
    }
}

impl<StoreError, CodecError> From<EncodeError<CodecError>> for SessionError<StoreError, CodecError>
where
    StoreError: std::error::Error + 'static,
    CodecError: std::error::Error + 'static,
{
    fn from(err: EncodeError<CodecError>) -> Self {
        match err {
            EncodeError::EventType(err) => Self::InvalidEventType(err),
            EncodeError::Codec(err) => Self::Codec(err),
        }
    }
}

type SessionResult<T, S, C> =
    Result<T, SessionError<<S as Store>::Error, <C as Codec>::Error>>;

/// A decoded event whose payload type is only known to the caller.
pub type DecodedEvent = PersistedEvent<DecodedPayload>;

/// Tenant-scoped unit of work.
pub struct Session<S: Store, C: Codec> {
    store: S,
    config: Arc<Config<C>>,
    tenant: TenantId,
    context: EventContext,
}

impl<S: Store, C: Codec> Session<S, C> {
    /// Bind `store`, which must already be scoped to `tenant`.
    #[must_use]
    pub fn new(store: S, config: Arc<Config<C>>, tenant: TenantId) -> Self {
        Self {
            store,
            config,
            tenant,
            context: EventContext::default(),
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<CorrelationId>) -> Self {
        self.context.correlation_id = correlation_id.into();
        self
    }

    #[must_use]
    pub fn with_causation_id(mut self, causation_id: impl Into<CausationId>) -> Self {
        self.context.causation_id = causation_id.into();
        self
    }

    pub fn set_correlation_id(&mut self, correlation_id: impl Into<CorrelationId>) {
        self.context.correlation_id = correlation_id.into();
    }

    pub fn set_causation_id(&mut self, causation_id: impl Into<CausationId>) {
        self.context.causation_id = causation_id.into();
    }

    /// Metadata applied to every subsequent save.
    pub const fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.context.metadata
    }

    /// Insert one metadata entry, replacing any previous value for `key`.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.context.metadata.insert(key.into(), value.into());
    }

    #[must_use]
    pub const fn context(&self) -> &EventContext {
        &self.context
    }

    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &Config<C> {
        &self.config
    }

    fn strategy_for<A: AggregateState>(
        &self,
    ) -> SessionResult<StoreStrategy, S, C> {
        self.config
            .aggregate(A::AGGREGATE_TYPE)
            .map(|config| config.strategy)
            .ok_or(SessionError::UnknownAggregateType(A::AGGREGATE_TYPE))
    }

    /// Bring `aggregate` up to date using its configured strategy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownAggregateType`] if the aggregate type is
    /// not configured, or any store, snapshot or decode failure.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            tenant = %self.tenant,
            stream_id = %aggregate.stream_id(),
            version = aggregate.version()
        )
    )]
    pub fn load_aggregate<A>(&self, aggregate: &mut Aggregate<A>) -> SessionResult<(), S, C>
    where
        A: AggregateState + DeserializeOwned,
    {
        let strategy = self.strategy_for::<A>()?;
        strategy.load(self, aggregate)?;
        tracing::debug!(%strategy, version = aggregate.version(), "aggregate loaded");
        Ok(())
    }

    /// Load the aggregate with the given id. A stream with no events yields a
    /// fresh aggregate at version 0.
    ///
    /// # Errors
    ///
    /// See [`load_aggregate`](Self::load_aggregate).
    pub fn load<A>(&self, id: impl Into<String>) -> SessionResult<Aggregate<A>, S, C>
    where
        A: AggregateState + DeserializeOwned,
    {
        let mut aggregate = Aggregate::with_id(id);
        self.load_aggregate(&mut aggregate)?;
        Ok(aggregate)
    }

    /// Persist the aggregate's unsaved events using its configured strategy.
    ///
    /// On failure the unsaved events are left in place so the caller can
    /// inspect or retry them.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Conflict`] if another writer got there first
    /// (see [`SessionError::is_conflict`]), [`SessionError::EmptyBatch`] when
    /// an event-sourced aggregate has nothing to save, and any encode or store
    /// failure.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            tenant = %self.tenant,
            stream_id = %aggregate.stream_id(),
            version = aggregate.version()
        )
    )]
    pub fn save<A>(&self, aggregate: &mut Aggregate<A>) -> SessionResult<(), S, C>
    where
        A: AggregateState + Serialize,
    {
        let strategy = self.strategy_for::<A>()?;
        strategy.save(self, aggregate).inspect_err(|err| {
            if err.is_conflict() {
                tracing::debug!(error = %err, "save lost a concurrency race");
            }
        })
    }

    /// Read events matching `filter` and decode them through the registry.
    ///
    /// # Errors
    ///
    /// Returns a store error, or [`SessionError::Decode`] when an event type
    /// has no registered decoder.
    #[tracing::instrument(skip(self), fields(tenant = %self.tenant))]
    pub fn load_events(&self, filter: &EventFilter) -> SessionResult<Vec<DecodedEvent>, S, C> {
        let stored = self.store.load_events(filter).map_err(SessionError::Store)?;
        stored.into_iter().map(|event| self.decode(event)).collect()
    }

    /// Every event of one stream, decoded.
    ///
    /// # Errors
    ///
    /// See [`load_events`](Self::load_events).
    pub fn load_stream(&self, stream_id: &StreamId) -> SessionResult<Vec<DecodedEvent>, S, C> {
        self.load_events(&EventFilter::for_stream(stream_id.clone()))
    }

    /// Close the underlying store handle.
    ///
    /// # Errors
    ///
    /// Returns the store's error if closing fails.
    pub fn close(&self) -> SessionResult<(), S, C> {
        self.store.close().map_err(SessionError::Store)
    }

    fn decode(&self, event: StoredEvent) -> SessionResult<DecodedEvent, S, C> {
        let registry = self.config.registry();
        let codec = self.config.codec();
        event
            .try_map(|event_type, bytes| registry.decode(codec, event_type, &bytes))
            .map_err(SessionError::Decode)
    }

    /// Replay every event after the aggregate's current version.
    pub(crate) fn catch_up<A: AggregateState>(
        &self,
        aggregate: &mut Aggregate<A>,
    ) -> SessionResult<(), S, C> {
        let filter =
            EventFilter::for_stream(aggregate.stream_id()).from_version(aggregate.version() + 1);
        let events = self
            .load_events(&filter)?
            .into_iter()
            .map(|event| {
                event.try_map(|event_type, payload| {
                    A::Event::from_payload(payload).map_err(|_| SessionError::UnknownPayload {
                        event_type: event_type.clone(),
                        aggregate_type: A::AGGREGATE_TYPE,
                    })
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::trace!(event_count = events.len(), "replaying events");
        aggregate.load(events);
        Ok(())
    }

    /// Append the aggregate's unsaved events, expecting the stream to end at
    /// the aggregate's version, and clear them on success.
    pub(crate) fn append<A: AggregateState>(
        &self,
        aggregate: &mut Aggregate<A>,
        snapshot: Option<Snapshot>,
    ) -> SessionResult<(), S, C> {
        let codec = self.config.codec();
        let events = aggregate
            .unsaved_events()
            .into_iter()
            .map(|event| event.try_map(|data| EncodedEvent::encode(&data, codec)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut request = AppendRequest::new(aggregate.stream_id(), events, aggregate.version())
            .context(self.context.clone());
        if let Some(snapshot) = snapshot {
            request = request.snapshot(snapshot);
        }

        let result = self.store.save_events(request)?;
        aggregate.clear_unsaved_events();
        tracing::debug!(
            version = result.version,
            last_global_sequence = result.last_global_sequence,
            "aggregate saved"
        );
        Ok(())
    }
}

impl<S, C> std::fmt::Debug for Session<S, C>
where
    S: Store + std::fmt::Debug,
    C: Codec,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tenant", &self.tenant)
            .field("store", &self.store)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Opens sessions against the stores of a [`StoreProvider`].
pub struct SessionProvider<P: StoreProvider, C: Codec> {
    provider: P,
    config: Arc<Config<C>>,
}

impl<P: StoreProvider, C: Codec> SessionProvider<P, C> {
    #[must_use]
    pub const fn new(provider: P, config: Arc<Config<C>>) -> Self {
        Self { provider, config }
    }

    /// Open a session scoped to `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::TenantNotFound`] if the tenant does not exist.
    pub fn session(&self, tenant: &TenantId) -> Result<Session<P::Store, C>, ProviderError> {
        let store = self.provider.store(tenant)?;
        tracing::trace!(%tenant, "session opened");
        Ok(Session::new(store, Arc::clone(&self.config), tenant.clone()))
    }

    #[must_use]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    pub fn config(&self) -> &Config<C> {
        &self.config
    }
}

impl<P, C> std::fmt::Debug for SessionProvider<P, C>
where
    P: StoreProvider + std::fmt::Debug,
    C: Codec,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("provider", &self.provider)
            .field("config", &self.config)
            .finish()
    }
}
