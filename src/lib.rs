#![doc = include_str!("../README.md")]

#[cfg(feature = "test-util")]
pub use keel_core::test;
pub use keel_core::{
    aggregate,
    aggregate::{Aggregate, AggregateState, Apply, EventUnion, SnapshotError},
    codec,
    codec::{Codec, JsonCodec},
    concurrency::ConcurrencyConflict,
    config,
    config::{AggregateConfig, Config, ConfigBuilder, ConfigError},
    event,
    event::{
        DomainEvent, EncodedEvent, Event, EventContext, EventId, EventType, Payload,
        PersistedEvent,
    },
    id, registry,
    session,
    session::{Session, SessionError, SessionProvider},
    strategy::StoreStrategy,
    stream::{Stream, StreamId},
};
// Re-export proc macro derives so consumers only depend on `keel`.
pub use keel_macros::{AggregateState, DomainEvent};

pub mod store {

    pub use keel_core::store::{
        AppendError, AppendRequest, AppendResult, EventFilter, Store, StoredEvent,
    };

    pub use keel_core::store::inmemory;
}

pub mod snapshot {

    pub use keel_core::snapshot::{Snapshot, SnapshotId};
}

pub mod tenant {

    pub use keel_core::tenant::{
        ProviderError, StoreProvider, TenantId, TenantProvider, inmemory,
    };
}
