//! How an aggregate type is reconstructed and persisted.
//!
//! A strategy is a policy selected per aggregate type in
//! [`Config`](crate::config::Config). It holds no state of its own; the
//! session resolves it on every load and save.
//!
//! - [`StoreStrategy::EventSourced`] replays the full stream and appends only
//!   events.
//! - [`StoreStrategy::SnapshotAssisted`] starts from the stored snapshot when
//!   one exists, and appends every batch together with a fresh snapshot, so the
//!   stored snapshot always matches the post-append stream version.

use std::{fmt, str::FromStr};

use heck::ToSnakeCase;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    aggregate::{Aggregate, AggregateState},
    codec::Codec,
    config::ConfigError,
    session::{Session, SessionError},
    store::Store,
};

/// Reconstruction and persistence policy for an aggregate type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum StoreStrategy {
    /// Replay every event; append events only.
    #[default]
    EventSourced,
    /// Load from snapshot plus catch-up; append events with a snapshot.
    SnapshotAssisted,
}

impl StoreStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EventSourced => "EventSourced",
            Self::SnapshotAssisted => "SnapshotAssisted",
        }
    }

    /// Bring `aggregate` up to date with its stream.
    pub(crate) fn load<S, C, A>(
        self,
        session: &Session<S, C>,
        aggregate: &mut Aggregate<A>,
    ) -> Result<(), SessionError<S::Error, C::Error>>
    where
        S: Store,
        C: Codec,
        A: AggregateState + DeserializeOwned,
    {
        if self == Self::SnapshotAssisted {
            let snapshot = session
                .store()
                .load_snapshot(&aggregate.snapshot_id())
                .map_err(SessionError::Store)?;
            match snapshot {
                // A snapshot at or below the current version adds nothing.
                Some(snapshot) if snapshot.version > aggregate.version() => {
                    aggregate.load_snapshot(&snapshot, session.config().codec())?;
                    tracing::debug!(
                        snapshot_version = snapshot.version,
                        "aggregate restored from snapshot"
                    );
                }
                Some(snapshot) => tracing::trace!(
                    snapshot_version = snapshot.version,
                    "snapshot not ahead of aggregate, skipping"
                ),
                None => tracing::trace!("no snapshot stored"),
            }
        }
        session.catch_up(aggregate)
    }

    /// Persist the aggregate's unsaved events.
    pub(crate) fn save<S, C, A>(
        self,
        session: &Session<S, C>,
        aggregate: &mut Aggregate<A>,
    ) -> Result<(), SessionError<S::Error, C::Error>>
    where
        S: Store,
        C: Codec,
        A: AggregateState + Serialize,
    {
        match self {
            Self::EventSourced => {
                if !aggregate.has_unsaved_changes() {
                    return Err(SessionError::EmptyBatch);
                }
                session.append(aggregate, None)
            }
            Self::SnapshotAssisted => {
                if !aggregate.has_unsaved_changes() {
                    tracing::trace!("nothing to save");
                    return Ok(());
                }
                let snapshot = aggregate
                    .snapshot(session.config().codec())
                    .map_err(SessionError::Codec)?;
                session.append(aggregate, Some(snapshot))
            }
        }
    }
}

impl fmt::Display for StoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `EventSourced`, `event-sourced` or `event_sourced` (and likewise
/// for `SnapshotAssisted`).
impl FromStr for StoreStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_snake_case().as_str() {
            "event_sourced" => Ok(Self::EventSourced),
            "snapshot_assisted" => Ok(Self::SnapshotAssisted),
            _ => Err(ConfigError::UnknownStoreStrategy(s.to_owned())),
        }
    }
}

impl TryFrom<String> for StoreStrategy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for StoreStrategy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
