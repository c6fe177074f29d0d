//! Session configuration.
//!
//! A [`Config`] is assembled once with [`ConfigBuilder`] and shared, read-only,
//! by every session. It holds the codec, the event registry and the
//! [`AggregateConfig`] of each aggregate type.

use std::{collections::HashMap, fmt, num::NonZeroU64, sync::Arc};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::{
    aggregate::{AggregateState, EventUnion},
    codec::{Codec, JsonCodec},
    event::{DomainEvent, EventType, InvalidEventTypeName},
    registry::{Registry, RegistryBuilder, RegistryError},
    strategy::StoreStrategy,
};

/// Error raised while building configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown store strategy `{0}`")]
    UnknownStoreStrategy(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    InvalidEventType(#[from] InvalidEventTypeName),
}

/// Per-aggregate-type policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AggregateConfig {
    pub strategy: StoreStrategy,
    /// Advisory hint for how often a snapshot is worth taking. Not enforced:
    /// snapshot-assisted aggregates snapshot on every save.
    pub snapshot_frequency: Option<NonZeroU64>,
}

impl AggregateConfig {
    #[must_use]
    pub const fn event_sourced() -> Self {
        Self {
            strategy: StoreStrategy::EventSourced,
            snapshot_frequency: None,
        }
    }

    #[must_use]
    pub const fn snapshot_assisted() -> Self {
        Self {
            strategy: StoreStrategy::SnapshotAssisted,
            snapshot_frequency: None,
        }
    }

    #[must_use]
    pub const fn snapshot_frequency(mut self, frequency: NonZeroU64) -> Self {
        self.snapshot_frequency = Some(frequency);
        self
    }
}

/// Immutable configuration shared by sessions.
pub struct Config<C: Codec = JsonCodec> {
    codec: C,
    registry: Registry<C>,
    aggregates: HashMap<String, AggregateConfig>,
}

impl Config<JsonCodec> {
    /// Builder using the bundled JSON codec.
    #[must_use]
    pub fn builder() -> ConfigBuilder<JsonCodec> {
        ConfigBuilder::new(JsonCodec)
    }
}

impl<C: Codec> Config<C> {
    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry<C> {
        &self.registry
    }

    /// Policy for an aggregate type, if one was configured.
    #[must_use]
    pub fn aggregate(&self, aggregate_type: &str) -> Option<&AggregateConfig> {
        self.aggregates.get(aggregate_type)
    }

    /// Configured aggregate types, in no particular order.
    pub fn aggregate_types(&self) -> impl Iterator<Item = &str> {
        self.aggregates.keys().map(String::as_str)
    }
}

impl<C: Codec> fmt::Debug for Config<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("registry", &self.registry)
            .field("aggregates", &self.aggregates)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`].
///
/// ```ignore
/// let config = Config::builder()
///     .aggregate::<Calculator>(AggregateConfig::snapshot_assisted())?
///     .build();
/// ```
pub struct ConfigBuilder<C: Codec> {
    codec: C,
    registry: RegistryBuilder<C>,
    aggregates: HashMap<String, AggregateConfig>,
}

impl<C: Codec> ConfigBuilder<C> {
    #[must_use]
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            registry: RegistryBuilder::new(),
            aggregates: HashMap::new(),
        }
    }

    /// Configure aggregate type `S` and register every one of its events.
    ///
    /// Configuring the same type again replaces its policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEventType`] if one of the event type
    /// names is malformed and [`ConfigError::Registry`] if an event type is
    /// already claimed by a different payload.
    pub fn aggregate<S: AggregateState>(
        mut self,
        config: AggregateConfig,
    ) -> Result<Self, ConfigError> {
        for name in <S::Event as EventUnion>::TYPE_NAMES {
            EventType::parse(name)?;
        }
        self.registry = <S::Event as EventUnion>::register(self.registry)?;
        tracing::debug!(
            aggregate_type = S::AGGREGATE_TYPE,
            strategy = %config.strategy,
            "aggregate configured"
        );
        self.aggregates.insert(S::AGGREGATE_TYPE.to_owned(), config);
        Ok(self)
    }

    /// Register an extra payload type that is not part of a configured
    /// aggregate, e.g. an older schema version kept readable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Registry`] if the type name is malformed or
    /// already claimed.
    pub fn register<T>(mut self) -> Result<Self, ConfigError>
    where
        T: DomainEvent + DeserializeOwned + Send + Sync + 'static,
    {
        self.registry = self.registry.register::<T>()?;
        Ok(self)
    }

    /// Freeze the configuration.
    #[must_use]
    pub fn build(self) -> Arc<Config<C>> {
        Arc::new(Config {
            codec: self.codec,
            registry: self.registry.build(),
            aggregates: self.aggregates,
        })
    }
}

impl<C: Codec> fmt::Debug for ConfigBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("registry", &self.registry)
            .field("aggregates", &self.aggregates)
            .finish_non_exhaustive()
    }
}

impl<C: Codec + Default> Default for ConfigBuilder<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}
