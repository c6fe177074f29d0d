//! Hand-written calculator aggregate shared by unit tests.

use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregateState, Apply, EventUnion},
    codec::Codec,
    event::{DomainEvent, EventType, InvalidEventTypeName, Payload},
    registry::{DecodedPayload, RegistryBuilder, RegistryError},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Added {
    pub value: i64,
}

impl DomainEvent for Added {
    const TYPE_NAME: &'static str = "Calculator_Added_V1";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtracted {
    pub value: i64,
}

impl DomainEvent for Subtracted {
    const TYPE_NAME: &'static str = "Calculator_Subtracted_V1";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Updated {
    pub value: i64,
}

impl DomainEvent for Updated {
    const TYPE_NAME: &'static str = "Calculator_Updated_V1";
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CalculatorEvent {
    Added(Added),
    Subtracted(Subtracted),
    Updated(Updated),
}

impl From<Added> for CalculatorEvent {
    fn from(event: Added) -> Self {
        Self::Added(event)
    }
}

impl From<Subtracted> for CalculatorEvent {
    fn from(event: Subtracted) -> Self {
        Self::Subtracted(event)
    }
}

impl From<Updated> for CalculatorEvent {
    fn from(event: Updated) -> Self {
        Self::Updated(event)
    }
}

impl Serialize for CalculatorEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Added(inner) => inner.serialize(serializer),
            Self::Subtracted(inner) => inner.serialize(serializer),
            Self::Updated(inner) => inner.serialize(serializer),
        }
    }
}

impl Payload for CalculatorEvent {
    fn event_type(&self) -> Result<EventType, InvalidEventTypeName> {
        match self {
            Self::Added(inner) => inner.event_type(),
            Self::Subtracted(inner) => inner.event_type(),
            Self::Updated(inner) => inner.event_type(),
        }
    }
}

impl EventUnion for CalculatorEvent {
    const TYPE_NAMES: &'static [&'static str] =
        &[Added::TYPE_NAME, Subtracted::TYPE_NAME, Updated::TYPE_NAME];

    fn from_payload(payload: DecodedPayload) -> Result<Self, DecodedPayload> {
        let payload = match payload.downcast::<Added>() {
            Ok(inner) => return Ok(Self::Added(*inner)),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<Subtracted>() {
            Ok(inner) => return Ok(Self::Subtracted(*inner)),
            Err(payload) => payload,
        };
        match payload.downcast::<Updated>() {
            Ok(inner) => Ok(Self::Updated(*inner)),
            Err(payload) => Err(payload),
        }
    }

    fn register<C: Codec>(
        builder: RegistryBuilder<C>,
    ) -> Result<RegistryBuilder<C>, RegistryError> {
        builder
            .register::<Added>()?
            .register::<Subtracted>()?
            .register::<Updated>()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calculator {
    pub value: i64,
}

impl Apply<Added> for Calculator {
    fn apply(&mut self, event: &Added) {
        self.value += event.value;
    }
}

impl Apply<Subtracted> for Calculator {
    fn apply(&mut self, event: &Subtracted) {
        self.value -= event.value;
    }
}

impl Apply<Updated> for Calculator {
    fn apply(&mut self, event: &Updated) {
        self.value = event.value;
    }
}

impl AggregateState for Calculator {
    const AGGREGATE_TYPE: &'static str = "calculator";
    const SCHEMA_VERSION: u32 = 1;
    type Event = CalculatorEvent;

    fn reduce(mut self, event: &Self::Event) -> Self {
        match event {
            CalculatorEvent::Added(inner) => Apply::apply(&mut self, inner),
            CalculatorEvent::Subtracted(inner) => Apply::apply(&mut self, inner),
            CalculatorEvent::Updated(inner) => Apply::apply(&mut self, inner),
        }
        self
    }
}
