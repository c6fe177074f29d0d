//! Calculator domain shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use keel::{
    AggregateConfig, AggregateState, Apply, Config, DomainEvent, Session, store::inmemory,
    tenant::TenantId,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Calculator")]
pub struct Added {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Calculator")]
pub struct Subtracted {
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Calculator")]
pub struct Updated {
    pub value: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, AggregateState)]
#[aggregate(events(Added, Subtracted, Updated), derives(Debug, PartialEq, Eq))]
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

pub type TestSession = Session<inmemory::Store, keel::JsonCodec>;

pub fn config(aggregate: AggregateConfig) -> Arc<Config> {
    Config::builder()
        .aggregate::<Calculator>(aggregate)
        .expect("calculator events are valid")
        .build()
}

pub fn session(aggregate: AggregateConfig) -> TestSession {
    Session::new(inmemory::Store::new(), config(aggregate), TenantId::from("test"))
}

/// Two sessions onto the same store, as two concurrent processes would have.
pub fn session_pair(aggregate: AggregateConfig) -> (TestSession, TestSession) {
    let config = config(aggregate);
    let store = inmemory::Store::new();
    let tenant = TenantId::from("test");
    (
        Session::new(store.clone(), Arc::clone(&config), tenant.clone()),
        Session::new(store, config, tenant),
    )
}
