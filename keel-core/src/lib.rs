//! Core traits and types for the keel event-sourcing library.
//!
//! - [`event`] - Events, their persisted form and structural event types
//! - [`registry`] - Event-type keyed payload decoders
//! - [`aggregate`] - Aggregate state, `Apply`, and the `Aggregate` wrapper
//! - [`store`] - Store contract and the in-memory reference store
//! - [`strategy`] - Event-sourced and snapshot-assisted persistence
//! - [`config`] / [`session`] - Per-aggregate policy and the unit of work
//! - [`tenant`] - Tenant lifecycle and tenant-scoped store handles
//!
//! # Example
//!
//! ```
//! use keel_core::{config::Config, session::Session, store::inmemory, tenant::TenantId};
//!
//! let config = Config::builder().build();
//! let session = Session::new(inmemory::Store::new(), config, TenantId::from("acme"));
//! assert_eq!(session.tenant().as_str(), "acme");
//! ```
//!
//! Most users should depend on the `keel` crate, which re-exports these types
//! together with the derive macros.

pub mod aggregate;
pub mod codec;
pub mod concurrency;
pub mod config;
pub mod event;
pub mod id;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod strategy;
pub mod stream;
pub mod tenant;



#[cfg(test)]
mod fixtures;
