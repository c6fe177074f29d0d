//! Tenant lifecycle and per-tenant store handles.
//!
//! Every [`Store`] handle is scoped to exactly one tenant. A
//! [`StoreProvider`] creates and deletes tenants and hands out those handles;
//! [`SessionProvider`](crate::session::SessionProvider) layers sessions on top.

pub mod inmemory;

use thiserror::Error;

use crate::{id::string_id, store::Store};

string_id!(
    /// Identifies an isolated tenant.
    TenantId
);

/// Error raised by tenant and store providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("tenant `{0}` already exists")]
    TenantAlreadyExists(TenantId),
    #[error("tenant `{0}` not found")]
    TenantNotFound(TenantId),
    #[error("provider is closed")]
    Closed,
}

/// Manages the set of tenants.
pub trait TenantProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ProviderError::TenantAlreadyExists`] if `tenant` exists.
    fn create_tenant(&self, tenant: &TenantId) -> Result<(), ProviderError>;

    /// Delete a tenant and everything it stores.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::TenantNotFound`] if `tenant` does not exist.
    fn delete_tenant(&self, tenant: &TenantId) -> Result<(), ProviderError>;

    /// # Errors
    ///
    /// Returns a provider error if the lookup fails.
    fn tenant_exists(&self, tenant: &TenantId) -> Result<bool, ProviderError>;
}

/// Issues tenant-scoped store handles.
pub trait StoreProvider: TenantProvider {
    type Store: Store;

    /// A handle bound to `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::TenantNotFound`] if `tenant` does not exist.
    fn store(&self, tenant: &TenantId) -> Result<Self::Store, ProviderError>;

    /// Shut the provider down. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns a provider error if releasing resources fails.
    fn close(&self) -> Result<(), ProviderError>;
}
