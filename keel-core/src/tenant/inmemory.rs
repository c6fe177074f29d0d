//! In-memory tenant provider.

use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use super::{ProviderError, StoreProvider, TenantId, TenantProvider};
use crate::store::inmemory::{SharedState, Store};

/// Holds one isolated in-memory state per tenant.
///
/// Handles returned by [`store`](StoreProvider::store) share their tenant's
/// state. A handle kept across [`delete_tenant`](TenantProvider::delete_tenant)
/// still works but sees orphaned state that no new handle can reach.
#[derive(Debug, Default)]
pub struct Provider {
    tenants: RwLock<HashMap<TenantId, SharedState>>,
    closed: AtomicBool,
}

impl Provider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), ProviderError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProviderError::Closed);
        }
        Ok(())
    }
}

impl TenantProvider for Provider {
    #[tracing::instrument(skip(self))]
    fn create_tenant(&self, tenant: &TenantId) -> Result<(), ProviderError> {
        self.ensure_open()?;
        let mut tenants = self.tenants.write().expect("tenant map lock poisoned");
        if tenants.contains_key(tenant) {
            return Err(ProviderError::TenantAlreadyExists(tenant.clone()));
        }
        tenants.insert(tenant.clone(), SharedState::default());
        tracing::debug!("tenant created");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn delete_tenant(&self, tenant: &TenantId) -> Result<(), ProviderError> {
        self.ensure_open()?;
        let mut tenants = self.tenants.write().expect("tenant map lock poisoned");
        tenants
            .remove(tenant)
            .ok_or_else(|| ProviderError::TenantNotFound(tenant.clone()))?;
        tracing::debug!("tenant deleted");
        Ok(())
    }

    fn tenant_exists(&self, tenant: &TenantId) -> Result<bool, ProviderError> {
        self.ensure_open()?;
        let tenants = self.tenants.read().expect("tenant map lock poisoned");
        Ok(tenants.contains_key(tenant))
    }
}

impl StoreProvider for Provider {
    type Store = Store;

    fn store(&self, tenant: &TenantId) -> Result<Store, ProviderError> {
        self.ensure_open()?;
        let tenants = self.tenants.read().expect("tenant map lock poisoned");
        let state = tenants
            .get(tenant)
            .ok_or_else(|| ProviderError::TenantNotFound(tenant.clone()))?;
        Ok(Store::with_state(Arc::clone(state)))
    }

    fn close(&self) -> Result<(), ProviderError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("tenant provider closed");
        }
        Ok(())
    }
}
