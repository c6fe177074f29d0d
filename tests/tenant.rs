//! Integration tests for tenant isolation.

mod common;

use common::{Added, Calculator, config};
use keel::{
    Aggregate, AggregateConfig, SessionProvider,
    snapshot::SnapshotId,
    store::{EventFilter, Store as _},
    tenant::{ProviderError, StoreProvider, TenantId, TenantProvider, inmemory::Provider},
};

fn provider_with(tenants: &[&str]) -> SessionProvider<Provider, keel::JsonCodec> {
    let provider = Provider::new();
    for tenant in tenants {
        provider.create_tenant(&TenantId::from(*tenant)).unwrap();
    }
    SessionProvider::new(provider, config(AggregateConfig::snapshot_assisted()))
}

#[test]
fn same_stream_id_in_two_tenants_is_independent() {
    let sessions = provider_with(&["acme", "globex"]);
    let acme = sessions.session(&TenantId::from("acme")).unwrap();
    let globex = sessions.session(&TenantId::from("globex")).unwrap();

    let mut a = Aggregate::<Calculator>::with_id("shared");
    a.apply(Added { value: 1 });
    a.apply(Added { value: 2 });
    acme.save(&mut a).unwrap();

    let mut g = Aggregate::<Calculator>::with_id("shared");
    g.apply(Added { value: 100 });
    globex.save(&mut g).unwrap();

    let from_acme = acme.load::<Calculator>("shared").unwrap();
    let from_globex = globex.load::<Calculator>("shared").unwrap();
    assert_eq!((from_acme.state().value, from_acme.version()), (3, 2));
    assert_eq!((from_globex.state().value, from_globex.version()), (100, 1));

    // Global sequences and snapshots are per tenant as well.
    let globex_events = globex.load_events(&EventFilter::all()).unwrap();
    assert_eq!(globex_events[0].global_sequence, 1);
    let snapshot_id = SnapshotId::new(a.stream_id(), 1);
    assert_eq!(
        acme.store().load_snapshot(&snapshot_id).unwrap().unwrap().version,
        2
    );
    assert_eq!(
        globex.store().load_snapshot(&snapshot_id).unwrap().unwrap().version,
        1
    );
}

#[test]
fn deleting_a_tenant_leaves_others_untouched() {
    let sessions = provider_with(&["acme", "globex"]);
    let globex = sessions.session(&TenantId::from("globex")).unwrap();
    let mut g = Aggregate::<Calculator>::with_id("c1");
    g.apply(Added { value: 5 });
    globex.save(&mut g).unwrap();

    sessions
        .provider()
        .delete_tenant(&TenantId::from("acme"))
        .unwrap();

    assert!(matches!(
        sessions.session(&TenantId::from("acme")),
        Err(ProviderError::TenantNotFound(_))
    ));
    assert_eq!(globex.load::<Calculator>("c1").unwrap().state().value, 5);
}

#[test]
fn sessions_for_one_tenant_share_history() {
    let sessions = provider_with(&["acme"]);
    let tenant = TenantId::from("acme");
    let writer = sessions.session(&tenant).unwrap();
    let reader = sessions.session(&tenant).unwrap();

    let mut aggregate = Aggregate::<Calculator>::with_id("c1");
    aggregate.apply(Added { value: 9 });
    writer.save(&mut aggregate).unwrap();
    writer.close().unwrap();

    assert_eq!(reader.load::<Calculator>("c1").unwrap().state().value, 9);
}

#[test]
fn closed_provider_issues_no_sessions() {
    let sessions = provider_with(&["acme"]);
    sessions.provider().close().unwrap();
    assert!(matches!(
        sessions.session(&TenantId::from("acme")),
        Err(ProviderError::Closed)
    ));
}
