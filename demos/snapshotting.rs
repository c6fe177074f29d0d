//! Snapshotting Example
//!
//! Demonstrates snapshot-assisted loading for long-lived aggregates with many
//! events.
//!
//! This example shows:
//! - **Strategy configuration**: the same aggregate type configured as
//!   `EventSourced` and as `SnapshotAssisted` in two tenants
//! - **Snapshot on save**: every snapshot-assisted save stores a snapshot at the
//!   post-append stream version, atomically with the events
//! - **Snapshot plus catch-up**: events appended behind the snapshot are still
//!   replayed on load
//! - **Schema bumps**: a snapshot of an older state schema is never loaded
//!
//! Run with: `cargo run --example snapshotting`

use keel::{
    Aggregate, AggregateConfig, AggregateState, Apply, Config, DomainEvent, EncodedEvent, Event,
    JsonCodec, SessionProvider,
    snapshot::SnapshotId,
    store::{AppendRequest, Store as _},
    tenant::{TenantId, TenantProvider, inmemory::Provider},
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Domain Events
// =============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Loyalty")]
pub struct PointsEarned {
    pub amount: u64,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Loyalty")]
pub struct PointsRedeemed {
    pub amount: u64,
    pub reward: String,
}

// =============================================================================
// Loyalty Account Aggregate
// =============================================================================

/// A loyalty account that accumulates points over time.
///
/// This is a good candidate for snapshotting because:
/// - Long-lived (customers stay for years)
/// - Many events (every purchase earns points)
/// - Simple state (just a balance)
#[derive(Debug, Default, Serialize, Deserialize, AggregateState)]
#[aggregate(kind = "loyalty", events(PointsEarned, PointsRedeemed))]
pub struct LoyaltyAccount {
    points: u64,
    lifetime_earned: u64,
    lifetime_redeemed: u64,
}

impl Apply<PointsEarned> for LoyaltyAccount {
    fn apply(&mut self, event: &PointsEarned) {
        self.points += event.amount;
        self.lifetime_earned += event.amount;
    }
}

impl Apply<PointsRedeemed> for LoyaltyAccount {
    fn apply(&mut self, event: &PointsRedeemed) {
        self.points = self.points.saturating_sub(event.amount);
        self.lifetime_redeemed += event.amount;
    }
}

// =============================================================================
// Example
// =============================================================================

type ExampleResult = Result<(), Box<dyn std::error::Error>>;

fn earn_many(account: &mut Aggregate<LoyaltyAccount>, count: u64) {
    for i in 1..=count {
        account.apply(PointsEarned {
            amount: 100,
            reason: format!("Purchase #{i}"),
        });
    }
}

fn main() -> ExampleResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Snapshotting Example ===\n");

    // One provider, two tenants, two configurations of the same aggregate.
    let provider = Provider::new();
    let replay = TenantId::from("replay");
    let snapshots = TenantId::from("snapshots");
    provider.create_tenant(&replay)?;
    provider.create_tenant(&snapshots)?;

    let replay_sessions = SessionProvider::new(
        provider,
        Config::builder()
            .aggregate::<LoyaltyAccount>(AggregateConfig::event_sourced())?
            .build(),
    );
    let replay_session = replay_sessions.session(&replay)?;

    println!("1. Event-sourced: no snapshots");
    let mut account = Aggregate::<LoyaltyAccount>::with_id("CUST-001");
    earn_many(&mut account, 10);
    replay_session.save(&mut account)?;
    let loaded = replay_session.load::<LoyaltyAccount>("CUST-001")?;
    let snapshot_id = loaded.snapshot_id();
    println!(
        "   Points: {} (replayed {} events), snapshot stored: {}\n",
        loaded.state().points,
        loaded.version(),
        replay_session.store().load_snapshot(&snapshot_id)?.is_some()
    );

    println!("2. Snapshot-assisted: snapshot written on every save");
    let config = Config::<JsonCodec>::builder()
        .aggregate::<LoyaltyAccount>(AggregateConfig::snapshot_assisted())?
        .build();
    let snapshot_sessions = SessionProvider::new(Provider::new(), config);
    snapshot_sessions.provider().create_tenant(&snapshots)?;
    let session = snapshot_sessions.session(&snapshots)?;

    let mut account = Aggregate::<LoyaltyAccount>::with_id("CUST-002");
    earn_many(&mut account, 5);
    session.save(&mut account)?;
    let snapshot_id = account.snapshot_id();
    let snapshot = session.store().load_snapshot(&snapshot_id)?.ok_or("snapshot missing")?;
    println!("   Snapshot `{}` at version {}\n", snapshot.id, snapshot.version);

    println!("3. Events written behind the snapshot are caught up on load");
    let redeemed = EncodedEvent::encode(
        &LoyaltyAccountEvent::from(PointsRedeemed {
            amount: 250,
            reward: "Free coffee".into(),
        }),
        &JsonCodec,
    )?;
    session.store().save_events(AppendRequest::new(
        account.stream_id(),
        vec![Event::new(redeemed)],
        account.version() + 1,
    ))?;
    let loaded = session.load::<LoyaltyAccount>("CUST-002")?;
    println!(
        "   Points: {} at version {} (snapshot at {} + 1 replayed event)\n",
        loaded.state().points,
        loaded.version(),
        snapshot.version
    );

    println!("4. A snapshot from another schema version is ignored");
    let stale = SnapshotId::new(account.stream_id(), 99);
    println!(
        "   Lookup for `{stale}` finds: {:?}",
        session.store().load_snapshot(&stale)?.map(|s| s.version)
    );

    println!("\n=== Example Complete ===");
    Ok(())
}
