//! Demonstrates optimistic concurrency control for handling concurrent writes.
//!
//! Every save declares the version the stream should reach. If another writer
//! got there first, the save fails with a conflict and nothing is written;
//! the caller reloads and decides again against fresh state.
//!
//! Run with: `cargo run --example optimistic_concurrency`

use std::sync::Arc;

use keel::{
    Aggregate, AggregateConfig, AggregateState, Apply, Config, DomainEvent, JsonCodec, Session,
    SessionError,
    store::inmemory,
    tenant::TenantId,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Domain Events
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Inventory")]
pub struct Reserved {
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Inventory")]
pub struct Restocked {
    pub quantity: u32,
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Default, Serialize, Deserialize, AggregateState)]
#[aggregate(kind = "inventory", events(Reserved, Restocked))]
pub struct InventoryItem {
    available: u32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum InventoryError {
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },
}

impl Apply<Reserved> for InventoryItem {
    fn apply(&mut self, event: &Reserved) {
        self.available = self.available.saturating_sub(event.quantity);
    }
}

impl Apply<Restocked> for InventoryItem {
    fn apply(&mut self, event: &Restocked) {
        self.available += event.quantity;
    }
}

fn reserve(item: &mut Aggregate<InventoryItem>, quantity: u32) -> Result<(), InventoryError> {
    let available = item.state().available;
    if quantity > available {
        return Err(InventoryError::InsufficientStock {
            requested: quantity,
            available,
        });
    }
    item.apply(Reserved { quantity });
    Ok(())
}

// =============================================================================
// Example Parts
// =============================================================================

type DemoSession = Session<inmemory::Store, JsonCodec>;

/// Two sessions onto one store stand in for two service instances.
fn two_writers() -> Result<(DemoSession, DemoSession), Box<dyn std::error::Error>> {
    let config = Config::builder()
        .aggregate::<InventoryItem>(AggregateConfig::event_sourced())?
        .build();
    let store = inmemory::Store::new();
    let tenant = TenantId::from("warehouse");
    Ok((
        Session::new(store.clone(), Arc::clone(&config), tenant.clone())
            .with_correlation_id("writer-a"),
        Session::new(store, config, tenant).with_correlation_id("writer-b"),
    ))
}

/// Part 1: a stale writer is rejected.
fn part1_conflict_detection(
    a: &DemoSession,
    b: &DemoSession,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("PART 1: Conflict detection\n");

    let mut item = Aggregate::<InventoryItem>::with_id("SKU-001");
    item.apply(Restocked { quantity: 100 });
    a.save(&mut item)?;
    println!("1. Writer A restocked 100 units (version {})", item.version());

    let mut seen_by_a = a.load::<InventoryItem>("SKU-001")?;
    let mut seen_by_b = b.load::<InventoryItem>("SKU-001")?;
    println!("2. Both writers loaded version {}", seen_by_a.version());

    reserve(&mut seen_by_a, 30)?;
    a.save(&mut seen_by_a)?;
    println!("3. Writer A reserved 30 units");

    reserve(&mut seen_by_b, 80)?;
    match b.save(&mut seen_by_b) {
        Err(SessionError::Conflict(conflict)) => {
            println!("4. Writer B was rejected: {conflict}");
            println!("   It missed {} event(s)\n", conflict.missed_events());
        }
        Ok(()) => println!("4. Unexpectedly succeeded!\n"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

/// Part 2: reload, re-check the business rule, retry.
fn part2_retry(b: &DemoSession, wanted: u32) -> Result<(), Box<dyn std::error::Error>> {
    println!("PART 2: Reload and retry\n");

    for attempt in 1..=3 {
        let mut item = b.load::<InventoryItem>("SKU-001")?;
        if let Err(err) = reserve(&mut item, wanted) {
            println!("   Attempt {attempt}: {err}");
            return Ok(());
        }
        match b.save(&mut item) {
            Ok(()) => {
                println!(
                    "   Attempt {attempt}: reserved {wanted}, {} left",
                    item.state().available
                );
                return Ok(());
            }
            Err(err) if err.is_conflict() => println!("   Attempt {attempt}: conflict, retrying"),
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

/// Print the summary of key takeaways.
fn print_summary() {
    println!("\n=== Example Complete ===");
    println!("\nKey takeaways:");
    println!("  1. A save declares the version the stream should reach after it");
    println!("  2. Conflicts are detected when the stream moved between load and save");
    println!("  3. Rejected saves write nothing and keep the aggregate's unsaved events");
    println!("  4. Retrying is the caller's decision, made against fresh state");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Optimistic Concurrency Example ===\n");

    let (a, b) = two_writers()?;
    part1_conflict_detection(&a, &b)?;

    println!("5. Writer B retries its 80-unit reservation:");
    part2_retry(&b, 80)?;
    println!("6. Writer B retries a 60-unit reservation:");
    part2_retry(&b, 60)?;

    print_summary();

    Ok(())
}
