//! Versioned Events Example
//!
//! Demonstrates evolving an event schema over time. Each schema version of an
//! event is its own payload type with its own structural type name
//! (`Order_Placed_V1`, `Order_Placed_V2`), so stored bytes always decode into
//! the shape they were written with. The aggregate keeps accepting the old
//! version and upgrades it while applying.
//!
//! Real-world scenario: an order management system where
//! - V1: basic orders (product + quantity)
//! - V2: added customer tracking (`customer_id`)
//!
//! Run with: `cargo run --example versioned_events --features test-util`

use keel::{
    AggregateConfig, AggregateState, Apply, Config, DomainEvent, EventType, Session,
    store::{EventFilter, inmemory},
    tenant::TenantId,
    test::SessionTestExt,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// =============================================================================
// Event versions
// =============================================================================

/// V1: original schema, still present in old streams.
#[derive(Clone, Debug, Serialize, Deserialize, DomainEvent)]
#[event(type_name = "Order_Placed_V1")]
pub struct OrderPlacedV1 {
    pub product_sku: String,
    pub quantity: u32,
}

/// V2: current schema, written by new code.
#[derive(Clone, Debug, Serialize, Deserialize, DomainEvent)]
#[event(type_name = "Order_Placed_V2")]
pub struct OrderPlaced {
    pub product_sku: String,
    pub quantity: u32,
    pub customer_id: String,
}

impl From<OrderPlacedV1> for OrderPlaced {
    fn from(v1: OrderPlacedV1) -> Self {
        Self {
            product_sku: v1.product_sku,
            quantity: v1.quantity,
            customer_id: "UNKNOWN".to_string(), // Default for legacy events
        }
    }
}

// =============================================================================
// Aggregate
// =============================================================================

#[derive(Debug, Default, Serialize, Deserialize, AggregateState)]
#[aggregate(kind = "order", events(OrderPlacedV1, OrderPlaced), derives(Debug))]
pub struct OrderBook {
    lines: Vec<OrderPlaced>,
}

impl Apply<OrderPlaced> for OrderBook {
    fn apply(&mut self, event: &OrderPlaced) {
        self.lines.push(event.clone());
    }
}

impl Apply<OrderPlacedV1> for OrderBook {
    fn apply(&mut self, event: &OrderPlacedV1) {
        Apply::<OrderPlaced>::apply(self, &OrderPlaced::from(event.clone()));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Versioned Events Example ===\n");

    let config = Config::builder()
        .aggregate::<OrderBook>(AggregateConfig::event_sourced())?
        .build();
    let mut session = Session::new(inmemory::Store::new(), config, TenantId::from("shop"));

    // History written by the previous release.
    println!("1. Seeding two V1 events, as the old release wrote them");
    session.seed_events::<OrderBook>(
        "ORD-1",
        vec![
            OrderPlacedV1 {
                product_sku: "WIDGET".into(),
                quantity: 2,
            }
            .into(),
            OrderPlacedV1 {
                product_sku: "GADGET".into(),
                quantity: 1,
            }
            .into(),
        ],
    )?;

    // The current release writes V2 with request metadata.
    println!("2. Appending a V2 event from the current release");
    session.insert_metadata("client_version", "2.0.0");
    let mut book = session.load::<OrderBook>("ORD-1")?;
    book.apply(OrderPlaced {
        product_sku: "GIZMO".into(),
        quantity: 5,
        customer_id: "CUST-42".into(),
    });
    session.save(&mut book)?;

    println!("3. Stored event types:");
    for event in session.load_events(&EventFilter::for_stream(book.stream_id()))? {
        let client = event
            .metadata
            .get("client_version")
            .and_then(|value| value.as_str())
            .unwrap_or("-");
        println!("   v{} {} (client {client})", event.version, event.event_type);
    }

    println!("\n4. Replayed state, every line upgraded to the current shape:");
    let book = session.load::<OrderBook>("ORD-1")?;
    for line in &book.state().lines {
        println!(
            "   {} x{} for {}",
            line.product_sku, line.quantity, line.customer_id
        );
    }

    let v1 = EventType::of::<OrderPlacedV1>()?;
    let v2 = EventType::of::<OrderPlaced>()?;
    println!(
        "\n{} and {} share aggregate and name but are distinct types: {}",
        v1,
        v2,
        v1 != v2
    );

    Ok(())
}
