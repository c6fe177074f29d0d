//! A minimal example demonstrating the core concepts of event sourcing.
//!
//! Run with: `cargo run --example quickstart`

// NB: the 'ANCHOR's support embedding in mdbook in docs/ directory.

// ANCHOR: full_example
use keel::{
    Aggregate, AggregateConfig, AggregateState, Apply, Config, DomainEvent, Session,
    store::{EventFilter, inmemory},
    tenant::TenantId,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

// ANCHOR: events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Account")]
pub struct Opened {
    pub owner: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Account")]
pub struct Deposited {
    pub amount: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DomainEvent)]
#[event(aggregate = "Account")]
pub struct Withdrawn {
    pub amount: i64,
}
// ANCHOR_END: events

// ANCHOR: aggregate
#[derive(Debug, Default, Serialize, Deserialize, AggregateState)]
#[aggregate(events(Opened, Deposited, Withdrawn), derives(Debug, PartialEq, Eq))]
pub struct Account {
    owner: String,
    balance: i64,
}

impl Apply<Opened> for Account {
    fn apply(&mut self, event: &Opened) {
        self.owner.clone_from(&event.owner);
    }
}

impl Apply<Deposited> for Account {
    fn apply(&mut self, event: &Deposited) {
        self.balance += event.amount;
    }
}

impl Apply<Withdrawn> for Account {
    fn apply(&mut self, event: &Withdrawn) {
        self.balance -= event.amount;
    }
}
// ANCHOR_END: aggregate

// ANCHOR: operations
/// Business rules live in front of `apply`: they decide which events happen.
pub trait AccountOperations {
    fn deposit(&mut self, amount: i64) -> Result<(), String>;
    fn withdraw(&mut self, amount: i64) -> Result<(), String>;
}

impl AccountOperations for Aggregate<Account> {
    fn deposit(&mut self, amount: i64) -> Result<(), String> {
        if amount <= 0 {
            return Err("amount must be positive".into());
        }
        self.apply(Deposited { amount });
        Ok(())
    }

    fn withdraw(&mut self, amount: i64) -> Result<(), String> {
        if amount > self.state().balance {
            return Err("insufficient funds".into());
        }
        self.apply(Withdrawn { amount });
        Ok(())
    }
}
// ANCHOR_END: operations

// ANCHOR: main
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::builder()
        .aggregate::<Account>(AggregateConfig::event_sourced())?
        .build();
    let session = Session::new(inmemory::Store::new(), config, TenantId::from("demo"))
        .with_correlation_id("quickstart");

    // Open an account and record a few movements.
    let mut account = Aggregate::<Account>::with_id("ACC-001");
    account.apply(Opened {
        owner: "Ada".into(),
    });
    account.deposit(100)?;
    account.withdraw(30)?;
    session.save(&mut account)?;

    // A fresh load replays the stream.
    let mut account = session.load::<Account>("ACC-001")?;
    println!(
        "{} has {} after {} events",
        account.state().owner,
        account.state().balance,
        account.version()
    );
    assert_eq!(account.state().balance, 70);

    if let Err(reason) = account.withdraw(500) {
        println!("withdrawal refused: {reason}");
    }
    assert!(!account.has_unsaved_changes());

    for event in session.load_events(&EventFilter::for_stream(account.stream_id()))? {
        println!(
            "#{} {} (correlation {})",
            event.version, event.event_type, event.correlation_id
        );
    }

    Ok(())
}
// ANCHOR_END: main
// ANCHOR_END: full_example
