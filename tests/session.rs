//! Integration tests for loading and saving aggregates through a session.

mod common;

use common::{Added, Calculator, CalculatorEvent, Subtracted, Updated, session};
use keel::{
    Aggregate, AggregateConfig, SessionError, StreamId,
    session::DecodedEvent,
    snapshot::SnapshotId,
    store::{EventFilter, Store as _},
};

fn values(events: &[DecodedEvent]) -> Vec<i64> {
    events
        .iter()
        .map(|event| {
            event
                .data
                .downcast_ref::<Added>()
                .map(|added| added.value)
                .expect("only Added events were saved")
        })
        .collect()
}

#[test]
fn version_and_unsaved_events_track_applied_events() {
    for n in 0..6_i64 {
        let mut aggregate = Aggregate::<Calculator>::new();
        for value in 0..n {
            aggregate.apply(Added { value });
        }
        assert_eq!(aggregate.version(), n as u64);
        assert_eq!(aggregate.unsaved_events().len(), n as usize);

        aggregate.clear_unsaved_events();
        assert!(aggregate.unsaved_events().is_empty());
        assert_eq!(aggregate.version(), n as u64);
    }
}

#[test]
fn saved_aggregate_reloads_identically() {
    let session = session(AggregateConfig::event_sourced());
    let mut original = Aggregate::<Calculator>::with_id("c1");
    original.apply(Updated { value: 7 });
    original.apply(Added { value: 3 });
    original.apply(Subtracted { value: 1 });
    original.apply(Added { value: 11 });
    let expected_state = original.state().clone();
    let expected_version = original.version();

    session.save(&mut original).unwrap();
    let reloaded = session.load::<Calculator>("c1").unwrap();

    assert_eq!(reloaded.state(), &expected_state);
    assert_eq!(reloaded.version(), expected_version);
}

#[test]
fn calculator_scenario() {
    for strategy in [
        AggregateConfig::event_sourced(),
        AggregateConfig::snapshot_assisted(),
    ] {
        let session = session(strategy);
        let mut calculator = Aggregate::<Calculator>::with_id("calc");
        calculator.apply(Updated { value: 5 });
        calculator.apply(Added { value: 10 });
        calculator.apply(Subtracted { value: 3 });
        assert_eq!(calculator.state().value, 12);
        assert_eq!(calculator.version(), 3);

        session.save(&mut calculator).unwrap();

        let fresh = session.load::<Calculator>("calc").unwrap();
        assert_eq!(fresh.state().value, 12);
        assert_eq!(fresh.version(), 3);
        assert!(!fresh.has_unsaved_changes());
    }
}

#[test]
fn snapshot_assisted_load_matches_full_fold() {
    for k in 1..=4_i64 {
        let session = session(AggregateConfig::snapshot_assisted());
        let mut expected = Calculator::default();

        // First batch with no prior snapshot, second batch on top of one.
        for round in 0..2 {
            let mut aggregate = session.load::<Calculator>("c1").unwrap();
            for i in 0..k {
                let value = round * 10 + i;
                aggregate.apply(Added { value });
                expected.value += value;
            }
            session.save(&mut aggregate).unwrap();

            let loaded = session.load::<Calculator>("c1").unwrap();
            assert_eq!(loaded.state(), &expected);
            assert_eq!(loaded.version(), ((round + 1) * k) as u64);
        }
    }
}

#[test]
fn snapshot_tracks_stream_version_after_every_save() {
    let session = session(AggregateConfig::snapshot_assisted());
    for _ in 0..3 {
        let mut aggregate = session.load::<Calculator>("c1").unwrap();
        aggregate.apply(Added { value: 1 });
        aggregate.apply(Added { value: 1 });
        session.save(&mut aggregate).unwrap();

        let stream = session
            .store()
            .stream(&aggregate.stream_id())
            .unwrap()
            .unwrap();
        let snapshot = session
            .store()
            .load_snapshot(&SnapshotId::new(aggregate.stream_id(), 1))
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.version, stream.version);
    }
}

#[test]
fn from_version_returns_tail_in_order() {
    let session = session(AggregateConfig::event_sourced());
    let mut aggregate = Aggregate::<Calculator>::with_id("c1");
    for value in 1..=5 {
        aggregate.apply(Added { value });
    }
    session.save(&mut aggregate).unwrap();

    let filter = EventFilter::for_stream(StreamId::new("calculator", "c1")).from_version(3);
    let events = session.load_events(&filter).unwrap();
    assert_eq!(
        events.iter().map(|e| e.version).collect::<Vec<_>>(),
        [3, 4, 5]
    );
    assert_eq!(values(&events), [3, 4, 5]);

    // Reading twice gives the same answer.
    assert_eq!(values(&session.load_events(&filter).unwrap()), [3, 4, 5]);
}

#[test]
fn global_order_follows_append_order_across_streams() {
    let session = session(AggregateConfig::event_sourced());
    let mut a = Aggregate::<Calculator>::with_id("a");
    let mut b = Aggregate::<Calculator>::with_id("b");

    a.apply(Added { value: 1 });
    session.save(&mut a).unwrap();
    b.apply(Added { value: 2 });
    b.apply(Added { value: 3 });
    session.save(&mut b).unwrap();
    a.apply(Added { value: 4 });
    session.save(&mut a).unwrap();

    let events = session.load_events(&EventFilter::all()).unwrap();
    assert_eq!(values(&events), [1, 2, 3, 4]);
    assert_eq!(
        events.iter().map(|e| e.global_sequence).collect::<Vec<_>>(),
        [1, 2, 3, 4]
    );
    assert_eq!(
        events.iter().map(|e| e.version).collect::<Vec<_>>(),
        [1, 1, 2, 2]
    );

    let latest = session
        .load_events(&EventFilter::all().descending().count(1))
        .unwrap();
    assert_eq!(values(&latest), [4]);
}

#[test]
fn load_stream_decodes_into_union_payloads() {
    let session = session(AggregateConfig::event_sourced());
    let mut aggregate = Aggregate::<Calculator>::with_id("c1");
    aggregate.apply(Updated { value: 2 });
    aggregate.apply(Subtracted { value: 1 });
    session.save(&mut aggregate).unwrap();

    let events = session.load_stream(&aggregate.stream_id()).unwrap();
    let rebuilt = Aggregate::<Calculator>::from_events(
        "c1",
        events.into_iter().map(|event| {
            event.map(|payload| {
                <CalculatorEvent as keel::EventUnion>::from_payload(payload)
                    .unwrap_or_else(|_| panic!("calculator payload"))
            })
        }),
    );
    assert_eq!(rebuilt.state().value, 1);
    assert_eq!(rebuilt.version(), 2);
}

#[test]
fn unconfigured_aggregate_type_is_rejected() {
    let session = keel::Session::new(
        keel::store::inmemory::Store::new(),
        keel::Config::builder().build(),
        keel::tenant::TenantId::from("t"),
    );
    let err = session.load::<Calculator>("c1").unwrap_err();
    assert!(matches!(err, SessionError::UnknownAggregateType("calculator")));
}
