//! Integration tests for optimistic concurrency control.

#![cfg(feature = "test-util")]

mod common;

use std::{
    sync::{Arc, Barrier},
    thread,
};

use common::{Added, Calculator, session, session_pair};
use keel::{AggregateConfig, SessionError, test::SessionTestExt};

#[test]
fn racing_sessions_yield_one_conflict_then_retry_succeeds() {
    for strategy in [
        AggregateConfig::event_sourced(),
        AggregateConfig::snapshot_assisted(),
    ] {
        let (first, second) = session_pair(strategy);
        first
            .seed_events::<Calculator>("c1", vec![Added { value: 1 }.into()])
            .unwrap();

        let mut a = first.load::<Calculator>("c1").unwrap();
        let mut b = second.load::<Calculator>("c1").unwrap();
        assert_eq!(a.version(), 1);
        assert_eq!(b.version(), 1);

        a.apply(Added { value: 10 });
        b.apply(Added { value: 20 });
        first.save(&mut a).unwrap();

        let err = second.save(&mut b).unwrap_err();
        let SessionError::Conflict(conflict) = &err else {
            panic!("expected a conflict, got {err:?}");
        };
        assert_eq!(conflict.expected, 2);
        assert_eq!(conflict.actual, 3);
        assert!(b.has_unsaved_changes());

        // Retry against the refreshed version.
        let mut b = second.load::<Calculator>("c1").unwrap();
        assert_eq!(b.version(), 2);
        b.apply(Added { value: 20 });
        second.save(&mut b).unwrap();

        let final_state = first.load::<Calculator>("c1").unwrap();
        assert_eq!(final_state.state().value, 31);
        assert_eq!(final_state.version(), 3);
    }
}

#[test]
fn conflict_message_tells_caller_to_reload() {
    let session = session(AggregateConfig::event_sourced());
    let mut stale = session.load::<Calculator>("c1").unwrap();
    stale.apply(Added { value: 1 });
    session
        .inject_concurrent_event::<Calculator>("c1", Added { value: 5 }.into())
        .unwrap();

    let err = session.save(&mut stale).unwrap_err();
    assert!(err.is_conflict());
    assert!(err.to_string().contains("reload and retry"), "{err}");
}

#[test]
fn threads_saving_the_same_version_have_exactly_one_winner() {
    const WRITERS: usize = 8;

    let (session, _) = session_pair(AggregateConfig::event_sourced());
    let session = Arc::new(session);
    session
        .seed_events::<Calculator>("c1", vec![Added { value: 0 }.into()])
        .unwrap();
    let barrier = Barrier::new(WRITERS);

    let outcomes: Vec<bool> = thread::scope(|scope| {
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let session = Arc::clone(&session);
                let barrier = &barrier;
                scope.spawn(move || {
                    let mut aggregate = session.load::<Calculator>("c1").unwrap();
                    aggregate.apply(Added { value: i as i64 });
                    barrier.wait();
                    match session.save(&mut aggregate) {
                        Ok(()) => true,
                        Err(err) if err.is_conflict() => false,
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|won| **won).count(), 1);
    assert_eq!(session.load::<Calculator>("c1").unwrap().version(), 2);
}
