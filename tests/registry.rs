use futures_util::StreamExt;
use rustc_hash::FxHashSet;

use diagen::event::Event;
use diagen::registry::{RegistryError, SessionRegistry};

#[test]
fn session_ids_are_unique_and_resolvable() {
    let registry = SessionRegistry::new();
    let mut seen = FxHashSet::default();

    for _ in 0..100 {
        let (id, _channel) = registry.create_session();
        assert!(seen.insert(id.clone()), "duplicate session id {id}");
        assert!(registry.get_channel(&id).is_ok());
        assert!(registry.created_at(&id).is_some());
    }
    assert_eq!(registry.len(), 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_session_creation_never_collides() {
    let registry = SessionRegistry::new();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            (0..16)
                .map(|_| registry.create_session().0)
                .collect::<Vec<_>>()
        }));
    }

    let mut all = FxHashSet::default();
    for handle in handles {
        for id in handle.await.expect("task panicked") {
            assert!(all.insert(id), "two concurrent creates shared an id");
        }
    }
    assert_eq!(registry.len(), 8 * 16);
}

#[test]
fn unknown_session_lookup_fails() {
    let registry = SessionRegistry::new();
    match registry.get_channel("no-such-session") {
        Err(RegistryError::SessionNotFound { session_id }) => {
            assert_eq!(session_id, "no-such-session");
        }
        Ok(_) => panic!("lookup of unknown id must fail"),
    }
}

#[test]
fn send_after_removal_is_a_silent_no_op() {
    let registry = SessionRegistry::new();
    let (id, _channel) = registry.create_session();

    assert!(registry.send(&id, Event::progress("still here")));
    registry.remove_session(&id);
    assert!(!registry.send(&id, Event::progress("too late")));
    assert!(!registry.close(&id));

    // Removal is idempotent.
    registry.remove_session(&id);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn channel_preserves_event_order() {
    let registry = SessionRegistry::new();
    let (id, channel) = registry.create_session();

    registry.send(&id, Event::progress("first"));
    registry.send(&id, Event::token("second"));
    registry.close(&id);

    assert_eq!(channel.recv().await, Some(Event::progress("first")));
    assert_eq!(channel.recv().await, Some(Event::token("second")));
    assert_eq!(channel.recv().await, Some(Event::Done));
}

#[tokio::test]
async fn into_stream_ends_on_disconnect() {
    let registry = SessionRegistry::new();
    let (id, channel) = registry.create_session();

    registry.send(&id, Event::created("d-1"));
    registry.close(&id);
    // Dropping the registered half disconnects the channel once the queue
    // is drained, so the stream terminates instead of pending forever.
    registry.remove_session(&id);

    let events: Vec<Event> = channel.into_stream().collect().await;
    assert_eq!(events, vec![Event::created("d-1"), Event::Done]);
}

#[test]
fn close_enqueues_done_but_leaves_session_registered() {
    let registry = SessionRegistry::new();
    let (id, channel) = registry.create_session();

    assert!(registry.close(&id));
    assert_eq!(registry.len(), 1, "consumer owns removal, not close");
    assert_eq!(channel.try_recv(), Some(Event::Done));
}
