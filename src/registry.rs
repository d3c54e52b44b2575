//! Per-session event channels and the process-wide session registry.
//!
//! One [`EventChannel`] carries the ordered event stream of a single pipeline
//! run; the [`SessionRegistry`] maps opaque session ids to live channels.
//! The registry is an explicit, injectable instance with a controlled
//! lifetime; tests can spin up as many isolated registries as they like.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::event::Event;

/// Opaque session identifier. UUID-v4, never sequential: it doubles as the
/// only token required to attach to a stream, so it must not be guessable.
pub type SessionId = String;

#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    #[error("session not found: {session_id}")]
    #[diagnostic(
        code(diagen::registry::session_not_found),
        help("The stream may have already been drained and removed, or the id is stale.")
    )]
    SessionNotFound { session_id: String },
}

/// Ordered, unbounded FIFO carrying one session's events.
///
/// Single producer (the pipeline task) and single consumer (the stream
/// writer) in the common case; the handle is cheap to clone and both halves
/// share the same queue.
#[derive(Clone, Debug)]
pub struct EventChannel {
    tx: flume::Sender<Event>,
    rx: flume::Receiver<Event>,
}

impl EventChannel {
    fn unbounded() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Enqueue an event. Returns `false` when every receiving half is gone.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Receive the next event, awaiting if the queue is empty. `None` means
    /// the channel was torn down without a sentinel (producer dropped).
    pub async fn recv(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    /// Non-blocking receive for tests and polling consumers.
    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Consume this handle as an async stream of events. The stream ends when
    /// the channel disconnects; callers watching for end-of-stream should
    /// stop at the [`Event::Done`] sentinel instead.
    pub fn into_stream(self) -> BoxStream<'static, Event> {
        stream::unfold(self.rx, |rx| async move {
            rx.recv_async().await.ok().map(|event| (event, rx))
        })
        .boxed()
    }
}

#[derive(Debug)]
struct Session {
    channel: EventChannel,
    created_at: DateTime<Utc>,
}

/// Thread-safe table of live sessions.
///
/// All map mutations happen under one mutex; `send`/`close` clone the channel
/// handle under the lock and enqueue outside it, so a slow consumer never
/// holds up registry operations.
#[derive(Clone, Debug, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<FxHashMap<SessionId, Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh session with a collision-resistant id and an
    /// unbounded channel. Returns both so the caller can hand the channel to
    /// the consumer without a second lookup.
    pub fn create_session(&self) -> (SessionId, EventChannel) {
        let session_id = Uuid::new_v4().to_string();
        let channel = EventChannel::unbounded();
        let session = Session {
            channel: channel.clone(),
            created_at: Utc::now(),
        };
        let mut sessions = self.sessions.lock().expect("session table poisoned");
        sessions.insert(session_id.clone(), session);
        tracing::debug!(session = %session_id, live = sessions.len(), "session created");
        (session_id, channel)
    }

    /// O(1) lookup of a live session's channel.
    pub fn get_channel(&self, session_id: &str) -> Result<EventChannel, RegistryError> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        sessions
            .get(session_id)
            .map(|s| s.channel.clone())
            .ok_or_else(|| RegistryError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// When the session was registered, if it is still live.
    pub fn created_at(&self, session_id: &str) -> Option<DateTime<Utc>> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        sessions.get(session_id).map(|s| s.created_at)
    }

    /// Drop a session. Idempotent: removing an unknown id is a no-op.
    pub fn remove_session(&self, session_id: &str) {
        let removed = {
            let mut sessions = self.sessions.lock().expect("session table poisoned");
            sessions.remove(session_id)
        };
        if removed.is_some() {
            tracing::debug!(session = %session_id, "session removed");
        }
    }

    /// Enqueue an event for a session. Returns `false` when the session is
    /// gone, without blocking or panicking; late sends after teardown are
    /// silently dropped so a still-running producer cannot crash.
    pub fn send(&self, session_id: &str, event: Event) -> bool {
        let channel = {
            let sessions = self.sessions.lock().expect("session table poisoned");
            sessions.get(session_id).map(|s| s.channel.clone())
        };
        match channel {
            Some(channel) => channel.send(event),
            None => {
                tracing::trace!(session = %session_id, "dropping event for removed session");
                false
            }
        }
    }

    /// Enqueue the `Done` sentinel. Removal is left to the consumer, which
    /// drops the session once it has drained past the sentinel; closing here
    /// would race a consumer that is still reading.
    pub fn close(&self, session_id: &str) -> bool {
        self.send(session_id, Event::Done)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
