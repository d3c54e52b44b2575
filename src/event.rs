//! Session stream events and their wire representation.
//!
//! Every pipeline run talks to its consumer exclusively through a sequence of
//! [`Event`] values delivered over one session channel. Ordering is guaranteed
//! within a session and nowhere else. The stream always ends with exactly one
//! [`Event::Done`] sentinel, possibly preceded by an [`Event::Error`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::VersionInfoPayload;

/// A single event emitted by a pipeline run into its session channel.
///
/// Events are immutable once emitted. The wire form follows the SSE payload
/// shape consumed by existing clients: a JSON object with a `type` tag and a
/// type-specific `data` payload.
///
/// # Example
///
/// ```
/// use diagen::event::Event;
///
/// let event = Event::created("d-42");
/// let json = event.to_json_value();
/// assert_eq!(json["type"], "created");
/// assert_eq!(json["data"]["diagramId"], "d-42");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    /// Human-readable progress notice for a long-running stage.
    Progress { message: String },
    /// Incremental chunk of a streamed natural-language answer.
    Token { text: String },
    /// A new diagram id was allocated; emitted before generation finishes so
    /// the client can navigate optimistically.
    Created { diagram_id: String },
    /// Terminal content event carrying the resulting version.
    VersionInfo {
        new_version_id: String,
        description: String,
    },
    /// User-safe description of a failed run. Always followed by `Done`.
    Error { message: String },
    /// End-of-stream sentinel. Consumers must stop reading after this.
    Done,
}

impl Event {
    pub fn progress(message: impl Into<String>) -> Self {
        Event::Progress {
            message: message.into(),
        }
    }

    pub fn token(text: impl Into<String>) -> Self {
        Event::Token { text: text.into() }
    }

    pub fn created(diagram_id: impl Into<String>) -> Self {
        Event::Created {
            diagram_id: diagram_id.into(),
        }
    }

    /// Version info event. Versions are integers internally; the wire keeps
    /// the stringly `newVersionId` existing clients expect.
    pub fn version_info(version: i64, description: impl Into<String>) -> Self {
        Event::VersionInfo {
            new_version_id: version.to_string(),
            description: description.into(),
        }
    }

    pub fn version_payload(payload: &VersionInfoPayload) -> Self {
        Event::VersionInfo {
            new_version_id: payload.new_version_id.clone(),
            description: payload.description.clone().unwrap_or_default(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Event::Error {
            message: message.into(),
        }
    }

    /// True for the `Done` sentinel that terminates a session stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done)
    }

    /// Convert the event into its structured JSON wire value.
    pub fn to_json_value(&self) -> Value {
        serde_json::to_value(self).expect("event serialization is infallible")
    }

    /// Render the event as one SSE frame: `data: <json>\n\n`.
    ///
    /// ```
    /// use diagen::event::Event;
    ///
    /// let frame = Event::Done.to_sse_frame();
    /// assert_eq!(frame, "data: {\"type\":\"done\"}\n\n");
    /// ```
    pub fn to_sse_frame(&self) -> String {
        format!("data: {}\n\n", self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Progress { message } => write!(f, "progress: {message}"),
            Event::Token { text } => write!(f, "token: {text}"),
            Event::Created { diagram_id } => write!(f, "created: {diagram_id}"),
            Event::VersionInfo {
                new_version_id,
                description,
            } => write!(f, "version {new_version_id}: {description}"),
            Event::Error { message } => write!(f, "error: {message}"),
            Event::Done => write!(f, "done"),
        }
    }
}
