//! Thin request-facing surface over the registry and the pipeline.
//!
//! `start` is what a POST handler calls: validate, create a session, spawn
//! the run, hand the session id back immediately. `consume` is what the SSE
//! handler calls: frame each event as `data: <json>\n\n` and tear the
//! session down once the sentinel has been delivered. The session id is the
//! only credential the stream endpoint checks, an inherited design worth
//! fronting with real authorization in a deployment.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::model::PipelineRequest;
use crate::pipeline::GenerationPipeline;
use crate::registry::{EventChannel, SessionId, SessionRegistry};

#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    /// Bad request shape, rejected before any session exists.
    #[error("invalid request: {0}")]
    #[diagnostic(
        code(diagen::service::validation),
        help("projectId, apiId, and a non-empty message are required.")
    )]
    Validation(String),

    /// Unknown session id; the 404-equivalent for the stream endpoint.
    #[error("session not found: {session_id}")]
    #[diagnostic(code(diagen::service::session_not_found))]
    NotFound { session_id: String },
}

/// Accepts requests and exposes their event streams.
#[derive(Clone)]
pub struct ChatStreamService {
    registry: SessionRegistry,
    pipeline: Arc<GenerationPipeline>,
}

impl ChatStreamService {
    /// `registry` must be the same instance the pipeline emits into.
    pub fn new(registry: SessionRegistry, pipeline: Arc<GenerationPipeline>) -> Self {
        Self { registry, pipeline }
    }

    /// Validate the request, create a session, and schedule the pipeline as
    /// a background task. Returns the session id the client should use to
    /// attach to the stream.
    #[instrument(skip(self, request), fields(project = %request.project_id, api = %request.api_id))]
    pub fn start(&self, request: PipelineRequest) -> Result<SessionId, ServiceError> {
        validate(&request)?;

        let (session_id, _channel) = self.registry.create_session();
        let pipeline = Arc::clone(&self.pipeline);
        let task_session = session_id.clone();
        tokio::spawn(async move {
            pipeline.run(&task_session, request).await;
        });

        tracing::info!(session = %session_id, "pipeline run scheduled");
        Ok(session_id)
    }

    /// Attach to a session's stream as wire-framed SSE text.
    ///
    /// The stream ends with the terminal frame; the session is removed once
    /// the consumer has drained past it (or the channel disconnects), so a
    /// consumer that hangs up early leaves teardown to `remove_session` and
    /// turns any further producer sends into silent no-ops.
    pub fn consume(&self, session_id: &str) -> Result<BoxStream<'static, String>, ServiceError> {
        let channel = self
            .registry
            .get_channel(session_id)
            .map_err(|_| ServiceError::NotFound {
                session_id: session_id.to_string(),
            })?;

        Ok(frame_stream(channel, self.registry.clone(), session_id.to_string()))
    }

    /// Detach a consumer that is abandoning the stream before the sentinel.
    pub fn disconnect(&self, session_id: &str) {
        self.registry.remove_session(session_id);
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

fn frame_stream(
    channel: EventChannel,
    registry: SessionRegistry,
    session_id: String,
) -> BoxStream<'static, String> {
    // Keep only the receiving half alive here. The registry's entry owns the
    // last sender, so removing the session disconnects the channel and the
    // stream below terminates instead of pending forever.
    let events = channel.into_stream();
    stream::unfold(
        Some((events, registry, session_id)),
        |state| async move {
            let (mut events, registry, session_id) = state?;
            match events.next().await {
                Some(event) => {
                    let frame = event.to_sse_frame();
                    if event.is_terminal() {
                        registry.remove_session(&session_id);
                        Some((frame, None))
                    } else {
                        Some((frame, Some((events, registry, session_id))))
                    }
                }
                None => {
                    registry.remove_session(&session_id);
                    None
                }
            }
        },
    )
    .boxed()
}

fn validate(request: &PipelineRequest) -> Result<(), ServiceError> {
    if request.project_id.trim().is_empty() {
        return Err(ServiceError::Validation("projectId is blank".into()));
    }
    if request.api_id.trim().is_empty() {
        return Err(ServiceError::Validation("apiId is blank".into()));
    }
    if request.message.trim().is_empty() {
        return Err(ServiceError::Validation("message is empty".into()));
    }
    Ok(())
}
