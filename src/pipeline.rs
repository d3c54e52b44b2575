//! The generation pipeline orchestrator.
//!
//! One [`GenerationPipeline::run`] call drives a single request end-to-end:
//!
//! ```text
//! START → EVALUATING_INTENT ─┬─ no change ─→ ANSWERING ─────────────────→ DONE
//!                            └─ change ────→ GENERATING_COMPONENTS
//!                                            → GENERATING_DTOS
//!                                            → GENERATING_CONNECTIONS
//!                                            → ASSEMBLING → PERSISTING ──→ DONE
//!                            (any state) ──→ FAILED ─────────────────────→ DONE
//! ```
//!
//! The run communicates with its consumer only through the session channel.
//! Two properties hold on every exit path, normal, failed, or panicked: the
//! channel is closed exactly once, and exactly one [`ChatRecord`] is appended
//! to the audit store. Both are enforced structurally in
//! [`GenerationPipeline::run`] rather than per-branch.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::{FutureExt, StreamExt};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::event::Event;
use crate::model::{
    ChatRecord, Connection, Diagram, Metadata, PipelineRequest, PipelineStatus, SystemChat,
    VersionInfoPayload,
};
use crate::registry::SessionRegistry;
use crate::stage::{
    AnswerInput, AssemblyInput, ComponentInput, ConnectionInput, DtoInput, IntentInput, StageError,
    StageSet,
};
use crate::store::{ChatStore, DiagramStore, StoreError};

/// Internal failure of a pipeline run. Never escapes [`GenerationPipeline::run`]:
/// it is converted into an `Error` event plus an `ERROR` audit record.
#[derive(Debug, Error, Diagnostic)]
pub enum PipelineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Message safe to put on the wire: names the failing phase without
    /// leaking executor internals or backend details.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Stage(err) => {
                format!("generation failed in the {} stage", err.stage())
            }
            PipelineError::Store(StoreError::VersionConflict { .. }) => {
                "could not allocate a new diagram version, please retry".to_string()
            }
            // Backend failures also surface from diagram lookups, so the
            // message stays phase-neutral.
            PipelineError::Store(StoreError::Backend(_)) => {
                "diagram storage is unavailable".to_string()
            }
        }
    }
}

/// Terminal outcome of one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// A new diagram version was persisted.
    Completed { diagram_id: String, version: i64 },
    /// The request was answered without touching the diagram.
    Unchanged { version: i64 },
    /// The run failed; `message` is the user-safe description emitted.
    Failed { message: String },
}

/// Orchestrates stage executors for one request at a time and reports
/// through the session registry.
///
/// The pipeline owns no session state: it is cheap to share behind an `Arc`
/// and a separate `tokio` task runs each request.
pub struct GenerationPipeline {
    stages: StageSet,
    registry: SessionRegistry,
    diagrams: Arc<dyn DiagramStore>,
    chats: Arc<dyn ChatStore>,
    config: PipelineConfig,
}

impl GenerationPipeline {
    pub fn new(
        stages: StageSet,
        registry: SessionRegistry,
        diagrams: Arc<dyn DiagramStore>,
        chats: Arc<dyn ChatStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            stages,
            registry,
            diagrams,
            chats,
            config,
        }
    }

    /// Run one request end-to-end, emitting events into `session_id`.
    ///
    /// Never returns an error and never panics: stage failures become the
    /// `Failed` outcome, and a panicking executor or store is caught and
    /// treated the same way. The session channel receives exactly one
    /// `Done`, and the audit store exactly one record, regardless of the
    /// branch taken.
    #[instrument(
        skip(self, request),
        fields(project = %request.project_id, api = %request.api_id, tag = ?request.tag)
    )]
    pub async fn run(&self, session_id: &str, request: PipelineRequest) -> PipelineOutcome {
        // Executors are foreign code; a panic in one must not abort the task
        // before the close/audit epilogue below runs.
        let guarded = AssertUnwindSafe(self.run_inner(session_id, &request))
            .catch_unwind()
            .await;

        let (outcome, system_chat) = match guarded {
            Ok(Ok(done)) => done,
            Ok(Err(err)) => {
                let message = err.user_message();
                tracing::warn!(session = %session_id, error = %err, "pipeline run failed");
                self.registry.send(session_id, Event::error(message.clone()));
                (
                    PipelineOutcome::Failed {
                        message: message.clone(),
                    },
                    SystemChat::error(message),
                )
            }
            Err(payload) => {
                let message = "generation failed unexpectedly".to_string();
                tracing::error!(
                    session = %session_id,
                    panic = panic_message(payload.as_ref()),
                    "pipeline run panicked"
                );
                self.registry.send(session_id, Event::error(message.clone()));
                (
                    PipelineOutcome::Failed {
                        message: message.clone(),
                    },
                    SystemChat::error(message),
                )
            }
        };

        let record = ChatRecord::new(&request, system_chat);
        if let Err(err) = self.chats.append(record).await {
            // The stream already carried the result; losing the audit entry
            // is logged loudly but does not fail the run retroactively.
            tracing::error!(session = %session_id, error = %err, "audit record write failed");
        }

        self.registry.close(session_id);
        tracing::info!(session = %session_id, outcome = ?outcome, "pipeline run finished");
        outcome
    }

    async fn run_inner(
        &self,
        session_id: &str,
        request: &PipelineRequest,
    ) -> Result<(PipelineOutcome, SystemChat), PipelineError> {
        let current = self.resolve_target_diagram(request).await?;
        let target_methods = current
            .as_ref()
            .map(|d| d.methods_by_ids(&request.target_method_ids))
            .unwrap_or_default();

        let decision = self
            .stages
            .intent
            .execute(IntentInput {
                request: request.clone(),
                current_diagram: current.clone(),
                target_methods: target_methods.clone(),
            })
            .await?;
        tracing::debug!(
            session = %session_id,
            needs_change = decision.needs_change,
            reasoning = %decision.reasoning,
            "intent evaluated"
        );

        if decision.needs_change {
            self.generate(session_id, request, current, decision.reasoning)
                .await
        } else {
            self.answer_only(session_id, request, current, target_methods)
                .await
        }
    }

    /// No-change branch: stream the answer, report the current version.
    async fn answer_only(
        &self,
        session_id: &str,
        request: &PipelineRequest,
        current: Option<Diagram>,
        target_methods: Vec<crate::model::Method>,
    ) -> Result<(PipelineOutcome, SystemChat), PipelineError> {
        let version = current.as_ref().map(|d| d.metadata.version).unwrap_or(0);
        self.progress(session_id, "answering without diagram changes");

        let mut tokens = self
            .stages
            .answer
            .execute(AnswerInput {
                request: request.clone(),
                current_diagram: current.clone(),
                target_methods,
            })
            .await?;

        let mut answer = String::new();
        while let Some(chunk) = tokens.next().await {
            let text = chunk?;
            answer.push_str(&text);
            self.registry.send(session_id, Event::token(text));
        }

        let info = VersionInfoPayload::new(version, "unchanged");
        self.registry
            .send(session_id, Event::version_payload(&info));

        let status = if request.tag.is_explanatory() {
            PipelineStatus::Explanation
        } else {
            PipelineStatus::Unchanged
        };
        let system_chat = SystemChat::new(
            status,
            answer,
            Some(info),
            current.map(|d| d.diagram_id),
        );
        Ok((PipelineOutcome::Unchanged { version }, system_chat))
    }

    /// Change branch: announce the id, run the generation stages in order,
    /// persist, report the new version.
    async fn generate(
        &self,
        session_id: &str,
        request: &PipelineRequest,
        current: Option<Diagram>,
        reasoning: String,
    ) -> Result<(PipelineOutcome, SystemChat), PipelineError> {
        // The id is announced before any generation runs so the client can
        // navigate to the new diagram while stages are still producing.
        let diagram_id = Uuid::new_v4().to_string();
        self.registry
            .send(session_id, Event::created(diagram_id.clone()));

        self.progress(session_id, "generating components");
        let components = self
            .stages
            .components
            .execute(ComponentInput {
                request: request.clone(),
                current_diagram: current.clone(),
            })
            .await?;

        self.progress(session_id, "generating dto schemas");
        let dtos = self
            .stages
            .dtos
            .execute(DtoInput {
                request: request.clone(),
                components: components.components.clone(),
            })
            .await?;

        self.progress(session_id, "generating connections");
        let connections = self
            .stages
            .connections
            .execute(ConnectionInput {
                components: components.components.clone(),
            })
            .await?;

        self.progress(session_id, "assembling diagram");
        let draft = self
            .stages
            .assembly
            .execute(AssemblyInput {
                request: request.clone(),
                components: components.components.clone(),
                dtos: dtos.dtos,
                connections: connections.connections,
            })
            .await?;

        let candidate = self.materialize(&diagram_id, request, draft);

        self.progress(session_id, "persisting new version");
        let saved = self.diagrams.create_new_version(candidate).await?;
        let version = saved.metadata.version;

        let info = VersionInfoPayload::new(version, "new diagram version created");
        self.registry
            .send(session_id, Event::version_payload(&info));

        let status = if components.introduces_new_components {
            PipelineStatus::ModifiedWithNewComponents
        } else {
            PipelineStatus::Modified
        };
        let system_chat = SystemChat::new(status, reasoning, Some(info), Some(saved.diagram_id.clone()));
        Ok((
            PipelineOutcome::Completed {
                diagram_id: saved.diagram_id,
                version,
            },
            system_chat,
        ))
    }

    /// Which diagram the request is about: the owner of the first targeted
    /// method when methods are named, else the latest version for the key.
    async fn resolve_target_diagram(
        &self,
        request: &PipelineRequest,
    ) -> Result<Option<Diagram>, StoreError> {
        if let Some(method_id) = request.target_method_ids.first() {
            if let Some(diagram) = self
                .diagrams
                .find_by_method_id(&request.project_id, &request.api_id, method_id)
                .await?
            {
                return Ok(Some(diagram));
            }
        }
        self.diagrams
            .find_latest(&request.project_id, &request.api_id)
            .await
    }

    /// Turn the assembled draft into a persistable candidate: fresh ids for
    /// every component, method, connection, and dto (stage-produced ids are
    /// provisional labels, never reused across versions), with connection
    /// endpoints remapped through the old→new method id table. Connections
    /// referencing unknown methods are dropped.
    fn materialize(
        &self,
        diagram_id: &str,
        request: &PipelineRequest,
        draft: crate::stage::DiagramDraft,
    ) -> Diagram {
        let mut method_ids: FxHashMap<String, String> = FxHashMap::default();

        let components = draft
            .components
            .into_iter()
            .map(|mut component| {
                component.component_id = Uuid::new_v4().to_string();
                for method in &mut component.methods {
                    let fresh = Uuid::new_v4().to_string();
                    method_ids.insert(std::mem::replace(&mut method.method_id, fresh.clone()), fresh);
                }
                component
            })
            .collect();

        let connections: Vec<Connection> = draft
            .connections
            .into_iter()
            .filter_map(|mut connection| {
                let source = method_ids.get(&connection.source_method_id);
                let target = method_ids.get(&connection.target_method_id);
                match (source, target) {
                    (Some(source), Some(target)) => {
                        connection.connection_id = Uuid::new_v4().to_string();
                        connection.source_method_id = source.clone();
                        connection.target_method_id = target.clone();
                        Some(connection)
                    }
                    _ => {
                        tracing::warn!(
                            source = %connection.source_method_id,
                            target = %connection.target_method_id,
                            "dropping connection with unknown method endpoint"
                        );
                        None
                    }
                }
            })
            .collect();

        let dtos = draft
            .dtos
            .into_iter()
            .map(|mut dto| {
                dto.dto_id = Uuid::new_v4().to_string();
                dto
            })
            .collect();

        Diagram {
            diagram_id: diagram_id.to_string(),
            project_id: request.project_id.clone(),
            api_id: request.api_id.clone(),
            components,
            connections,
            dtos,
            metadata: Metadata {
                metadata_id: Uuid::new_v4().to_string(),
                // The store allocates the real version at persist time.
                version: 0,
                last_modified: chrono::Utc::now(),
                name: Some(format!("API diagram for {}", request.api_id)),
                description: Some(format!("Generated from tag {:?}", request.tag)),
            },
        }
    }

    fn progress(&self, session_id: &str, message: &str) {
        if self.config.stage_progress {
            self.registry.send(session_id, Event::progress(message));
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
