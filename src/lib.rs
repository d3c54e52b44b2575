//! # Diagen: streaming diagram-generation pipeline
//!
//! Diagen sits between a request handler and a set of slow generation stages
//! (LLM-backed in production). A client submits an edit/explain request
//! against an API class diagram and immediately receives an opaque session
//! id; a background task drives the generation pipeline and streams
//! progress, tokens, and the final version through the session's channel.
//!
//! ## Core Concepts
//!
//! - **Session**: one client's subscription to a run's event stream,
//!   tracked by the [`registry::SessionRegistry`]
//! - **Events**: the ordered, per-session [`event::Event`] sequence, always
//!   terminated by exactly one `Done` sentinel
//! - **Stages**: replaceable [`stage::StageExecutor`] capabilities with
//!   typed input/output contracts
//! - **Pipeline**: the [`pipeline::GenerationPipeline`] state machine that
//!   decides whether the diagram changes, regenerates it, and persists a new
//!   version
//! - **Stores**: the versioned [`store::DiagramStore`] (strictly increasing
//!   integer versions per key) and the append-only [`store::ChatStore`]
//!   audit trail
//!
//! ## Quick Start
//!
//! Wire deterministic stages to see the event flow without any model calls:
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use futures_util::{stream, StreamExt};
//!
//! use diagen::config::PipelineConfig;
//! use diagen::model::{PipelineRequest, PromptTag, PromptTarget};
//! use diagen::pipeline::GenerationPipeline;
//! use diagen::registry::SessionRegistry;
//! use diagen::service::ChatStreamService;
//! use diagen::stage::{
//!     AnswerInput, AssemblyInput, ComponentInput, ComponentsOutput, ConnectionInput,
//!     ConnectionsOutput, DiagramDraft, DtoInput, DtosOutput, IntentDecision, IntentInput,
//!     StageError, StageExecutor, StageSet, TokenStream,
//! };
//! use diagen::store::{InMemoryChatStore, InMemoryDiagramStore};
//!
//! struct NoChange;
//!
//! #[async_trait]
//! impl StageExecutor<IntentInput, IntentDecision> for NoChange {
//!     async fn execute(&self, _input: IntentInput) -> Result<IntentDecision, StageError> {
//!         Ok(IntentDecision {
//!             needs_change: false,
//!             reasoning: "informational question".into(),
//!         })
//!     }
//! }
//!
//! struct CannedAnswer;
//!
//! #[async_trait]
//! impl StageExecutor<AnswerInput, TokenStream> for CannedAnswer {
//!     async fn execute(&self, _input: AnswerInput) -> Result<TokenStream, StageError> {
//!         Ok(stream::iter(vec![Ok("it validates the input".to_string())]).boxed())
//!     }
//! }
//!
//! // Generation stages are unreachable on the no-change path.
//! struct Unreachable;
//!
//! #[async_trait]
//! impl StageExecutor<ComponentInput, ComponentsOutput> for Unreachable {
//!     async fn execute(&self, _input: ComponentInput) -> Result<ComponentsOutput, StageError> {
//!         Err(StageError::execution("component-generation", "not wired"))
//!     }
//! }
//!
//! #[async_trait]
//! impl StageExecutor<DtoInput, DtosOutput> for Unreachable {
//!     async fn execute(&self, _input: DtoInput) -> Result<DtosOutput, StageError> {
//!         Err(StageError::execution("dto-generation", "not wired"))
//!     }
//! }
//!
//! #[async_trait]
//! impl StageExecutor<ConnectionInput, ConnectionsOutput> for Unreachable {
//!     async fn execute(&self, _input: ConnectionInput) -> Result<ConnectionsOutput, StageError> {
//!         Err(StageError::execution("connection-generation", "not wired"))
//!     }
//! }
//!
//! #[async_trait]
//! impl StageExecutor<AssemblyInput, DiagramDraft> for Unreachable {
//!     async fn execute(&self, _input: AssemblyInput) -> Result<DiagramDraft, StageError> {
//!         Err(StageError::execution("diagram-assembly", "not wired"))
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = SessionRegistry::new();
//! let pipeline = Arc::new(GenerationPipeline::new(
//!     StageSet {
//!         intent: Arc::new(NoChange),
//!         answer: Arc::new(CannedAnswer),
//!         components: Arc::new(Unreachable),
//!         dtos: Arc::new(Unreachable),
//!         connections: Arc::new(Unreachable),
//!         assembly: Arc::new(Unreachable),
//!     },
//!     registry.clone(),
//!     Arc::new(InMemoryDiagramStore::new()),
//!     Arc::new(InMemoryChatStore::new()),
//!     PipelineConfig::default(),
//! ));
//! let service = ChatStreamService::new(registry, pipeline);
//!
//! let session_id = service
//!     .start(PipelineRequest {
//!         project_id: "p1".into(),
//!         api_id: "a1".into(),
//!         tag: PromptTag::Explain,
//!         prompt_type: PromptTarget::Body,
//!         message: "what does this do?".into(),
//!         target_method_ids: vec![],
//!     })
//!     .unwrap();
//!
//! let frames: Vec<String> = service.consume(&session_id).unwrap().collect().await;
//! assert!(frames.iter().any(|f| f.contains("\"token\"")));
//! assert!(frames.last().unwrap().contains("\"done\""));
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`event`] - Stream events and SSE wire framing
//! - [`registry`] - Per-session channels and the session table
//! - [`model`] - Diagrams, requests, and the chat audit model
//! - [`stage`] - Stage executor contracts and typed stage IO
//! - [`pipeline`] - The orchestrator state machine
//! - [`store`] - Versioned diagram persistence and the audit store
//! - [`service`] - Start/consume surface for a request handler
//! - [`config`] - Environment-backed runtime configuration
//! - [`telemetry`] - Tracing subscriber setup

pub mod config;
pub mod event;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod stage;
pub mod store;
pub mod telemetry;
