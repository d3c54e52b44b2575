//! Stage executor capability: the replaceable units of generation work.
//!
//! Each pipeline stage (intent evaluation, answer streaming, component, DTO,
//! and connection generation, diagram assembly) is a typed input → output
//! contract. Production wires these to LLM calls; tests wire deterministic
//! stubs. The orchestrator depends only on the trait, never on how a stage
//! produces its output, and it applies no retry policy of its own; retry and
//! backoff belong to the executor implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use miette::Diagnostic;
use thiserror::Error;

use crate::model::{Component, Connection, Diagram, DtoSchema, Method, PipelineRequest};

/// Failure of a single stage execution. Terminal for the run that issued it;
/// the orchestrator converts it into an `Error` event plus an audit record.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("stage `{stage}` failed: {message}")]
    #[diagnostic(code(diagen::stage::execution))]
    Execution { stage: &'static str, message: String },

    #[error("stage `{stage}` produced unusable output: {message}")]
    #[diagnostic(
        code(diagen::stage::malformed_output),
        help("The executor returned output that does not satisfy the stage contract.")
    )]
    MalformedOutput { stage: &'static str, message: String },
}

impl StageError {
    pub fn execution(stage: &'static str, message: impl Into<String>) -> Self {
        Self::Execution {
            stage,
            message: message.into(),
        }
    }

    pub fn malformed(stage: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            stage,
            message: message.into(),
        }
    }

    /// The stage name, for logs and user-safe messages.
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Execution { stage, .. } | StageError::MalformedOutput { stage, .. } => {
                stage
            }
        }
    }
}

/// A unit of generation work with a typed contract.
#[async_trait]
pub trait StageExecutor<I, O>: Send + Sync {
    async fn execute(&self, input: I) -> Result<O, StageError>;
}

/// Incremental chunks of a streamed natural-language answer.
pub type TokenStream = BoxStream<'static, Result<String, StageError>>;

/// Input to intent evaluation: the request plus whatever the targeted
/// methods currently look like.
#[derive(Clone, Debug)]
pub struct IntentInput {
    pub request: PipelineRequest,
    pub current_diagram: Option<Diagram>,
    pub target_methods: Vec<Method>,
}

/// Whether the diagram must change, with a rationale kept for the audit
/// trail only. It never drives control flow beyond the boolean.
#[derive(Clone, Debug)]
pub struct IntentDecision {
    pub needs_change: bool,
    pub reasoning: String,
}

/// Input to the answer-only stage taken when no change is needed.
#[derive(Clone, Debug)]
pub struct AnswerInput {
    pub request: PipelineRequest,
    pub current_diagram: Option<Diagram>,
    pub target_methods: Vec<Method>,
}

#[derive(Clone, Debug)]
pub struct ComponentInput {
    pub request: PipelineRequest,
    pub current_diagram: Option<Diagram>,
}

#[derive(Clone, Debug)]
pub struct ComponentsOutput {
    pub components: Vec<Component>,
    /// True when the stage introduced top-level types absent from the
    /// current diagram; selects the MODIFIED_WITH_NEW_COMPONENTS status.
    pub introduces_new_components: bool,
}

/// DTO generation sees the freshly generated components but never the
/// connections, since connection generation runs after it.
#[derive(Clone, Debug)]
pub struct DtoInput {
    pub request: PipelineRequest,
    pub components: Vec<Component>,
}

#[derive(Clone, Debug)]
pub struct DtosOutput {
    pub dtos: Vec<DtoSchema>,
}

#[derive(Clone, Debug)]
pub struct ConnectionInput {
    pub components: Vec<Component>,
}

#[derive(Clone, Debug)]
pub struct ConnectionsOutput {
    pub connections: Vec<Connection>,
}

#[derive(Clone, Debug)]
pub struct AssemblyInput {
    pub request: PipelineRequest,
    pub components: Vec<Component>,
    pub dtos: Vec<DtoSchema>,
    pub connections: Vec<Connection>,
}

/// Assembled diagram content before the orchestrator assigns fresh ids and
/// the store assigns a version.
#[derive(Clone, Debug)]
pub struct DiagramDraft {
    pub components: Vec<Component>,
    pub connections: Vec<Connection>,
    pub dtos: Vec<DtoSchema>,
}

/// The full set of executors one pipeline drives, in execution order.
#[derive(Clone)]
pub struct StageSet {
    pub intent: Arc<dyn StageExecutor<IntentInput, IntentDecision>>,
    pub answer: Arc<dyn StageExecutor<AnswerInput, TokenStream>>,
    pub components: Arc<dyn StageExecutor<ComponentInput, ComponentsOutput>>,
    pub dtos: Arc<dyn StageExecutor<DtoInput, DtosOutput>>,
    pub connections: Arc<dyn StageExecutor<ConnectionInput, ConnectionsOutput>>,
    pub assembly: Arc<dyn StageExecutor<AssemblyInput, DiagramDraft>>,
}
