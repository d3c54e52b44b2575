//! Deterministic stage executors for driving the orchestrator in tests.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};

use diagen::model::{Component, ComponentKind, Connection, ConnectionKind, Diagram, DtoSchema, Method};
use diagen::stage::{
    AnswerInput, AssemblyInput, ComponentInput, ComponentsOutput, ConnectionInput,
    ConnectionsOutput, DiagramDraft, DtoInput, DtosOutput, IntentDecision, IntentInput,
    StageError, StageExecutor, StageSet, TokenStream,
};
use diagen::store::{DiagramStore, StoreError};

/// Fixed intent verdict.
pub struct StubIntent {
    pub needs_change: bool,
}

#[async_trait]
impl StageExecutor<IntentInput, IntentDecision> for StubIntent {
    async fn execute(&self, _input: IntentInput) -> Result<IntentDecision, StageError> {
        Ok(IntentDecision {
            needs_change: self.needs_change,
            reasoning: "stubbed intent verdict".into(),
        })
    }
}

/// Streams a fixed list of answer chunks.
pub struct StubAnswer {
    pub chunks: Vec<&'static str>,
}

#[async_trait]
impl StageExecutor<AnswerInput, TokenStream> for StubAnswer {
    async fn execute(&self, _input: AnswerInput) -> Result<TokenStream, StageError> {
        let chunks: Vec<Result<String, StageError>> =
            self.chunks.iter().map(|c| Ok(c.to_string())).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

/// Simulates a bug in foreign executor code.
pub struct PanickingIntent;

#[async_trait]
impl StageExecutor<IntentInput, IntentDecision> for PanickingIntent {
    async fn execute(&self, _input: IntentInput) -> Result<IntentDecision, StageError> {
        panic!("intent executor blew up");
    }
}

pub struct FailingAnswer;

#[async_trait]
impl StageExecutor<AnswerInput, TokenStream> for FailingAnswer {
    async fn execute(&self, _input: AnswerInput) -> Result<TokenStream, StageError> {
        Err(StageError::execution("answer", "model unavailable"))
    }
}

fn stub_method(id: &str, name: &str) -> Method {
    Method {
        method_id: id.to_string(),
        name: name.to_string(),
        signature: format!("{name}(): void"),
        body: None,
        description: None,
    }
}

/// Produces one service component with two methods (`m-a`, `m-b`).
pub struct StubComponents {
    pub new_top_level: bool,
}

#[async_trait]
impl StageExecutor<ComponentInput, ComponentsOutput> for StubComponents {
    async fn execute(&self, _input: ComponentInput) -> Result<ComponentsOutput, StageError> {
        Ok(ComponentsOutput {
            components: vec![Component {
                component_id: "c-draft".into(),
                kind: ComponentKind::Class,
                name: "OrderService".into(),
                description: None,
                position_x: 120.0,
                position_y: 80.0,
                methods: vec![
                    stub_method("m-a", "placeOrder"),
                    stub_method("m-b", "cancelOrder"),
                ],
            }],
            introduces_new_components: self.new_top_level,
        })
    }
}

pub struct FailingComponents;

#[async_trait]
impl StageExecutor<ComponentInput, ComponentsOutput> for FailingComponents {
    async fn execute(&self, _input: ComponentInput) -> Result<ComponentsOutput, StageError> {
        Err(StageError::execution(
            "component-generation",
            "model returned garbage",
        ))
    }
}

pub struct StubDtos;

#[async_trait]
impl StageExecutor<DtoInput, DtosOutput> for StubDtos {
    async fn execute(&self, _input: DtoInput) -> Result<DtosOutput, StageError> {
        Ok(DtosOutput {
            dtos: vec![DtoSchema {
                dto_id: "dto-draft".into(),
                name: "OrderDto".into(),
                description: None,
                body: Some("{ id: string }".into()),
            }],
        })
    }
}

/// Connects the two stubbed methods, plus one dangling connection that the
/// orchestrator must drop during materialization.
pub struct StubConnections;

#[async_trait]
impl StageExecutor<ConnectionInput, ConnectionsOutput> for StubConnections {
    async fn execute(&self, _input: ConnectionInput) -> Result<ConnectionsOutput, StageError> {
        Ok(ConnectionsOutput {
            connections: vec![
                Connection {
                    connection_id: "conn-draft".into(),
                    source_method_id: "m-a".into(),
                    target_method_id: "m-b".into(),
                    kind: ConnectionKind::Solid,
                },
                Connection {
                    connection_id: "conn-dangling".into(),
                    source_method_id: "m-a".into(),
                    target_method_id: "m-ghost".into(),
                    kind: ConnectionKind::Dotted,
                },
            ],
        })
    }
}

/// Pass-through assembly of whatever the earlier stages produced.
pub struct StubAssembly;

#[async_trait]
impl StageExecutor<AssemblyInput, DiagramDraft> for StubAssembly {
    async fn execute(&self, input: AssemblyInput) -> Result<DiagramDraft, StageError> {
        Ok(DiagramDraft {
            components: input.components,
            connections: input.connections,
            dtos: input.dtos,
        })
    }
}

/// Stage set for the no-change branch: intent says "answer only" and the
/// answer stage streams `chunks`.
pub fn answer_stages(chunks: Vec<&'static str>) -> StageSet {
    StageSet {
        intent: Arc::new(StubIntent { needs_change: false }),
        answer: Arc::new(StubAnswer { chunks }),
        components: Arc::new(StubComponents { new_top_level: false }),
        dtos: Arc::new(StubDtos),
        connections: Arc::new(StubConnections),
        assembly: Arc::new(StubAssembly),
    }
}

/// Stage set for the change branch: intent demands a new version.
pub fn generation_stages(new_top_level: bool) -> StageSet {
    StageSet {
        intent: Arc::new(StubIntent { needs_change: true }),
        answer: Arc::new(StubAnswer { chunks: vec![] }),
        components: Arc::new(StubComponents { new_top_level }),
        dtos: Arc::new(StubDtos),
        connections: Arc::new(StubConnections),
        assembly: Arc::new(StubAssembly),
    }
}

/// Change branch whose first generation stage fails.
pub fn failing_generation_stages() -> StageSet {
    StageSet {
        intent: Arc::new(StubIntent { needs_change: true }),
        answer: Arc::new(StubAnswer { chunks: vec![] }),
        components: Arc::new(FailingComponents),
        dtos: Arc::new(StubDtos),
        connections: Arc::new(StubConnections),
        assembly: Arc::new(StubAssembly),
    }
}

/// Stage set whose intent executor panics instead of failing cleanly.
pub fn panicking_stages() -> StageSet {
    StageSet {
        intent: Arc::new(PanickingIntent),
        answer: Arc::new(StubAnswer { chunks: vec![] }),
        components: Arc::new(StubComponents { new_top_level: false }),
        dtos: Arc::new(StubDtos),
        connections: Arc::new(StubConnections),
        assembly: Arc::new(StubAssembly),
    }
}

/// A diagram store whose backend is down for every call.
pub struct UnavailableDiagramStore;

#[async_trait]
impl DiagramStore for UnavailableDiagramStore {
    async fn find_latest(
        &self,
        _project_id: &str,
        _api_id: &str,
    ) -> Result<Option<Diagram>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn create_new_version(&self, _candidate: Diagram) -> Result<Diagram, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }

    async fn find_by_method_id(
        &self,
        _project_id: &str,
        _api_id: &str,
        _method_id: &str,
    ) -> Result<Option<Diagram>, StoreError> {
        Err(StoreError::Backend("connection refused".into()))
    }
}

/// No-change branch whose answer stage fails.
pub fn failing_answer_stages() -> StageSet {
    StageSet {
        intent: Arc::new(StubIntent { needs_change: false }),
        answer: Arc::new(FailingAnswer),
        components: Arc::new(StubComponents { new_top_level: false }),
        dtos: Arc::new(StubDtos),
        connections: Arc::new(StubConnections),
        assembly: Arc::new(StubAssembly),
    }
}
