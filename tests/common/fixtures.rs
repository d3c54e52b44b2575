//! Shared fixtures: requests, seed diagrams, and a wired pipeline harness.

use std::sync::Arc;

use chrono::Utc;

use diagen::config::PipelineConfig;
use diagen::event::Event;
use diagen::model::{
    Component, ComponentKind, Diagram, Metadata, Method, PipelineRequest, PromptTag, PromptTarget,
};
use diagen::pipeline::GenerationPipeline;
use diagen::registry::{EventChannel, SessionRegistry};
use diagen::stage::StageSet;
use diagen::store::{ChatStore, DiagramStore, InMemoryChatStore, InMemoryDiagramStore};

pub const PROJECT: &str = "p1";
pub const API: &str = "a1";

pub fn request(tag: PromptTag) -> PipelineRequest {
    PipelineRequest {
        project_id: PROJECT.into(),
        api_id: API.into(),
        tag,
        prompt_type: PromptTarget::Body,
        message: "please look at the order flow".into(),
        target_method_ids: vec![],
    }
}

pub fn request_targeting(tag: PromptTag, method_id: &str) -> PipelineRequest {
    PipelineRequest {
        target_method_ids: vec![method_id.to_string()],
        ..request(tag)
    }
}

/// A stored diagram at `version` with one component owning method `m1`.
pub fn seeded_diagram(version: i64) -> Diagram {
    Diagram {
        diagram_id: format!("d-seed-{version}"),
        project_id: PROJECT.into(),
        api_id: API.into(),
        components: vec![Component {
            component_id: "c1".into(),
            kind: ComponentKind::Class,
            name: "LegacyService".into(),
            description: None,
            position_x: 0.0,
            position_y: 0.0,
            methods: vec![Method {
                method_id: "m1".into(),
                name: "handle".into(),
                signature: "handle(): void".into(),
                body: Some("return;".into()),
                description: None,
            }],
        }],
        connections: vec![],
        dtos: vec![],
        metadata: Metadata {
            metadata_id: format!("meta-{version}"),
            version,
            last_modified: Utc::now(),
            name: None,
            description: None,
        },
    }
}

/// Everything a pipeline test needs, with handles kept on the concrete
/// in-memory stores for assertions.
pub struct Harness {
    pub registry: SessionRegistry,
    pub diagrams: Arc<InMemoryDiagramStore>,
    pub chats: Arc<InMemoryChatStore>,
    pub pipeline: Arc<GenerationPipeline>,
}

pub fn harness(stages: StageSet) -> Harness {
    harness_with_config(stages, PipelineConfig::default())
}

pub fn harness_with_config(stages: StageSet, config: PipelineConfig) -> Harness {
    diagen::telemetry::init_tracing();
    let registry = SessionRegistry::new();
    let diagrams = Arc::new(InMemoryDiagramStore::from_config(&config));
    let chats = Arc::new(InMemoryChatStore::new());
    let pipeline = Arc::new(GenerationPipeline::new(
        stages,
        registry.clone(),
        Arc::clone(&diagrams) as Arc<dyn DiagramStore>,
        Arc::clone(&chats) as Arc<dyn ChatStore>,
        config,
    ));
    Harness {
        registry,
        diagrams,
        chats,
        pipeline,
    }
}

/// Drain every event currently queued on the channel.
pub fn drain(channel: &EventChannel) -> Vec<Event> {
    let mut events = Vec::new();
    while let Some(event) = channel.try_recv() {
        events.push(event);
    }
    events
}
