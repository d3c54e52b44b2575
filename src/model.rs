//! Domain data model: diagrams, pipeline requests, and the chat audit trail.
//!
//! The wire names (camelCase fields, SCREAMING enum values, the `dto` list
//! key) are preserved from the documents existing clients and storage already
//! hold, so serialized values stay interchangeable across versions.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Intent tag attached to a user request.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptTag {
    Explain,
    Refactoring,
    Optimize,
    Document,
    Test,
    Security,
    Convention,
    Analyze,
    Implement,
}

impl PromptTag {
    /// Tags that ask for prose rather than a diagram change. Used to pick the
    /// `EXPLANATION` audit status over plain `UNCHANGED`.
    pub fn is_explanatory(&self) -> bool {
        matches!(self, PromptTag::Explain | PromptTag::Analyze | PromptTag::Document)
    }
}

/// Which part of the targeted methods the request talks about.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptTarget {
    Signature,
    Body,
}

/// Terminal status recorded for one pipeline run.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Modified,
    ModifiedWithNewComponents,
    Unchanged,
    Explanation,
    Error,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentKind {
    Class,
    Interface,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionKind {
    Solid,
    Dotted,
}

/// Immutable input to one pipeline run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    pub project_id: String,
    pub api_id: String,
    pub tag: PromptTag,
    pub prompt_type: PromptTarget,
    pub message: String,
    #[serde(default)]
    pub target_method_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    pub method_id: String,
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub component_id: String,
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub position_x: f64,
    pub position_y: f64,
    pub methods: Vec<Method>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub connection_id: String,
    pub source_method_id: String,
    pub target_method_id: String,
    #[serde(rename = "type")]
    pub kind: ConnectionKind,
}

/// Data-transfer-object schema attached to a diagram.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DtoSchema {
    pub dto_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub metadata_id: String,
    /// Strictly increasing per (projectId, apiId); allocated by the store.
    pub version: i64,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// One persisted snapshot of an API class diagram.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub diagram_id: String,
    pub project_id: String,
    pub api_id: String,
    pub components: Vec<Component>,
    pub connections: Vec<Connection>,
    #[serde(rename = "dto", default)]
    pub dtos: Vec<DtoSchema>,
    pub metadata: Metadata,
}

impl Diagram {
    /// Check that component, method, and connection ids are pairwise unique.
    pub fn has_unique_ids(&self) -> bool {
        let mut seen = FxHashSet::default();
        for component in &self.components {
            if !seen.insert(component.component_id.as_str()) {
                return false;
            }
        }
        seen.clear();
        for method in self.components.iter().flat_map(|c| c.methods.iter()) {
            if !seen.insert(method.method_id.as_str()) {
                return false;
            }
        }
        seen.clear();
        for connection in &self.connections {
            if !seen.insert(connection.connection_id.as_str()) {
                return false;
            }
        }
        true
    }

    /// True when any component owns the given method id.
    pub fn contains_method(&self, method_id: &str) -> bool {
        self.components
            .iter()
            .flat_map(|c| c.methods.iter())
            .any(|m| m.method_id == method_id)
    }

    /// Methods referenced by the given ids, in diagram order.
    pub fn methods_by_ids(&self, ids: &[String]) -> Vec<Method> {
        self.components
            .iter()
            .flat_map(|c| c.methods.iter())
            .filter(|m| ids.iter().any(|id| *id == m.method_id))
            .cloned()
            .collect()
    }
}

/// Version outcome reported to the client and recorded in the audit trail.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfoPayload {
    pub new_version_id: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl VersionInfoPayload {
    pub fn new(version: i64, description: impl Into<String>) -> Self {
        Self {
            new_version_id: version.to_string(),
            description: Some(description.into()),
        }
    }
}

/// The user half of an audit entry: the request as received.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserChat {
    pub tag: PromptTag,
    pub prompt_type: PromptTarget,
    pub message: String,
    #[serde(default)]
    pub target_method_ids: Vec<String>,
}

impl From<&PipelineRequest> for UserChat {
    fn from(request: &PipelineRequest) -> Self {
        Self {
            tag: request.tag,
            prompt_type: request.prompt_type,
            message: request.message.clone(),
            target_method_ids: request.target_method_ids.clone(),
        }
    }
}

/// The system half of an audit entry: how the run ended.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SystemChat {
    pub system_chat_id: String,
    pub status: PipelineStatus,
    pub message: String,
    #[serde(default)]
    pub version_info: Option<VersionInfoPayload>,
    #[serde(default)]
    pub diagram_id: Option<String>,
}

impl SystemChat {
    pub fn new(
        status: PipelineStatus,
        message: impl Into<String>,
        version_info: Option<VersionInfoPayload>,
        diagram_id: Option<String>,
    ) -> Self {
        Self {
            system_chat_id: Uuid::new_v4().to_string(),
            status,
            message: message.into(),
            version_info,
            diagram_id,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(PipelineStatus::Error, message, None, None)
    }
}

/// Immutable audit entry pairing a request with its outcome.
///
/// Exactly one record is written per pipeline run, on every branch including
/// failure, so the audit trail is never silently incomplete.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub chat_id: String,
    pub project_id: String,
    pub api_id: String,
    pub created_at: DateTime<Utc>,
    pub user_chat: UserChat,
    pub system_chat: SystemChat,
}

impl ChatRecord {
    pub fn new(request: &PipelineRequest, system_chat: SystemChat) -> Self {
        Self {
            chat_id: Uuid::new_v4().to_string(),
            project_id: request.project_id.clone(),
            api_id: request.api_id.clone(),
            created_at: Utc::now(),
            user_chat: UserChat::from(request),
            system_chat,
        }
    }
}
