//! Versioned diagram persistence and the chat audit store.
//!
//! The orchestrator consumes the [`DiagramStore`] and [`ChatStore`] traits;
//! production backends live elsewhere. The in-memory implementations here
//! back the tests and double as the reference semantics: in particular,
//! [`InMemoryDiagramStore::create_new_version`] allocates versions with an
//! observe–validate–commit loop, so two concurrent writers for the same
//! (projectId, apiId) can never both claim the same version number.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::model::{ChatRecord, Diagram};

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("version allocation conflict for ({project_id}, {api_id}) after {attempts} attempts")]
    #[diagnostic(
        code(diagen::store::version_conflict),
        help("Concurrent writers kept winning the allocation race; raise the retry budget.")
    )]
    VersionConflict {
        project_id: String,
        api_id: String,
        attempts: usize,
    },

    #[error("persistence backend failure: {0}")]
    #[diagnostic(code(diagen::store::backend))]
    Backend(String),
}

/// Persistence contract for versioned diagrams, keyed by (projectId, apiId).
#[async_trait]
pub trait DiagramStore: Send + Sync {
    /// The highest-versioned diagram for the key, if any exists.
    async fn find_latest(&self, project_id: &str, api_id: &str)
    -> Result<Option<Diagram>, StoreError>;

    /// Persist `candidate` as the next version for its key.
    ///
    /// Implementations must serialize version allocation per key: the stored
    /// version is `1 + max(existing versions)`, and two concurrent calls must
    /// never compute the same number. Conflicts are retried internally and
    /// surface as [`StoreError::VersionConflict`] only once retries run out.
    async fn create_new_version(&self, candidate: Diagram) -> Result<Diagram, StoreError>;

    /// The diagram that currently owns the given method id, if any.
    async fn find_by_method_id(
        &self,
        project_id: &str,
        api_id: &str,
        method_id: &str,
    ) -> Result<Option<Diagram>, StoreError>;
}

/// Append-only audit log of pipeline runs.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn append(&self, record: ChatRecord) -> Result<(), StoreError>;

    /// All records for a (projectId, apiId), in insertion order.
    async fn list(&self, project_id: &str, api_id: &str) -> Result<Vec<ChatRecord>, StoreError>;
}

type DiagramKey = (String, String);

/// In-memory [`DiagramStore`] for tests and single-process deployments.
#[derive(Debug)]
pub struct InMemoryDiagramStore {
    inner: RwLock<FxHashMap<DiagramKey, Vec<Diagram>>>,
    retry_budget: usize,
}

impl InMemoryDiagramStore {
    pub const DEFAULT_RETRY_BUDGET: usize = 3;

    pub fn new() -> Self {
        Self::with_retry_budget(Self::DEFAULT_RETRY_BUDGET)
    }

    /// `retry_budget` bounds the allocation attempts in
    /// [`create_new_version`](DiagramStore::create_new_version); a budget of
    /// zero makes every call fail with a conflict, which tests use to drive
    /// the retries-exhausted path.
    pub fn with_retry_budget(retry_budget: usize) -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
            retry_budget,
        }
    }

    /// Build a store honoring [`PipelineConfig::persist_retry_budget`], so
    /// `DIAGEN_PERSIST_RETRIES` takes effect without hand-wiring.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_retry_budget(config.persist_retry_budget)
    }

    /// Seed the store with an existing diagram at its recorded version.
    pub fn seed(&self, diagram: Diagram) {
        let key = (diagram.project_id.clone(), diagram.api_id.clone());
        let mut inner = self.inner.write().expect("diagram store poisoned");
        inner.entry(key).or_default().push(diagram);
    }

    /// Count of stored versions for a key.
    pub fn version_count(&self, project_id: &str, api_id: &str) -> usize {
        let inner = self.inner.read().expect("diagram store poisoned");
        inner
            .get(&(project_id.to_string(), api_id.to_string()))
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn max_version(versions: &[Diagram]) -> i64 {
        versions.iter().map(|d| d.metadata.version).max().unwrap_or(0)
    }
}

impl Default for InMemoryDiagramStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiagramStore for InMemoryDiagramStore {
    async fn find_latest(
        &self,
        project_id: &str,
        api_id: &str,
    ) -> Result<Option<Diagram>, StoreError> {
        let inner = self.inner.read().expect("diagram store poisoned");
        Ok(inner
            .get(&(project_id.to_string(), api_id.to_string()))
            .and_then(|versions| {
                versions
                    .iter()
                    .max_by_key(|d| d.metadata.version)
                    .cloned()
            }))
    }

    async fn create_new_version(&self, mut candidate: Diagram) -> Result<Diagram, StoreError> {
        let key = (candidate.project_id.clone(), candidate.api_id.clone());

        // Optimistic allocation: observe the current max under a read lock,
        // then commit under the write lock only if nothing moved. The loop
        // mirrors a unique-(projectId, apiId, version) constraint with retry.
        for _ in 0..self.retry_budget {
            let observed = {
                let inner = self.inner.read().expect("diagram store poisoned");
                inner.get(&key).map(|v| Self::max_version(v)).unwrap_or(0)
            };

            let mut inner = self.inner.write().expect("diagram store poisoned");
            let versions = inner.entry(key.clone()).or_default();
            if Self::max_version(versions) != observed {
                tracing::debug!(
                    project = %key.0,
                    api = %key.1,
                    observed,
                    "lost version allocation race, retrying"
                );
                continue;
            }

            candidate.metadata.version = observed + 1;
            candidate.metadata.last_modified = Utc::now();
            versions.push(candidate.clone());
            tracing::debug!(
                project = %key.0,
                api = %key.1,
                version = candidate.metadata.version,
                diagram = %candidate.diagram_id,
                "new diagram version persisted"
            );
            return Ok(candidate);
        }

        Err(StoreError::VersionConflict {
            project_id: key.0,
            api_id: key.1,
            attempts: self.retry_budget,
        })
    }

    async fn find_by_method_id(
        &self,
        project_id: &str,
        api_id: &str,
        method_id: &str,
    ) -> Result<Option<Diagram>, StoreError> {
        let inner = self.inner.read().expect("diagram store poisoned");
        Ok(inner
            .get(&(project_id.to_string(), api_id.to_string()))
            .and_then(|versions| {
                // Later versions own the method when several contain it.
                versions
                    .iter()
                    .filter(|d| d.contains_method(method_id))
                    .max_by_key(|d| d.metadata.version)
                    .cloned()
            }))
    }
}

/// In-memory append-only [`ChatStore`].
#[derive(Debug, Default)]
pub struct InMemoryChatStore {
    records: RwLock<Vec<ChatRecord>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.read().expect("chat store poisoned").len()
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn append(&self, record: ChatRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().expect("chat store poisoned");
        records.push(record);
        Ok(())
    }

    async fn list(&self, project_id: &str, api_id: &str) -> Result<Vec<ChatRecord>, StoreError> {
        let records = self.records.read().expect("chat store poisoned");
        Ok(records
            .iter()
            .filter(|r| r.project_id == project_id && r.api_id == api_id)
            .cloned()
            .collect())
    }
}
