//! Runtime configuration for pipeline runs.

use crate::store::InMemoryDiagramStore;

/// Tunables for one pipeline instance.
///
/// Resolved from the environment (`.env` supported via `dotenvy`) or built
/// explicitly; defaults are sensible for production.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Emit a `Progress` frame at each generation stage boundary.
    pub stage_progress: bool,
    /// Allocation attempts granted to stores that version optimistically.
    pub persist_retry_budget: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_progress: true,
            persist_retry_budget: InMemoryDiagramStore::DEFAULT_RETRY_BUDGET,
        }
    }
}

impl PipelineConfig {
    /// Read `DIAGEN_STAGE_PROGRESS` and `DIAGEN_PERSIST_RETRIES` from the
    /// environment, falling back to defaults for anything unset or invalid.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            stage_progress: std::env::var("DIAGEN_STAGE_PROGRESS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.stage_progress),
            persist_retry_budget: std::env::var("DIAGEN_PERSIST_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.persist_retry_budget),
        }
    }

    #[must_use]
    pub fn with_stage_progress(mut self, stage_progress: bool) -> Self {
        self.stage_progress = stage_progress;
        self
    }

    #[must_use]
    pub fn with_persist_retry_budget(mut self, budget: usize) -> Self {
        self.persist_retry_budget = budget;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_production_sane() {
        let config = PipelineConfig::default();
        assert!(config.stage_progress);
        assert_eq!(
            config.persist_retry_budget,
            InMemoryDiagramStore::DEFAULT_RETRY_BUDGET
        );
    }

    #[test]
    fn builders_override_fields() {
        let config = PipelineConfig::default()
            .with_stage_progress(false)
            .with_persist_retry_budget(9);
        assert!(!config.stage_progress);
        assert_eq!(config.persist_retry_budget, 9);
    }
}
