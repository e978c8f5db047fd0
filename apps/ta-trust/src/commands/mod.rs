pub mod check;
pub mod evaluate;
pub mod events;
pub mod metrics;
pub mod status;

use ta_graduation::{GraduationEngine, JsonMetricsStore, ThresholdConfig, TrustPaths};

/// Everything a subcommand needs, resolved once in `main`.
pub struct TrustContext {
    pub paths: TrustPaths,
    pub thresholds: ThresholdConfig,
}

impl TrustContext {
    pub fn store(&self) -> anyhow::Result<JsonMetricsStore> {
        Ok(JsonMetricsStore::new(&self.paths.metrics_dir)?)
    }

    pub fn engine(&self) -> anyhow::Result<GraduationEngine<JsonMetricsStore>> {
        Ok(GraduationEngine::new(
            self.store()?,
            self.thresholds.clone(),
        )?)
    }
}

#[cfg(test)]
pub(crate) fn test_context(root: &std::path::Path) -> TrustContext {
    TrustContext {
        paths: TrustPaths::for_project(root),
        thresholds: ThresholdConfig::default(),
    }
}
