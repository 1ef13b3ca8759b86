//! Result persistence
//!
//! The engine writes the consolidated report through the [`ResultStore`]
//! trait. The filesystem implementation stages the JSON under a temporary
//! name and renames it into place, so an artifact is either fully present or
//! absent — never half-written.

use anyhow::{Context, Result};
use chrono::Utc;
use novel_analyzer_sdk::{async_trait, AnalysisReport};
use std::path::PathBuf;
use tokio::fs;

/// Durable sink for consolidated analysis reports
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Write the report to a new, uniquely named location and return it
    async fn write(&self, report: &AnalysisReport) -> Result<PathBuf>;
}

/// Filesystem store writing timestamp-qualified JSON artifacts
pub struct FsResultStore {
    output_dir: PathBuf,
}

impl FsResultStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn write(&self, report: &AnalysisReport) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await.with_context(|| {
            format!(
                "Failed to create output directory: {}",
                self.output_dir.display()
            )
        })?;

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let path = self.output_dir.join(format!("analysis-{}.json", timestamp));
        let staging = self
            .output_dir
            .join(format!(".analysis-{}.json.tmp", timestamp));

        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        fs::write(&staging, &json)
            .await
            .with_context(|| format!("Failed to write report: {}", staging.display()))?;
        fs::rename(&staging, &path)
            .await
            .with_context(|| format!("Failed to finalize report: {}", path.display()))?;

        Ok(path)
    }
}
