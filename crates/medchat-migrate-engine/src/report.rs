//! Machine-readable record of a finished run.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use medchat_migrate_core::MigrationSummary;
use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

use crate::migrator::RecordFailure;
use crate::orchestrator::{Orchestrator, RunState};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Ulid,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub audit_log_limit: usize,
    pub states: Vec<RunState>,
    pub summary: MigrationSummary,
    pub warnings: Vec<String>,
    pub failures: Vec<RecordFailure>,
}

impl RunReport {
    #[must_use]
    pub fn new(
        started_at: OffsetDateTime,
        orchestrator: &Orchestrator,
        summary: MigrationSummary,
    ) -> Self {
        Self {
            run_id: Ulid::new(),
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            audit_log_limit: orchestrator.audit_log_limit(),
            states: orchestrator.states().to_vec(),
            summary,
            warnings: orchestrator.warnings().to_vec(),
            failures: orchestrator.failures().to_vec(),
        }
    }

    /// # Errors
    /// Returns an error when the report cannot be serialized or written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self).context("failed to serialize run report")?;
        fs::write(path, body)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
        tracing::info!(path = %path.display(), run_id = %self.run_id, "wrote run report");
        Ok(())
    }
}
