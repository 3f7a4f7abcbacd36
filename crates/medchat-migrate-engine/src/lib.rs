//! Migration engine: entity migrators, phase orchestration, and store lifecycle.

pub mod config;
pub mod entities;
pub mod lifecycle;
pub mod migrator;
pub mod orchestrator;
pub mod report;

use time::OffsetDateTime;

pub use config::{ConfigError, MigrationConfig};
pub use entities::AccountLedger;
pub use lifecycle::{ConfiguredStores, FatalConnectionError, StoreConnector, StoreGuard};
pub use migrator::{EntityMigrator, RecordFailure, RecordWriter};
pub use orchestrator::{Orchestrator, Phase, PhaseReport, RunObserver, RunState};
pub use report::RunReport;

/// Run one migration against the stores named by `config`.
///
/// # Errors
/// Returns an error when either store cannot be acquired. Record failures are
/// reported in the summary instead.
pub fn run_migration(
    config: &MigrationConfig,
    observer: &mut dyn RunObserver,
) -> Result<RunReport, FatalConnectionError> {
    let started_at = OffsetDateTime::now_utc();
    let mut orchestrator = Orchestrator::new(config.audit_log_limit);
    let summary = orchestrator.run(&ConfiguredStores::new(config), observer)?;
    Ok(RunReport::new(started_at, &orchestrator, summary))
}
