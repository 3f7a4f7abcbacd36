use std::io::{self, Write};

use anyhow::{Context, Result};
use medchat_migrate_core::MigrationSummary;
use medchat_migrate_engine::{run_migration, MigrationConfig, PhaseReport, RunObserver};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Progress lines and the summary table go to stdout; logs go to stderr.
struct ConsoleProgress<W: Write> {
    out: W,
}

impl<W: Write> ConsoleProgress<W> {
    fn emit(&mut self, text: &dyn std::fmt::Display) {
        if let Err(err) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            tracing::warn!(error = %err, "failed to write progress to stdout");
        }
    }
}

impl<W: Write> RunObserver for ConsoleProgress<W> {
    fn phase_completed(&mut self, report: &PhaseReport<'_>) {
        self.emit(report);
    }

    fn summary_ready(&mut self, summary: &MigrationSummary) {
        self.emit(&"");
        self.emit(summary);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy(),
        )
        .with_writer(io::stderr)
        .init();

    let config = MigrationConfig::from_env().context("invalid configuration")?;
    let mut progress = ConsoleProgress { out: io::stdout().lock() };
    let report = run_migration(&config, &mut progress)?;

    if let Some(path) = &config.report_path {
        if let Err(err) = report.write_json(path) {
            tracing::error!(error = %format!("{err:#}"), "run report was not written");
        }
    }
    Ok(())
}
