//! Per-entity migration counters and the rendered summary.
//!
//! Counters only grow. `total` counts attempted records, so `migrated + errors ==
//! total` always holds; orphan skips are never attempted and are kept in `skipped`.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Migrated,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityStats {
    pub total: u64,
    pub migrated: u64,
    pub errors: u64,
    pub skipped: u64,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(migrated: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        migrated as f64 / total as f64
    }
}

impl EntityStats {
    /// `migrated / total`, or zero when nothing was attempted.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.migrated, self.total)
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.migrated + self.errors == self.total
    }
}

#[derive(Debug, Clone, Default)]
pub struct MigrationStatistics {
    counters: BTreeMap<EntityKind, EntityStats>,
}

impl MigrationStatistics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EntityKind, outcome: Outcome) {
        let entry = self.counters.entry(kind).or_default();
        entry.total += 1;
        match outcome {
            Outcome::Migrated => entry.migrated += 1,
            Outcome::Failed => entry.errors += 1,
        }
    }

    /// Children that were never attempted because their parent did not migrate.
    pub fn record_orphans(&mut self, kind: EntityKind, count: usize) {
        if count == 0 {
            return;
        }
        let entry = self.counters.entry(kind).or_default();
        entry.skipped += u64::try_from(count).unwrap_or(u64::MAX);
    }

    #[must_use]
    pub fn get(&self, kind: EntityKind) -> EntityStats {
        self.counters.get(&kind).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn is_untouched(&self) -> bool {
        self.counters.values().all(|stats| *stats == EntityStats::default())
    }

    #[must_use]
    pub fn summarize(&self) -> MigrationSummary {
        let entities = EntityKind::ALL
            .into_iter()
            .map(|entity| EntitySummary::new(entity, self.get(entity)))
            .collect::<Vec<_>>();

        let mut overall = EntityStats::default();
        for row in &entities {
            overall.total += row.stats.total;
            overall.migrated += row.stats.migrated;
            overall.errors += row.stats.errors;
            overall.skipped += row.stats.skipped;
        }

        MigrationSummary { entities, overall: OverallSummary::new(overall) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySummary {
    pub entity: EntityKind,
    #[serde(flatten)]
    pub stats: EntityStats,
    pub success_rate: f64,
}

impl EntitySummary {
    fn new(entity: EntityKind, stats: EntityStats) -> Self {
        Self { entity, stats, success_rate: stats.success_rate() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverallSummary {
    #[serde(flatten)]
    pub stats: EntityStats,
    pub success_rate: f64,
}

impl OverallSummary {
    fn new(stats: EntityStats) -> Self {
        Self { stats, success_rate: stats.success_rate() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MigrationSummary {
    pub entities: Vec<EntitySummary>,
    pub overall: OverallSummary,
}

impl MigrationSummary {
    #[must_use]
    pub fn entity(&self, kind: EntityKind) -> Option<&EntitySummary> {
        self.entities.iter().find(|row| row.entity == kind)
    }

    /// # Errors
    /// Returns an error when the summary cannot be serialized.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn write_row(
    f: &mut Formatter<'_>,
    label: &str,
    stats: &EntityStats,
    success_rate: f64,
) -> std::fmt::Result {
    writeln!(
        f,
        "{label:<16} {:>8} {:>9} {:>7} {:>8} {:>8.1}%",
        stats.total,
        stats.migrated,
        stats.errors,
        stats.skipped,
        success_rate * 100.0
    )
}

impl Display for MigrationSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{:<16} {:>8} {:>9} {:>7} {:>8} {:>9}",
            "entity", "total", "migrated", "errors", "skipped", "success"
        )?;
        writeln!(f, "{}", "-".repeat(62))?;
        for row in &self.entities {
            write_row(f, row.entity.as_str(), &row.stats, row.success_rate)?;
        }
        writeln!(f, "{}", "-".repeat(62))?;
        write_row(f, "overall", &self.overall.stats, self.overall.success_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_totals_balanced() {
        let mut stats = MigrationStatistics::new();
        stats.record(EntityKind::Account, Outcome::Migrated);
        stats.record(EntityKind::Account, Outcome::Failed);
        stats.record(EntityKind::Account, Outcome::Migrated);

        let account = stats.get(EntityKind::Account);
        assert_eq!(account, EntityStats { total: 3, migrated: 2, errors: 1, skipped: 0 });
        assert!(account.is_balanced());
    }

    #[test]
    fn orphans_do_not_count_as_attempts() {
        let mut stats = MigrationStatistics::new();
        stats.record_orphans(EntityKind::Allergy, 4);
        stats.record_orphans(EntityKind::Allergy, 0);

        let allergy = stats.get(EntityKind::Allergy);
        assert_eq!(allergy.total, 0);
        assert_eq!(allergy.errors, 0);
        assert_eq!(allergy.skipped, 4);
        assert!(allergy.is_balanced());
    }

    #[test]
    fn success_rate_is_zero_without_attempts() {
        let summary = MigrationStatistics::new().summarize();
        assert_eq!(summary.entities.len(), EntityKind::ALL.len());
        assert!(summary.entities.iter().all(|row| row.success_rate == 0.0));
        assert_eq!(summary.overall.success_rate, 0.0);
    }

    #[test]
    fn summary_renders_when_everything_failed() {
        let mut stats = MigrationStatistics::new();
        stats.record(EntityKind::Conversation, Outcome::Failed);
        stats.record(EntityKind::Conversation, Outcome::Failed);
        let summary = stats.summarize();

        let conversation = summary.entity(EntityKind::Conversation);
        assert_eq!(conversation.map(|row| row.stats.errors), Some(2));
        assert_eq!(summary.overall.stats.total, 2);
        assert_eq!(summary.overall.success_rate, 0.0);

        let rendered = summary.to_string();
        assert!(rendered.contains("conversation"));
        assert!(rendered.contains("overall"));
        assert!(rendered.contains("0.0%"));
    }

    #[test]
    fn summary_json_flattens_counters() -> Result<(), serde_json::Error> {
        let mut stats = MigrationStatistics::new();
        stats.record(EntityKind::Account, Outcome::Migrated);
        stats.record_orphans(EntityKind::Allergy, 1);

        let value: serde_json::Value = serde_json::from_str(&stats.summarize().to_json()?)?;
        assert_eq!(value["entities"][0]["entity"], "account");
        assert_eq!(value["entities"][0]["migrated"], 1);
        assert_eq!(value["entities"][2]["skipped"], 1);
        assert_eq!(value["overall"]["total"], 1);
        Ok(())
    }

    #[test]
    fn overall_aggregates_every_entity() {
        let mut stats = MigrationStatistics::new();
        stats.record(EntityKind::Account, Outcome::Migrated);
        stats.record(EntityKind::Message, Outcome::Migrated);
        stats.record(EntityKind::Message, Outcome::Failed);
        stats.record(EntityKind::AuditLog, Outcome::Migrated);
        stats.record_orphans(EntityKind::Symptom, 2);

        let overall = stats.summarize().overall;
        assert_eq!(overall.stats, EntityStats { total: 4, migrated: 3, errors: 1, skipped: 2 });
        assert!((overall.success_rate - 0.75).abs() < f64::EPSILON);
        assert!(!stats.is_untouched());
    }
}
