//! Acquisition and guaranteed release of the two store connections.

use medchat_migrate_core::{ConnectError, DocumentSource, ReleaseError, TargetStore};
use medchat_source_ndjson::NdjsonSource;
use medchat_target_sqlite::SqliteTarget;
use thiserror::Error;

use crate::config::MigrationConfig;

/// The only error class that stops a run. Raised before any phase starts.
#[derive(Debug, Error)]
#[error("failed to acquire stores: {0}")]
pub struct FatalConnectionError(#[from] pub ConnectError);

pub trait StoreConnector {
    type Source: DocumentSource;
    type Target: TargetStore;

    /// # Errors
    /// Returns an error when the source store cannot be reached.
    fn connect_source(&self) -> Result<Self::Source, ConnectError>;

    /// # Errors
    /// Returns an error when the target store cannot be reached or its schema is unusable.
    fn connect_target(&self) -> Result<Self::Target, ConnectError>;
}

/// Both open stores. Dropping the guard releases whatever is still held, so a
/// panic inside a phase still closes the connections.
pub struct StoreGuard<S, T>
where
    S: DocumentSource,
    T: TargetStore,
{
    source: Option<S>,
    target: Option<T>,
}

impl<S, T> StoreGuard<S, T>
where
    S: DocumentSource,
    T: TargetStore,
{
    /// Connect the source first, then the target. A source opened before the target
    /// fails is released before the error is returned.
    ///
    /// # Errors
    /// Returns an error when either store cannot be acquired.
    pub fn acquire<C>(connector: &C) -> Result<Self, FatalConnectionError>
    where
        C: StoreConnector<Source = S, Target = T>,
    {
        let source = connector.connect_source()?;
        match connector.connect_target() {
            Ok(target) => {
                tracing::info!("acquired source and target stores");
                Ok(Self { source: Some(source), target: Some(target) })
            }
            Err(err) => {
                if let Err(release_err) = source.release() {
                    tracing::warn!(error = %release_err, "source release failed after target error");
                }
                Err(FatalConnectionError(err))
            }
        }
    }

    /// Borrow both stores. `None` only after an explicit release.
    pub fn stores(&mut self) -> Option<(&mut S, &mut T)> {
        match (self.source.as_mut(), self.target.as_mut()) {
            (Some(source), Some(target)) => Some((source, target)),
            _ => None,
        }
    }

    /// Release both stores, returning every failure instead of stopping at the first.
    #[must_use]
    pub fn release(mut self) -> Vec<ReleaseError> {
        self.release_held()
    }

    fn release_held(&mut self) -> Vec<ReleaseError> {
        let mut failures = Vec::new();
        if let Some(source) = self.source.take() {
            if let Err(err) = source.release() {
                failures.push(err);
            }
        }
        if let Some(target) = self.target.take() {
            if let Err(err) = target.release() {
                failures.push(err);
            }
        }
        failures
    }
}

impl<S, T> Drop for StoreGuard<S, T>
where
    S: DocumentSource,
    T: TargetStore,
{
    fn drop(&mut self) {
        for err in self.release_held() {
            tracing::warn!(error = %err, "store release failed during unwind");
        }
    }
}

/// Opens the stores named by a [`MigrationConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConfiguredStores<'c> {
    config: &'c MigrationConfig,
}

impl<'c> ConfiguredStores<'c> {
    #[must_use]
    pub fn new(config: &'c MigrationConfig) -> Self {
        Self { config }
    }
}

impl StoreConnector for ConfiguredStores<'_> {
    type Source = NdjsonSource;
    type Target = SqliteTarget;

    fn connect_source(&self) -> Result<NdjsonSource, ConnectError> {
        NdjsonSource::open(&self.config.source_uri)
            .map_err(|err| ConnectError::Source(format!("{err:#}")))
    }

    fn connect_target(&self) -> Result<SqliteTarget, ConnectError> {
        let target_error = |err: anyhow::Error| ConnectError::Target(format!("{err:#}"));
        let mut target = SqliteTarget::open(&self.config.target_database).map_err(target_error)?;
        if self.config.bootstrap_schema {
            target.migrate().map_err(target_error)?;
        } else {
            target.verify_schema().map_err(target_error)?;
        }
        Ok(target)
    }
}
