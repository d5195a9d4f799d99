//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::CurriculumError;

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Curriculum(#[from] CurriculumError),
}

/// Errors emitted while configuring the REST remote store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RestConfigError {
    #[error("remote store URL is empty")]
    MissingUrl,
    #[error("remote store API key is empty")]
    MissingApiKey,
}
