#![forbid(unsafe_code)]

pub mod app_services;
pub mod auth;
pub mod connectivity;
pub mod error;
pub mod progress_store;
pub mod remote_client;
pub mod sync_service;

pub use study_core::Clock;

pub use app_services::AppServices;
pub use auth::{AuthContext, SessionAuth};
pub use connectivity::Connectivity;
pub use error::{AppServicesError, RestConfigError};
pub use progress_store::ProgressStore;
pub use remote_client::{RestConfig, RestProgressStore};
pub use sync_service::{SkipReason, SubscriptionId, SweepOutcome, SyncConfig, SyncService};
