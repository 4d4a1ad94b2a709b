pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod inspect;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod schema;
pub mod store;

pub use config::SyncConfig;
pub use error::{Result, StoreError, SyncError};
pub use models::{EntityOutcome, EntityReport, SyncCounts, SyncReport};
pub use orchestrator::{SyncContext, SyncOrchestrator, perform_sync, sync_with_config};
