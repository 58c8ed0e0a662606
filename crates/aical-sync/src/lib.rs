//! Sync engine: reconcilers, cycle orchestration, scheduling and the history
//! consumer API.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use aical_gateway::StaticGateway;
//! use aical_store::MemoryStore;
//! use aical_sync::{SyncConfig, SyncOrchestrator};
//!
//! # async fn demo() {
//! let orchestrator = SyncOrchestrator::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(StaticGateway::new()),
//!     SyncConfig::default(),
//! );
//! let outcome = orchestrator.run_sync_cycle().await;
//! assert!(outcome.is_completed());
//! # }
//! ```

pub mod calendar_sync;
pub mod deadline;
pub mod error;
pub mod event_sync;
pub mod history;
pub mod orchestrator;
pub mod scheduler;

pub use calendar_sync::{CalendarReconciler, CalendarSyncReport};
pub use deadline::Deadline;
pub use error::{SyncError, SyncResult};
pub use event_sync::{EventReconciler, EventSyncReport};
pub use history::EventHistoryService;
pub use orchestrator::{CycleOutcome, CycleReport, SyncConfig, SyncOrchestrator};
pub use scheduler::{
    Job, JobFuture, JobHandler, JobSpec, Scheduler, SchedulerCommand, SchedulerConfig,
    SchedulerError, SchedulerHandle,
};
