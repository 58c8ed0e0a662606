//! Persistence for mirrored users, calendars, events and their audit trail.
//!
//! [`MemoryStore`] backs tests and dry runs, [`SqliteStore`] backs the daemon.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{
    BoxFuture, CalendarRepo, EventChange, EventHistoryRepo, EventRepo, Store, UserRepo,
    next_change_time,
};
