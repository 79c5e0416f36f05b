//! Listing synchronization for the real-estate back-office.
//!
//! Incoming feed records are reconciled into a SQLite store: unchanged
//! records are skipped by fingerprint, locally-owned moderation flags are
//! preserved across re-syncs, and new images are queued for download.

pub mod config;
pub mod display;
pub mod errors;
pub mod feed;
pub mod media;
pub mod models;
pub mod policy;
pub mod store;
pub mod sync;

pub use config::Config;
pub use errors::{FailureReason, Result, SyncError};
pub use store::{Store, StoreOptions};
pub use sync::{ImageReport, UpsertEngine, UpsertReport};
