//! Listing synchronization: fingerprints, preserved state, upsert and image tracking

pub mod extensions;
pub mod fingerprint;
pub mod images;
pub mod locks;
pub mod report;
pub mod state;
pub mod upsert;

pub use fingerprint::{compute_hash, has_changed, Digest};
pub use images::{primary_image, ImageReport};
pub use report::{OutcomeKind, RecordFailure, RecordOutcome, ReferenceResolutionWarning, UpsertReport};
pub use upsert::UpsertEngine;
