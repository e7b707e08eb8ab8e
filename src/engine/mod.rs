// src/engine/mod.rs
pub mod merge;
pub mod pool;
pub mod ranking;

pub use merge::{
    Candidate, FailureTally, SubmissionRef, attach_submission, mark_no_update, merge_if_better,
    reconcile_with_previous, seed_partial_refresh,
};
pub use pool::{CancelToken, WorkerPool};
pub use ranking::assign_places;
