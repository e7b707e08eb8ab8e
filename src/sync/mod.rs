// src/sync/mod.rs
pub mod feed;
pub mod pass;

pub use feed::{SubmissionFeed, SubmissionPage, SubmissionRow};
pub use pass::{PassOutcome, SubmissionSync, SyncPlan, SyncReport, members_lacking_urls, plan};
