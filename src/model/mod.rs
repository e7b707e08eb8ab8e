// src/model/mod.rs
//! Canonical standings model shared by every adapter.

pub mod cursor;
pub mod document;
pub mod standing;

pub use cursor::SyncCursor;
pub use document::{Contest, SourceCode, StandingsDocument, StandingsReply, UserInfo};
pub use standing::{Penalty, ProblemInfo, ProblemResult, RowAction, Standing, Verdict};
