// src/adapters/mod.rs
//! One adapter per platform, all behind `StandingsAdapter`.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::SyncOptions;
use crate::core::net::PageFetcher;
use crate::error::AdapterError;
use crate::model::{Contest, ProblemResult, SourceCode, Standing, StandingsReply, SyncCursor, UserInfo};

pub mod atcoder;
pub mod cells;
pub mod leaderboard;
pub mod yandex;

pub use atcoder::AtCoder;
pub use leaderboard::Leaderboard;
pub use yandex::Yandex;

/// What the orchestrator hands to `get_standings`.
#[derive(Clone, Debug, Default)]
pub struct StandingsRequest {
    /// Refresh only these members.
    pub users: Option<BTreeSet<String>>,
    /// Stored rows of the previous run.
    pub previous: Option<BTreeMap<String, Standing>>,
    /// Cursor stored after the previous run.
    pub cursor: Option<SyncCursor>,
}

pub trait StandingsAdapter: Send + Sync {
    fn get_standings(&self, request: &StandingsRequest) -> Result<StandingsReply, AdapterError>;

    /// Profile data per user, in input order. `profile_url` contains `{account}`.
    fn get_user_infos(&self, _users: &[String], _profile_url: &str) -> Result<Vec<UserInfo>, AdapterError> {
        Err(AdapterError::Unsupported("user infos"))
    }

    /// Source of the submission behind `problem.url`.
    fn get_source_code(&self, _problem: &ProblemResult) -> Result<SourceCode, AdapterError> {
        Err(AdapterError::Unsupported("source code"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Leaderboard,
    Yandex,
    AtCoder,
}

impl FromStr for Platform {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leaderboard" | "eolymp" | "e-olymp" => Ok(Platform::Leaderboard),
            "yandex" => Ok(Platform::Yandex),
            "atcoder" => Ok(Platform::AtCoder),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

pub fn build(
    platform: Platform,
    contest: Contest,
    fetcher: Arc<dyn PageFetcher>,
    opts: SyncOptions,
) -> Box<dyn StandingsAdapter> {
    match platform {
        Platform::Leaderboard => Box::new(Leaderboard::new(contest, fetcher, opts)),
        Platform::Yandex => Box::new(Yandex::new(contest, fetcher, opts)),
        Platform::AtCoder => Box::new(AtCoder::new(contest, fetcher, opts)),
    }
}
