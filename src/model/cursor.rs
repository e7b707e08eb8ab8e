// src/model/cursor.rs
use serde::{Deserialize, Serialize};

use crate::config::consts::{DEFAULT_LAST_PAGE, DEFAULT_LAST_SUBMISSION_TIME};

fn unset() -> i64 {
    DEFAULT_LAST_SUBMISSION_TIME
}

/// Resumption state of the submissions crawl. The caller stores it between
/// invocations (keyed by contest) and hands it back unchanged.
///
/// - `last_submission_time`: watermark of the last *completed* pass (`-1` = none).
/// - `last_page`: last page merged by an interrupted pass; `None` once a pass completes.
/// - `last_page_submission_time`: running maximum of the interrupted pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    #[serde(default = "unset")]
    pub last_submission_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_page: Option<u32>,
    #[serde(default = "unset")]
    pub last_page_submission_time: i64,
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self {
            last_submission_time: DEFAULT_LAST_SUBMISSION_TIME,
            last_page: None,
            last_page_submission_time: DEFAULT_LAST_SUBMISSION_TIME,
        }
    }
}

impl SyncCursor {
    /// An interrupted pass is waiting to be continued.
    pub fn in_progress(&self) -> bool {
        self.last_page.is_some()
    }

    /// A completed pass left a watermark behind.
    pub fn has_watermark(&self) -> bool {
        self.last_submission_time > 0
    }

    /// Last page already merged (page 1 is always re-read to learn the page count).
    pub fn resume_after(&self) -> u32 {
        self.last_page.unwrap_or(DEFAULT_LAST_PAGE)
    }

    pub fn interrupted(self, last_page: u32, running_max: i64) -> Self {
        Self { last_page: Some(last_page), last_page_submission_time: running_max, ..self }
    }

    pub fn completed(watermark: i64) -> Self {
        Self { last_submission_time: watermark, ..Self::default() }
    }
}
