// src/config/consts.rs
use std::time::Duration;

// Net
pub const USER_AGENT: &str = concat!("standings_sync/", env!("CARGO_PKG_VERSION"));
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const FETCH_ATTEMPTS: u32 = 4;
pub const BACKOFF_STEP: Duration = Duration::from_secs(1); // linear: attempt * step

// Concurrency
pub const WORKERS: usize = 8;
pub const REQUEST_PAUSE_MS: u64 = 0;
pub const JITTER_MS: u64 = 0; // extra 0..JITTER_MS per request

// Profile fetches are throttled on their own, independent of WORKERS
pub const PROFILE_QUOTA: usize = 100;
pub const PROFILE_WINDOW: Duration = Duration::from_secs(10);

// Submission sync
pub const DEFAULT_LAST_SUBMISSION_TIME: i64 = -1;
pub const DEFAULT_LAST_PAGE: u32 = 1;
pub const CONTINUATION_DELAY: Duration = Duration::from_secs(15 * 60);

// Rated contests whose new ratings are not published yet get re-polled
pub const RATING_PENDING_DELAY: Duration = Duration::from_secs(30 * 60);
pub const RATING_PENDING_WINDOW_HOURS: i64 = 3;

// Scores within this distance of zero count as zero
pub const SCORE_EPS: f64 = 1e-9;
