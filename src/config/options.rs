// src/config/options.rs
use std::fmt;
use std::time::Duration;

use super::consts::*;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Backoff after attempt `n` (0-based) is `n * step`.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: FETCH_ATTEMPTS, step: BACKOFF_STEP }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts; handy for tests and local fixtures.
    pub fn immediate(attempts: u32) -> Self {
        Self { attempts, step: Duration::ZERO }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        self.step * attempt
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Width of the page-fetch pool.
    pub workers: usize,
    pub retry: RetryPolicy,
    /// Max submission pages merged per invocation (page 1 excluded). `None` = unbounded.
    pub page_budget: Option<u32>,
    pub request_pause: Duration,
    pub jitter_ms: u64,
    /// Re-run hint attached to a document whose crawl stopped early.
    pub continuation_delay: Duration,
    pub profile_quota: usize,
    pub profile_window: Duration,
    pub credentials: Option<Credentials>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            workers: WORKERS,
            retry: RetryPolicy::default(),
            page_budget: None,
            request_pause: Duration::from_millis(REQUEST_PAUSE_MS),
            jitter_ms: JITTER_MS,
            continuation_delay: CONTINUATION_DELAY,
            profile_quota: PROFILE_QUOTA,
            profile_window: PROFILE_WINDOW,
            credentials: None,
        }
    }
}

impl SyncOptions {
    pub fn with_page_budget(mut self, pages: u32) -> Self {
        self.page_budget = Some(pages);
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials { username: s!(username), password: s!(password) });
        self
    }
}
