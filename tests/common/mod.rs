// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use standings_sync::config::{RetryPolicy, SyncOptions};
use standings_sync::core::PageFetcher;
use standings_sync::error::FetchError;

enum Reply {
    Body(String),
    Fail,
}

/// URL → page map. Unknown URLs are 404s; `fail` makes a URL a network error.
#[derive(Default)]
pub struct FakeFetcher {
    pages: Mutex<HashMap<String, Reply>>,
    log: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<String>) {
        self.pages.lock().unwrap().insert(url.to_string(), Reply::Body(body.into()));
    }

    pub fn fail(&self, url: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), Reply::Fail);
    }

    pub fn forget(&self, url: &str) {
        self.pages.lock().unwrap().remove(url);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl PageFetcher for FakeFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.log.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some(Reply::Body(b)) => Ok(b.clone()),
            Some(Reply::Fail) => Err(FetchError::network(url, "connection reset")),
            None => Err(FetchError::Status { url: url.to_string(), status: 404 }),
        }
    }

    fn submit_form(&self, url: &str, _fields: &[(String, String)]) -> Result<String, FetchError> {
        Err(FetchError::network(url, "no forms here"))
    }
}

/// One attempt per page and no pauses.
pub fn quick_options() -> SyncOptions {
    SyncOptions { retry: RetryPolicy::immediate(1), ..SyncOptions::default() }
}

pub fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}
