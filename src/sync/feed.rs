// src/sync/feed.rs
use crate::error::ParseError;

/// One line of a submissions listing, already normalized by the platform adapter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmissionRow {
    /// Unix seconds.
    pub time: i64,
    pub member: String,
    /// Display name when it differs from the member key.
    pub name: Option<String>,
    /// Problem short name (`A`, `B`, …) as used in the standings.
    pub task: String,
    pub score: f64,
    pub verdict: Option<String>,
    pub url: Option<String>,
    pub language: Option<String>,
    pub external_solution: bool,
}

/// One parsed listing page.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubmissionPage {
    pub rows: Vec<SubmissionRow>,
    /// Page count announced by the pagination bar (at least 1).
    pub total_pages: u32,
}

impl SubmissionPage {
    /// Newest submission on the page, 0 for an empty page.
    pub fn max_time(&self) -> i64 {
        self.rows.iter().map(|r| r.time).max().unwrap_or(0)
    }
}

/// A reverse-chronological, paginated submissions listing.
pub trait SubmissionFeed: Send + Sync {
    /// Listing URL of `page` (1-based), optionally restricted to one member.
    fn page_url(&self, member: Option<&str>, page: u32) -> String;

    fn parse_page(&self, html: &str, url: &str) -> Result<SubmissionPage, ParseError>;
}
