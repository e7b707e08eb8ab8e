// src/adapters/leaderboard.rs
//! Generic paginated leaderboard (`<contest>/leaderboard?page=N`).
//!
//! Columns: `Score` holds `solving` and an optional `(penalty)`, `User`/`Participant`
//! the member, single-letter headers are problems; anything else is copied into
//! `extra` under its header.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use super::cells::parse_problem_cell;
use super::{StandingsAdapter, StandingsRequest};
use crate::config::SyncOptions;
use crate::core::html::{HtmlTableParser, Row, TableParser, max_page_number, require_table};
use crate::core::net::{PageFetcher, fetch_page};
use crate::core::sanitize::{first_word, is_integer, parse_clock, parse_number};
use crate::engine::{CancelToken, WorkerPool, assign_places};
use crate::error::{AdapterError, ParseError};
use crate::model::{Contest, Penalty, ProblemInfo, Standing, StandingsDocument, StandingsReply};
use crate::progress::LogProgress;

pub struct Leaderboard {
    contest: Contest,
    fetcher: Arc<dyn PageFetcher>,
    opts: SyncOptions,
    parser: HtmlTableParser,
}

impl Leaderboard {
    pub fn new(contest: Contest, fetcher: Arc<dyn PageFetcher>, opts: SyncOptions) -> Self {
        Self { contest, fetcher, opts, parser: HtmlTableParser::new() }
    }

    pub fn standings_url(&self) -> String {
        match &self.contest.standings_url {
            Some(url) => url.clone(),
            None => join!(self.contest.url.trim_end_matches('/'), "/leaderboard"),
        }
    }

    /// Page 0 is the bare URL, later pages carry `?page=N`.
    fn page_url(&self, index: u32) -> String {
        let base = self.standings_url();
        if index == 0 { base } else { format!("{base}?page={index}") }
    }

    fn fetch(&self, url: &str) -> Result<String, AdapterError> {
        Ok(fetch_page(&*self.fetcher, url, &self.opts.retry, self.opts.credentials.as_ref())?)
    }

    /// Rows of the standings table in a fetched page.
    pub fn parse_doc(&self, html: &str) -> Result<Vec<Row>, ParseError> {
        let table = require_table(html, "table")?;
        self.parser.parse(&table)
    }
}

/// Number of pages announced by the pagination links of page one.
pub fn page_count(html: &str) -> u32 {
    max_page_number(html, regex!(r#"<a[^>]*href="[^"]*page=[0-9]+"[^>]*>([0-9]+)</a>"#))
        .unwrap_or(1)
        .max(1)
}

/// Accumulates rows across pages, keeping first-seen problem order.
#[derive(Default)]
pub struct LeaderboardRows {
    pub result: BTreeMap<String, Standing>,
    pub problems: Vec<ProblemInfo>,
}

impl LeaderboardRows {
    pub fn absorb(&mut self, rows: &[Row]) {
        for row in rows {
            if let Some(standing) = self.standing_from_row(row) {
                self.result.insert(standing.member.clone(), standing);
            }
        }
    }

    fn problem_info(&mut self, short: &str) -> &mut ProblemInfo {
        let idx = match self.problems.iter().position(|p| p.short == short) {
            Some(i) => i,
            None => {
                self.problems.push(ProblemInfo::new(short));
                self.problems.len() - 1
            }
        };
        &mut self.problems[idx]
    }

    fn standing_from_row(&mut self, row: &Row) -> Option<Standing> {
        let mut st = Standing::default();
        let mut member = None;

        for (label, cell) in row.iter() {
            let key = first_word(label);
            let lower = key.to_lowercase();
            if lower == "score" {
                let mut parts = cell.value.split_whitespace();
                if let Some(solving) = parts.next().and_then(parse_number) {
                    st.solving = solving;
                }
                if let Some(p) = parts.next() {
                    let p = p.trim_matches(|c| c == '(' || c == ')');
                    if is_integer(p) {
                        st.penalty = p.parse().ok().map(Penalty::Points);
                    }
                }
            } else if lower == "penalty" {
                st.penalty = if is_integer(&cell.value) {
                    cell.value.parse().ok().map(Penalty::Points)
                } else {
                    parse_clock(&cell.value).map(|seconds| Penalty::Elapsed { seconds })
                };
            } else if lower == "user" || lower == "participant" {
                member = Some(cell.value.clone());
            } else if key.chars().count() == 1 && key.chars().all(char::is_alphanumeric) {
                let info = self.problem_info(key);
                if let Some(title) = cell.attrs.get("title") {
                    info.name = Some(title.clone());
                }
                if let Some(p) = parse_problem_cell(&cell.value) {
                    st.problems.insert(s!(key), p);
                }
            } else if !label.is_empty() {
                st.extra.insert(s!(label), Value::String(cell.value.clone()));
            }
        }

        st.member = member.filter(|m| !m.is_empty())?;
        if st.penalty.is_none() {
            let accepted = st
                .problems
                .values()
                .filter(|p| p.result.is_some_and(|r| r.is_solved(None)))
                .count() as u32;
            st.solved = Some(accepted);
            st.penalty = Some(Penalty::Points(i64::from(accepted)));
        }
        Some(st)
    }
}

impl StandingsAdapter for Leaderboard {
    fn get_standings(&self, request: &StandingsRequest) -> Result<StandingsReply, AdapterError> {
        let url = self.standings_url();
        let first = self.fetch(&url)?;
        let n_pages = page_count(&first);
        info!(contest = %self.contest.key, pages = n_pages, "fetching leaderboard");

        let pages: Vec<u32> = (0..n_pages).collect();
        let mut rows = LeaderboardRows::default();
        let mut failure = None;
        let mut progress = LogProgress::new("leaderboard pages");

        WorkerPool::from_options(&self.opts).run_ordered(
            &pages,
            &CancelToken::new(),
            &mut progress,
            |&i| {
                let body = if i == 0 { first.clone() } else { self.fetch(&self.page_url(i))? };
                Ok::<_, AdapterError>(self.parse_doc(&body)?)
            },
            |_, outcome| match outcome {
                Ok(parsed) => {
                    rows.absorb(&parsed);
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    failure = Some(e);
                    ControlFlow::Break(())
                }
            },
        );
        if let Some(e) = failure {
            return Err(e);
        }

        let LeaderboardRows { mut result, problems } = rows;
        // places come from the whole board, before any member filter
        assign_places(&mut result);
        if let Some(users) = &request.users {
            result.retain(|member, _| users.contains(member));
        }

        let mut doc = StandingsDocument::new(&url);
        doc.result = result;
        doc.problems = problems;
        Ok(StandingsReply::document(doc))
    }
}
