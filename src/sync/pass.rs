// src/sync/pass.rs
//! Resumable crawl of a submissions listing.
//!
//! A pass reads page 1 (which also announces the page count), then pages
//! `resume_after()+1 ..= N` through the worker pool. Outcomes are merged on the
//! calling thread in page order, so the cursor always names the last contiguous page
//! that made it into the result. A pass ends when a page is entirely older than the
//! watermark of the last completed pass, when the page budget runs out, or when a page
//! cannot be fetched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use super::feed::{SubmissionFeed, SubmissionPage, SubmissionRow};
use crate::config::SyncOptions;
use crate::config::consts::{DEFAULT_LAST_SUBMISSION_TIME, SCORE_EPS};
use crate::core::net::{PageFetcher, fetch_page};
use crate::engine::merge::{Candidate, FailureTally, SubmissionRef, attach_submission, merge_if_better};
use crate::engine::pool::{CancelToken, WorkerPool};
use crate::error::AdapterError;
use crate::model::{Contest, Standing, SyncCursor};
use crate::progress::{NullProgress, Progress};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassOutcome {
    pub cursor: SyncCursor,
    pub stopped_early: bool,
    /// Pages merged after page 1.
    pub pages_merged: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncReport {
    pub cursor: SyncCursor,
    /// The crawl did not finish; the caller should schedule a re-run.
    pub stopped_early: bool,
}

/// How the next crawl is run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncPlan {
    /// Walk the global listing from this cursor.
    Global(SyncCursor),
    /// Walk these members' own listings; the global cursor is left alone.
    Members(Vec<String>),
}

/// Pick between continuing the global crawl and backfilling the members whose
/// results lack submission links. Backfilling more members than there are listing
/// pages costs more than one full re-crawl, which drops the watermark instead.
pub fn plan(cursor: SyncCursor, lacking: Vec<String>, total_pages: u32) -> SyncPlan {
    if lacking.is_empty() || cursor.in_progress() {
        SyncPlan::Global(cursor)
    } else if lacking.len() > total_pages as usize {
        SyncPlan::Global(SyncCursor::default())
    } else {
        SyncPlan::Members(lacking)
    }
}

/// Members with a recorded result that has no submission link.
pub fn members_lacking_urls(result: &BTreeMap<String, Standing>) -> Vec<String> {
    result
        .values()
        .filter(|row| row.problems.values().any(|p| p.lacks_url()))
        .map(|row| row.member.clone())
        .collect()
}

/// Per-pass merge state.
#[derive(Default)]
struct Pass {
    tallies: HashMap<(String, String), FailureTally>,
    merged_rows: usize,
}

pub struct SubmissionSync<'a> {
    fetcher: &'a dyn PageFetcher,
    feed: &'a dyn SubmissionFeed,
    contest: &'a Contest,
    opts: &'a SyncOptions,
    pool: WorkerPool,
}

impl<'a> SubmissionSync<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        feed: &'a dyn SubmissionFeed,
        contest: &'a Contest,
        opts: &'a SyncOptions,
    ) -> Self {
        Self { fetcher, feed, contest, opts, pool: WorkerPool::from_options(opts) }
    }

    /// Fetch and parse one listing page under the retry policy.
    pub fn fetch(&self, member: Option<&str>, page: u32) -> Result<SubmissionPage, AdapterError> {
        let url = self.feed.page_url(member, page);
        let html = fetch_page(self.fetcher, &url, &self.opts.retry, self.opts.credentials.as_ref())?;
        Ok(self.feed.parse_page(&html, &url)?)
    }

    /// Page 1 of the global listing.
    pub fn first_page(&self) -> Result<SubmissionPage, AdapterError> {
        self.fetch(None, 1)
    }

    /// Crawl the global listing (or, for backfill, the listing of one member)
    /// starting from `cursor`, merging into `result`.
    pub fn run_pass(
        &self,
        first: &SubmissionPage,
        cursor: SyncCursor,
        member: Option<&str>,
        result: &mut BTreeMap<String, Standing>,
        progress: &mut dyn Progress,
    ) -> PassOutcome {
        let resume = cursor.in_progress();
        let watermark = cursor.last_submission_time;
        let start_after = cursor.resume_after();
        let mut running_max = if resume { cursor.last_page_submission_time } else { DEFAULT_LAST_SUBMISSION_TIME };

        let mut pass = Pass::default();

        // page 1 rows older than the interrupted pass's maximum were merged by it
        let skip_before = if resume { cursor.last_page_submission_time } else { i64::MIN };
        for row in first.rows.iter().filter(|r| r.time >= skip_before) {
            self.merge_row(&mut pass, result, row);
        }
        running_max = running_max.max(first.max_time());

        let budget = self.opts.page_budget.map_or(usize::MAX, |b| b as usize);
        let pages: Vec<u32> = (start_after + 1..=first.total_pages).take(budget).collect();

        info!(
            contest = %self.contest.key,
            member = member.unwrap_or("*"),
            resume,
            from = start_after + 1,
            to = pages.last().copied().unwrap_or(start_after),
            total = first.total_pages,
            "crawling submissions"
        );

        let mut merged_through = start_after;
        let mut failed = false;
        let mut reached_watermark = false;

        let token = CancelToken::new();
        self.pool.run_ordered(
            &pages,
            &token,
            progress,
            |&page| self.fetch(member, page),
            |&page, outcome| match outcome {
                Ok(sub) => {
                    for row in &sub.rows {
                        self.merge_row(&mut pass, result, row);
                    }
                    let page_max = sub.max_time();
                    running_max = running_max.max(page_max);
                    merged_through = page;
                    if page_max < watermark {
                        reached_watermark = true;
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
                Err(e) => {
                    warn!(contest = %self.contest.key, page, error = %e, "submissions page failed, stopping pass");
                    failed = true;
                    ControlFlow::Break(())
                }
            },
        );

        let pages_merged = merged_through - start_after;
        let complete = reached_watermark || (!failed && merged_through >= first.total_pages);
        debug!(rows = pass.merged_rows, pages_merged, complete, "pass finished");

        if complete {
            PassOutcome { cursor: SyncCursor::completed(running_max), stopped_early: false, pages_merged }
        } else {
            info!(
                contest = %self.contest.key,
                last_page = merged_through,
                total = first.total_pages,
                "stopped early, will resume"
            );
            PassOutcome { cursor: cursor.interrupted(merged_through, running_max), stopped_early: true, pages_merged }
        }
    }

    /// Walk each member's own listing from the start. Returns whether it stopped early.
    pub fn backfill(
        &self,
        members: &[String],
        result: &mut BTreeMap<String, Standing>,
        progress: &mut dyn Progress,
    ) -> bool {
        info!(contest = %self.contest.key, members = members.len(), "backfilling member submissions");
        let mut stopped = false;
        let token = CancelToken::new();
        self.pool.run_ordered(
            members,
            &token,
            progress,
            |member| self.fetch(Some(member), 1),
            |member, outcome| match outcome {
                Ok(first) => {
                    let out = self.run_pass(&first, SyncCursor::default(), Some(member), result, &mut NullProgress);
                    if out.stopped_early {
                        stopped = true;
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                }
                Err(e) => {
                    warn!(contest = %self.contest.key, member = %member, error = %e, "member listing failed");
                    stopped = true;
                    ControlFlow::Break(())
                }
            },
        );
        stopped
    }

    /// Run whichever crawl the request calls for.
    ///
    /// - `users` given: backfill exactly those members (an empty set syncs nothing).
    /// - otherwise: continue the global crawl, or backfill members lacking links
    ///   once a watermark exists (see `plan`).
    pub fn synchronize(
        &self,
        users: Option<&BTreeSet<String>>,
        cursor: SyncCursor,
        result: &mut BTreeMap<String, Standing>,
        progress: &mut dyn Progress,
    ) -> SyncReport {
        if let Some(users) = users {
            if users.is_empty() {
                return SyncReport { cursor, stopped_early: false };
            }
            let members: Vec<String> = users.iter().cloned().collect();
            let stopped_early = self.backfill(&members, result, progress);
            return SyncReport { cursor, stopped_early };
        }

        let first = match self.first_page() {
            Ok(first) => first,
            Err(e) => {
                warn!(contest = %self.contest.key, error = %e, "submissions listing unavailable");
                return SyncReport { cursor, stopped_early: true };
            }
        };

        let lacking = if cursor.has_watermark() { members_lacking_urls(result) } else { Vec::new() };
        if !lacking.is_empty() {
            info!(contest = %self.contest.key, members = lacking.len(), "results without submission links");
        }
        match plan(cursor, lacking, first.total_pages) {
            SyncPlan::Global(from) => {
                let out = self.run_pass(&first, from, None, result, progress);
                SyncReport { cursor: out.cursor, stopped_early: out.stopped_early }
            }
            SyncPlan::Members(members) => {
                let stopped_early = self.backfill(&members, result, progress);
                SyncReport { cursor, stopped_early }
            }
        }
    }

    /// Fold one submission into the member's row. Upsolving submissions go through
    /// the monotonic merge; in-contest ones only attach provenance.
    fn merge_row(&self, pass: &mut Pass, result: &mut BTreeMap<String, Standing>, row: &SubmissionRow) -> bool {
        let standing = result.entry(row.member.clone()).or_insert_with(|| Standing::new(&row.member));
        if let Some(name) = row.name.as_ref().filter(|n| **n != row.member) {
            standing.name = Some(name.clone());
        }
        let source = SubmissionRef {
            url: row.url.clone(),
            verdict: row.verdict.clone(),
            language: row.language.clone(),
            external_solution: row.external_solution,
        };
        let problem = standing.problem_mut(&row.task);

        let changed = if self.contest.is_upsolving(row.time) {
            let slot = problem.upsolving_mut();
            if row.score > SCORE_EPS {
                let cand = Candidate { source, ..Candidate::solved(row.score, Some(row.time)) };
                merge_if_better(slot, &cand)
            } else {
                let tally = pass
                    .tallies
                    .entry((row.member.clone(), row.task.clone()))
                    .or_insert_with(|| FailureTally::new(slot));
                match tally.record(row.time, &source) {
                    Some(cand) => merge_if_better(slot, &cand),
                    None => false,
                }
            }
        } else {
            attach_submission(problem, row.score, row.time, &source)
        };
        if changed {
            pass.merged_rows += 1;
        }
        changed
    }
}
