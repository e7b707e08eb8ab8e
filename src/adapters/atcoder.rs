// src/adapters/atcoder.rs
//! AtCoder: JSON standings, rating changes from the results page, virtual
//! participation folded into `upsolving`, and an incremental crawl of the
//! submissions listing for links and post-contest results.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Url;
use scraper::Html;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{StandingsAdapter, StandingsRequest};
use crate::config::SyncOptions;
use crate::config::consts::{RATING_PENDING_DELAY, RATING_PENDING_WINDOW_HOURS};
use crate::core::html::{HtmlTableParser, Row, TableParser, find_fragment, max_page_number};
use crate::core::net::{PageFetcher, fetch_page};
use crate::core::ratelimit::RequestQuota;
use crate::core::sanitize::{first_word, last_segment};
use crate::engine::{
    CancelToken, Candidate, WorkerPool, mark_no_update, merge_if_better, reconcile_with_previous, seed_partial_refresh,
};
use crate::error::{AdapterError, FetchError, ParseError};
use crate::model::{
    Contest, ProblemInfo, ProblemResult, RowAction, SourceCode, Standing, StandingsDocument, StandingsReply,
    SyncCursor, UserInfo, Verdict,
};
use crate::progress::{LogProgress, NullProgress};
use crate::sync::{SubmissionFeed, SubmissionPage, SubmissionRow, SubmissionSync};

const HIDDEN_FIELDS: [&str; 5] = ["Affiliation", "AtcoderRank", "Competitions", "IsRated", "IsTeam"];
const NANOS: i64 = 1_000_000_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StandingsJson {
    #[serde(default)]
    pub task_info: Vec<TaskInfoJson>,
    #[serde(default)]
    pub standings_data: Vec<Map<String, Value>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskInfoJson {
    pub task_screen_name: String,
    pub assignment: String,
    pub task_name: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskResultJson {
    score: Option<f64>,
    #[serde(default)]
    elapsed: i64,
    #[serde(default)]
    penalty: i64,
    #[serde(default)]
    failure: i64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TotalResultJson {
    #[serde(default)]
    score: f64,
    #[serde(default)]
    elapsed: i64,
}

fn take<T: DeserializeOwned>(row: &mut Map<String, Value>, key: &str) -> Option<T> {
    row.remove(key).and_then(|v| serde_json::from_value(v).ok())
}

/// Rating fields of rated participants from `var results = [...]`.
pub fn parse_results(page: &str, users: Option<&BTreeSet<String>>) -> Result<BTreeMap<String, Map<String, Value>>, ParseError> {
    let mut out = BTreeMap::new();
    let Some(json) = regex!(r"(?m)var\s*results\s*=\s*(\[[^\n]*\]);$").captures(page).and_then(|c| c.get(1)) else {
        debug!("no results block on the results page");
        return Ok(out);
    };
    let rows: Vec<Map<String, Value>> = serde_json::from_str(json.as_str())?;
    for mut row in rows {
        if !row.get("IsRated").and_then(Value::as_bool).unwrap_or(false) || !row.contains_key("NewRating") {
            continue;
        }
        let Some(handle) = take::<String>(&mut row, "UserScreenName") else { continue };
        if users.is_some_and(|u| !u.contains(&handle)) {
            continue;
        }
        let picked = ["OldRating", "NewRating", "Performance"]
            .into_iter()
            .filter_map(|k| row.get(k).map(|v| (s!(k), v.clone())))
            .collect();
        out.insert(handle, picked);
    }
    Ok(out)
}

/// Handles listed after `Writer:` on the contest page.
pub fn parse_writers(page: &str) -> Vec<String> {
    let Some(line) = regex!(r"(?m)<li>Writer:.*$").find(page) else { return Vec::new() };
    regex!(r">([^<]+)</")
        .captures_iter(line.as_str())
        .filter_map(|c| c.get(1))
        .flat_map(|m| regex!(r"[,\s]+").split(m.as_str()).map(str::trim).collect::<Vec<_>>())
        .filter(|w| !w.is_empty() && *w != "?")
        .map(str::to_string)
        .collect()
}

/// Full score from a task statement (`Score : <var>100</var> points`).
pub fn parse_full_score(page: &str) -> Option<f64> {
    regex!(r#"(?i)<span[^>]*class="lang-[a-z]+"[^>]*>\s*<p>\s*(?:配点|Score)\s*(?:：|:)\s*<var>\s*(?P<score>[0-9]+)\s*</var>\s*(?:点|points)\s*</p>"#)
        .captures(page)?
        .name("score")?
        .as_str()
        .parse()
        .ok()
}

/// Key/value rows of a profile page plus the avatar.
pub fn parse_profile(page: &str) -> BTreeMap<String, Value> {
    let mut info = BTreeMap::new();
    let kv = regex!(
        r#"<tr>[^<]*<th[^>]*class="no-break"[^>]*>(?P<key>[^<]*)</th>[^<]*<td[^>]*>(?:\s*<[^>]*>)*(?P<value>[^<]+)"#
    );
    for c in kv.captures_iter(page) {
        let (Some(k), Some(v)) = (c.name("key"), c.name("value")) else { continue };
        let (key, value) = (k.as_str().trim(), v.as_str().trim());
        if !value.is_empty() {
            info.insert(s!(key), Value::String(s!(value)));
        }
    }
    let avatar = regex!(r#"<img[^>]*class=["']avatar["'][^>]*src=["'](?P<url>[^"']*/icons/[^"']*)["'][^>]*>"#);
    if let Some(url) = avatar.captures(page).and_then(|c| c.name("url")) {
        info.insert(s!("avatar"), Value::String(s!(url.as_str())));
    }
    let rating = info.get("Rating").and_then(Value::as_str).and_then(|r| r.parse::<i64>().ok());
    if let Some(rating) = rating {
        info.insert(s!("rating"), Value::from(rating));
    }
    info
}

/// Ratings are published a while after a rated contest ends; poll again until then.
pub fn rating_pending(has_rated: bool, has_new_rating: bool, end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    has_rated && !has_new_rating && end + ChronoDuration::hours(RATING_PENDING_WINDOW_HOURS) > now
}

/// Builds the result map from the JSON payloads.
pub struct StandingsBuilder<'a> {
    pub result: BTreeMap<String, Standing>,
    users: Option<&'a BTreeSet<String>>,
    previous: Option<&'a BTreeMap<String, Standing>>,
    letters: BTreeMap<String, String>,
    submissions_url: String,
    pub has_rated: bool,
    pub has_new_rating: bool,
}

impl<'a> StandingsBuilder<'a> {
    pub fn new(
        tasks: &[ProblemInfo],
        submissions_url: &str,
        users: Option<&'a BTreeSet<String>>,
        previous: Option<&'a BTreeMap<String, Standing>>,
    ) -> Self {
        Self {
            result: BTreeMap::new(),
            users,
            previous,
            letters: tasks.iter().map(|t| (t.code.clone(), t.short.clone())).collect(),
            submissions_url: s!(submissions_url),
            has_rated: false,
            has_new_rating: false,
        }
    }

    fn wanted(&self, handle: &str) -> bool {
        self.users.is_none_or(|u| u.contains(handle))
    }

    /// Common head of an official or virtual row: member, deletion, country, name, link,
    /// and problems carried over from the stored row. `None` when the row is skipped.
    fn enter(&mut self, row: &mut Map<String, Value>) -> Option<String> {
        let handle: String = take(row, "UserScreenName")?;
        if !self.wanted(&handle) {
            return None;
        }
        let previous = self.previous.and_then(|p| p.get(&handle));
        let submissions_url = &self.submissions_url;
        let st = self.result.entry(handle.clone()).or_insert_with(|| Standing::new(&handle));
        if take::<bool>(row, "UserIsDeleted").unwrap_or(false) {
            st.action = Some(RowAction::Delete);
            return None;
        }
        if let Some(country) = row.remove("Country").filter(|c| !c.is_null()) {
            st.set_extra_if_absent("country", country);
        }
        if let Some(name) = take::<String>(row, "UserName") {
            st.name = Some(name);
        }
        st.url = Some(format!("{submissions_url}?f.User={handle}"));
        if st.problems.is_empty() {
            if let Some(prev) = previous {
                st.problems = prev.problems.clone();
            }
        }
        Some(handle)
    }

    /// Official standings rows.
    pub fn official(&mut self, rows: Vec<Map<String, Value>>, mut ratings: BTreeMap<String, Map<String, Value>>) {
        for mut row in rows {
            let tasks: BTreeMap<String, TaskResultJson> = take(&mut row, "TaskResults").unwrap_or_default();
            let is_rated = row.get("IsRated").and_then(Value::as_bool).unwrap_or(false);
            if tasks.is_empty() && !is_rated {
                continue;
            }
            let Some(handle) = self.enter(&mut row) else { continue };
            let letters = &self.letters;
            let Some(st) = self.result.get_mut(&handle) else { continue };

            st.place = row.remove("Rank").map(|r| match r {
                Value::String(s) => s,
                other => other.to_string(),
            });
            let total: TotalResultJson = take(&mut row, "TotalResult").unwrap_or_default();
            st.penalty = Some(crate::model::Penalty::Elapsed { seconds: total.elapsed / NANOS });
            st.solving = total.score / 100.0;

            let mut solved = 0;
            for (code, task) in &tasks {
                let (Some(score), Some(letter)) = (task.score, letters.get(code)) else { continue };
                let p = st.problem_mut(letter);
                if score > 0.0 {
                    solved += 1;
                    p.result = Some(Verdict::Score(score / 100.0));
                    p.set_elapsed(task.elapsed / NANOS);
                    if task.penalty > 0 {
                        p.penalty = u32::try_from(task.penalty).ok();
                    }
                } else {
                    p.result = Some(Verdict::Score(-(task.failure as f64)));
                }
            }
            st.solved = Some(solved);

            row.remove("Additional");
            if let Some(rank) = row.remove("AtCoderRank") {
                row.insert(s!("AtcoderRank"), rank);
            }
            if let Some(rating) = row.remove("Rating").filter(|r| !r.is_null()) {
                st.info.insert(s!("rating"), rating);
            }
            let old_rating = row.remove("OldRating").filter(|r| !r.is_null());
            st.extra.extend(row);
            if let Some(r) = ratings.remove(&handle) {
                st.extra.extend(r);
            }
            if let Some(old) = old_rating {
                let nonzero = old.as_f64().is_some_and(|x| x != 0.0);
                if nonzero || st.extra.contains_key("NewRating") {
                    st.extra.insert(s!("OldRating"), old);
                }
            }

            if st.extra.get("IsRated").and_then(Value::as_bool).unwrap_or(false) {
                self.has_rated = true;
                if st.extra.get("NewRating").is_some_and(|v| !v.is_null()) {
                    self.has_new_rating = true;
                }
            }
        }
    }

    /// Virtual participation: merged into `upsolving` with the monotonic rule.
    pub fn virtual_rows(&mut self, rows: Vec<Map<String, Value>>) {
        for mut row in rows {
            let tasks: BTreeMap<String, TaskResultJson> = take(&mut row, "TaskResults").unwrap_or_default();
            if tasks.is_empty() {
                continue;
            }
            let Some(handle) = self.enter(&mut row) else { continue };
            let letters = &self.letters;
            let Some(st) = self.result.get_mut(&handle) else { continue };
            for (code, task) in &tasks {
                let (Some(score), Some(letter)) = (task.score, letters.get(code)) else { continue };
                let score = score / 100.0;
                let cand = if score > 0.0 {
                    Candidate {
                        elapsed: Some(task.elapsed / NANOS),
                        penalty: u32::try_from(task.penalty).ok(),
                        ..Candidate::solved(score, None)
                    }
                } else {
                    Candidate::failures(u32::try_from(task.failure).unwrap_or(0), None)
                };
                merge_if_better(st.problem_mut(letter).upsolving_mut(), &cand);
            }
        }
    }
}

/// One submissions-table row.
fn submission_from_row(row: &Row, page_url: &str) -> Result<SubmissionRow, ParseError> {
    let mut sub = SubmissionRow::default();
    let mut time = None;
    let mut score = None;
    for (label, cell) in row.iter() {
        if cell.value == "Detail" {
            if let Some(href) = cell.first_link() {
                sub.url = Url::parse(page_url).and_then(|b| b.join(href)).map(|u| u.to_string()).ok();
                sub.external_solution = true;
            }
            continue;
        }
        match label.to_lowercase().replace(' ', "_").as_str() {
            "user" => {
                sub.name = Some(cell.value.clone());
                sub.member = s!(last_segment(cell.first_link().unwrap_or(&cell.value)));
            }
            "submission_time" => time = Some(cell.value.clone()),
            "task" => sub.task = s!(first_word(&cell.value)),
            "score" => score = Some(cell.value.clone()),
            "status" => sub.verdict = Some(cell.value.clone()),
            "language" => sub.language = Some(cell.value.clone()),
            _ => {}
        }
    }
    let time = time.ok_or_else(|| ParseError::Missing(s!("submission time")))?;
    sub.time = DateTime::parse_from_str(&time, "%Y-%m-%d %H:%M:%S%z")
        .map_err(|_| ParseError::BadValue { field: s!("submission_time"), value: time.clone() })?
        .timestamp();
    let score = score.ok_or_else(|| ParseError::Missing(s!("score")))?;
    sub.score = score.parse().map_err(|_| ParseError::BadValue { field: s!("score"), value: score.clone() })?;
    if sub.member.is_empty() || sub.task.is_empty() {
        return Err(ParseError::Missing(s!("user or task")));
    }
    Ok(sub)
}

pub struct AtCoder {
    contest: Contest,
    fetcher: Arc<dyn PageFetcher>,
    opts: SyncOptions,
    parser: HtmlTableParser,
    clock: fn() -> DateTime<Utc>,
}

impl AtCoder {
    pub fn new(contest: Contest, fetcher: Arc<dyn PageFetcher>, opts: SyncOptions) -> Self {
        Self { contest, fetcher, opts, parser: HtmlTableParser::new(), clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn standings_url(&self) -> String {
        join!(&self.contest.url, "/standings")
    }

    pub fn submissions_url(&self) -> String {
        join!(&self.contest.url, "/submissions")
    }

    fn get(&self, url: &str) -> Result<String, FetchError> {
        fetch_page(&*self.fetcher, url, &self.opts.retry, self.opts.credentials.as_ref())
    }

    fn task_infos(&self, tasks: &[TaskInfoJson]) -> Vec<ProblemInfo> {
        tasks
            .iter()
            .map(|t| ProblemInfo {
                code: t.task_screen_name.clone(),
                short: t.assignment.clone(),
                name: Some(t.task_name.clone()),
                full_score: None,
                url: Some(format!("{}/tasks/{}", self.contest.url, t.task_screen_name)),
            })
            .collect()
    }

    /// Fill `full_score` from each task statement; failures leave it unset.
    fn load_full_scores(&self, problems: &mut [ProblemInfo]) {
        let urls: Vec<String> = problems.iter().filter_map(|p| p.url.clone()).collect();
        let mut scores = Vec::with_capacity(urls.len());
        WorkerPool::from_options(&self.opts).run_ordered(
            &urls,
            &CancelToken::new(),
            &mut NullProgress,
            |url| self.get(url).map(|page| parse_full_score(&page)),
            |url, outcome| {
                match outcome {
                    Ok(score) => scores.push((url.clone(), score)),
                    Err(e) => warn!(%url, error = %e, "task page failed"),
                }
                ControlFlow::Continue(())
            },
        );
        for (url, score) in scores {
            if let Some(p) = problems.iter_mut().find(|p| p.url.as_deref() == Some(url.as_str())) {
                p.full_score = score;
            }
        }
    }

    /// Member-filtered refresh over stored rows: no standings fetch, only the listed
    /// members' submissions.
    fn partial_refresh(
        &self,
        users: &BTreeSet<String>,
        previous: &BTreeMap<String, Standing>,
        cursor: SyncCursor,
    ) -> StandingsDocument {
        let mut doc = StandingsDocument::new(&self.standings_url());
        doc.result = seed_partial_refresh(users, previous);
        self.sync_submissions(&mut doc, Some(users), cursor);
        doc
    }

    fn sync_submissions(&self, doc: &mut StandingsDocument, users: Option<&BTreeSet<String>>, cursor: SyncCursor) {
        let sync = SubmissionSync::new(&*self.fetcher, self, &self.contest, &self.opts);
        let mut progress = LogProgress::new("submissions");
        let report = sync.synchronize(users, cursor, &mut doc.result, &mut progress);
        if report.stopped_early {
            info!(contest = %self.contest.key, delay = ?self.opts.continuation_delay, "repeat statistics update later");
            doc.request_rerun(self.opts.continuation_delay);
        }
        doc.sync_state = Some(report.cursor);
        doc.info_fields = vec![s!("sync_state")];
    }
}

impl SubmissionFeed for AtCoder {
    fn page_url(&self, member: Option<&str>, page: u32) -> String {
        let mut url = format!("{}?page={page}", self.submissions_url());
        if let Some(member) = member {
            url.push_str("&f.User=");
            url.push_str(member);
        }
        url
    }

    fn parse_page(&self, html: &str, url: &str) -> Result<SubmissionPage, ParseError> {
        let total_pages = max_page_number(
            html,
            regex!(r#"<a[^>]*href=["'][^"']*/submissions\?[^"']*page=([0-9]+)[^"']*["'][^>]*>[0-9]+</a>"#),
        )
        .unwrap_or(1);
        // an empty listing has no table at all
        let Some(table) = find_fragment(html, "table")? else {
            return Ok(SubmissionPage { rows: Vec::new(), total_pages });
        };
        let rows = self
            .parser
            .parse(&table)?
            .iter()
            .map(|row| submission_from_row(row, url))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SubmissionPage { rows, total_pages })
    }
}

impl StandingsAdapter for AtCoder {
    fn get_standings(&self, request: &StandingsRequest) -> Result<StandingsReply, AdapterError> {
        let cursor = request.cursor.unwrap_or_default();
        let users = request.users.as_ref();

        if let (Some(users), Some(previous)) = (users, request.previous.as_ref()) {
            if !users.is_empty() {
                return Ok(StandingsReply::document(self.partial_refresh(users, previous, cursor)));
            }
        }

        let standings_url = self.standings_url();
        let data: StandingsJson = match self.get(&join!(&standings_url, "/json")) {
            Ok(page) => serde_json::from_str(&page).map_err(ParseError::from)?,
            Err(e) if e.is_not_found() => {
                info!(contest = %self.contest.key, "standings are gone, deleting contest");
                return Ok(StandingsReply::delete());
            }
            Err(e) => return Err(e.into()),
        };

        let writers = parse_writers(&self.get(&self.contest.url)?);
        let ratings = parse_results(&self.get(&join!(&self.contest.url, "/results/"))?, users)?;

        let mut problems = self.task_infos(&data.task_info);
        self.load_full_scores(&mut problems);

        let submissions_url = self.submissions_url();
        let mut builder = StandingsBuilder::new(&problems, &submissions_url, users, request.previous.as_ref());
        builder.official(data.standings_data, ratings);

        match self.get(&join!(&standings_url, "/virtual/json")) {
            Ok(page) => {
                let virt: StandingsJson = serde_json::from_str(&page).map_err(ParseError::from)?;
                builder.virtual_rows(virt.standings_data);
            }
            Err(e) => warn!(contest = %self.contest.key, error = %e, "virtual standings unavailable"),
        }

        let (has_rated, has_new_rating) = (builder.has_rated, builder.has_new_rating);
        let mut doc = StandingsDocument::new(&standings_url);
        doc.result = builder.result;
        doc.problems = problems;
        doc.writers = Some(writers);

        if users.is_none_or(|u| !u.is_empty()) {
            self.sync_submissions(&mut doc, users, cursor);
        }
        if let Some(previous) = &request.previous {
            let kept = reconcile_with_previous(&mut doc.result, previous);
            debug!(kept, "empty rows kept from the previous snapshot");
        }
        if rating_pending(has_rated, has_new_rating, self.contest.end_time, (self.clock)()) {
            doc.request_rerun(RATING_PENDING_DELAY);
        }

        mark_no_update(&mut doc.result, "IsRated");
        doc.hidden_fields = Some(HIDDEN_FIELDS.iter().map(|f| s!(*f)).collect());
        Ok(StandingsReply::document(doc))
    }

    fn get_user_infos(&self, users: &[String], profile_url: &str) -> Result<Vec<UserInfo>, AdapterError> {
        let limiter = RequestQuota::new(self.opts.profile_quota, self.opts.profile_window);
        let mut infos = Vec::with_capacity(users.len());
        let mut progress = LogProgress::new("profiles");
        WorkerPool::from_options(&self.opts).run_ordered(
            users,
            &CancelToken::new(),
            &mut progress,
            |user| {
                limiter.acquire();
                let url = profile_url.replace("{account}", user);
                self.get(&url).map(|page| parse_profile(&page))
            },
            |_, outcome| {
                infos.push(match outcome {
                    Ok(info) if info.is_empty() => UserInfo::Skip,
                    Ok(info) => UserInfo::Info(info),
                    Err(e) if e.is_not_found() => UserInfo::Missing,
                    Err(_) => UserInfo::Skip,
                });
                ControlFlow::Continue(())
            },
        );
        Ok(infos)
    }

    fn get_source_code(&self, problem: &ProblemResult) -> Result<SourceCode, AdapterError> {
        let url = problem.url.as_deref().ok_or_else(|| AdapterError::NotFound(s!("submission url")))?;
        let page = self.get(url)?;
        let doc = Html::parse_document(&page);
        let pre = doc
            .select(selector!("pre#submission-code"))
            .next()
            .ok_or_else(|| AdapterError::NotFound(s!("source code")))?;
        Ok(SourceCode { solution: pre.text().collect() })
    }
}
