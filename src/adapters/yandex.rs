// src/adapters/yandex.rs
//! Yandex.Contest standings: cells are told apart by `table__cell_role_*` classes,
//! binary-judged problems show success/fail images instead of text, and pages are
//! followed through the pager one at a time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Datelike;
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use super::{StandingsAdapter, StandingsRequest};
use crate::config::SyncOptions;
use crate::core::html::{Cell, HtmlTableParser, Row, TableParser, require_table};
use crate::core::net::{PageFetcher, fetch_page};
use crate::core::sanitize::{first_word, is_integer, parse_clock, parse_number};
use crate::error::{AdapterError, ParseError};
use crate::model::{Contest, Penalty, ProblemInfo, ProblemResult, Standing, StandingsDocument, StandingsReply, Verdict};

pub struct Yandex {
    contest: Contest,
    fetcher: Arc<dyn PageFetcher>,
    opts: SyncOptions,
    parser: HtmlTableParser,
}

impl Yandex {
    pub fn new(contest: Contest, fetcher: Arc<dyn PageFetcher>, opts: SyncOptions) -> Self {
        Self { contest, fetcher, opts, parser: HtmlTableParser::new() }
    }

    /// Labels for header cells without text (icon-only columns).
    pub fn with_unnamed_fields(mut self, fields: &[&str]) -> Self {
        self.parser = HtmlTableParser::with_unnamed_fields(fields);
        self
    }

    /// `…/contest/123/enter/?lang=ru` → `…/contest/123/standings`.
    pub fn standings_url(&self) -> String {
        if let Some(url) = &self.contest.standings_url {
            return url.clone();
        }
        let url = self.contest.url.replace("enter/", "").replace("enter", "");
        let url = url.split('?').next().unwrap_or("").trim_end_matches('/');
        join!(url, "/standings")
    }

    /// Academic season of the contest: `2020-2021` for anything from September 2020
    /// to August 2021.
    pub fn season(&self) -> String {
        if let Some(season) = &self.contest.season {
            return season.clone();
        }
        let start = self.contest.start_time;
        let year = start.year() - if start.month() > 8 { 0 } else { 1 };
        format!("{year}-{}", year + 1)
    }

    pub fn parse_doc(&self, html: &str) -> Result<Vec<Row>, ParseError> {
        let table = require_table(html, "table[class*=standings]")?;
        self.parser.parse(&table)
    }
}

/// Link to page `n` in the pager, resolved against `base`.
pub fn next_page_url(html: &str, base: &str, n: u32) -> Option<String> {
    let href = regex!(r#"<a[^>]*href="([^"]*standings[^"]*p[^"]*=([0-9]+))"[^>]*>"#)
        .captures_iter(html)
        .find(|c| c.get(2).and_then(|m| m.as_str().parse::<u32>().ok()) == Some(n))?
        .get(1)?
        .as_str()
        .replace("&amp;", "&");
    Url::parse(base).and_then(|b| b.join(&href)).map(|u| u.to_string()).ok()
}

/// `"Frogs (100 баллов)"` → (`"Frogs"`, `Some(100)`).
fn split_full_score(title: &str) -> (String, Option<f64>) {
    match regex!(r"(?i)\((?P<full>[0-9]+)\s*балл.{0,3}\)$").captures(title) {
        Some(c) => {
            let start = c.get(0).map_or(title.len(), |m| m.start());
            (s!(title[..start].trim()), c.name("full").and_then(|m| m.as_str().parse().ok()))
        }
        None => (s!(title), None),
    }
}

/// Accumulated rows and problem headers.
#[derive(Default)]
pub struct YandexRows {
    pub result: BTreeMap<String, Standing>,
    pub problems: Vec<ProblemInfo>,
    season: String,
}

impl YandexRows {
    pub fn new(season: &str) -> Self {
        Self { season: s!(season), ..Self::default() }
    }

    pub fn absorb(&mut self, rows: &[Row]) {
        for row in rows {
            if let Some(st) = self.standing_from_row(row) {
                self.result.insert(st.member.clone(), st);
            }
        }
    }

    fn problem_info(&mut self, cell: &Cell, letter: &str) {
        let idx = match self.problems.iter().position(|p| p.short == letter) {
            Some(i) => i,
            None => {
                self.problems.push(ProblemInfo::new(letter));
                self.problems.len() - 1
            }
        };
        if let [title] = cell.header.titles.as_slice() {
            let (name, full) = split_full_score(title);
            let info = &mut self.problems[idx];
            info.name = Some(name);
            if full.is_some() {
                info.full_score = full;
            }
        }
    }

    fn result_cell(cell: &Cell) -> Option<ProblemResult> {
        let (result, binary) = if cell.contains(selector!("img[class*=image_type_success]")) {
            (Verdict::Accepted { failures: 0 }, Some(true))
        } else if cell.contains(selector!("img[class*=image_type_fail]")) {
            (Verdict::Rejected { failures: 0 }, Some(false))
        } else {
            if !cell.value.contains(' ') && !cell.value.starts_with('?') {
                return None;
            }
            let token = first_word(&cell.value).replace(',', "");
            (token.parse::<Verdict>().ok()?, None)
        };

        let mut p = ProblemResult::with_result(result);
        p.binary = binary;
        if let Some((_, time)) = cell.value.split_once(' ') {
            match parse_clock(time) {
                Some(secs) => p.set_elapsed(secs),
                None => p.time = Some(s!(time)),
            }
        }
        p.first_ac = cell.has_class("table__cell_firstSolved_true");
        Some(p)
    }

    fn standing_from_row(&mut self, row: &Row) -> Option<Standing> {
        let mut st = Standing::default();
        let mut solved = 0u32;
        let mut has_scores = false;

        for (label, cell) in row.iter() {
            if cell.has_class("table__cell_role_result") {
                let letter = first_word(label);
                if letter.is_empty() || letter == "X" {
                    continue;
                }
                self.problem_info(cell, letter);
                let Some(p) = Self::result_cell(cell) else { continue };
                if let Some(r) = p.result {
                    match r {
                        Verdict::Accepted { .. } => solved += 1,
                        Verdict::Score(x) => {
                            has_scores |= x > 0.0;
                            if first_word(&cell.value).starts_with("100") {
                                solved += 1;
                            }
                        }
                        Verdict::Rejected { .. } => {}
                    }
                }
                st.problems.insert(s!(letter), p);
            } else if cell.has_class("table__cell_role_participant") {
                let name = match cell.titles.first() {
                    Some(title) => title.clone(),
                    None => cell.value.replacen(' ', "", 1),
                };
                st.member = if name.contains(' ') { format!("{name} {}", self.season) } else { name.clone() };
                st.name = Some(name);
                if let Some(country) = cell.select_attr(selector!("div[class*=country-flag]"), "title").into_iter().next() {
                    st.extra.insert(s!("country"), Value::String(country));
                }
            } else if cell.has_class("table__cell_role_place") {
                st.place = Some(cell.value.clone());
            } else if cell.has_class("table__header_type_penalty") {
                st.penalty = if is_integer(&cell.value) {
                    cell.value.parse().ok().map(Penalty::Points)
                } else {
                    parse_clock(&cell.value).map(|seconds| Penalty::Elapsed { seconds })
                };
            } else if cell.has_class("table__header_type_score") {
                if let Some(x) = parse_number(&cell.value) {
                    st.solving = x;
                }
            }
        }

        if has_scores {
            st.solved = Some(solved);
        }
        if st.problems.is_empty() || st.member.is_empty() {
            return None;
        }
        Some(st)
    }
}

impl StandingsAdapter for Yandex {
    fn get_standings(&self, request: &StandingsRequest) -> Result<StandingsReply, AdapterError> {
        let standings_url = self.standings_url();
        if !regex!(r"/[0-9]+/").is_match(&standings_url) {
            debug!(url = %standings_url, "not a contest url, nothing to fetch");
            return Ok(StandingsReply::document(StandingsDocument::new(&standings_url)));
        }

        let mut rows = YandexRows::new(&self.season());
        let mut url = standings_url.clone();
        let mut n_page = 1u32;
        loop {
            let page = fetch_page(&*self.fetcher, &url, &self.opts.retry, self.opts.credentials.as_ref())?;
            rows.absorb(&self.parse_doc(&page)?);
            n_page += 1;
            match next_page_url(&page, &url, n_page) {
                Some(next) => url = next,
                None => break,
            }
        }
        info!(contest = %self.contest.key, pages = n_page - 1, rows = rows.result.len(), "yandex standings fetched");

        let YandexRows { mut result, problems, .. } = rows;
        if let Some(users) = &request.users {
            result.retain(|member, _| users.contains(member));
        }

        let mut doc = StandingsDocument::new(&standings_url);
        doc.result = result;
        doc.problems = problems;
        Ok(StandingsReply::document(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"<html><body>
      <table class="table table_role_standings standings">
        <tr>
          <th class="table__header_type_place">#</th>
          <th class="table__header_type_participant">Participant</th>
          <th class="table__header_type_problem">A <span title="Frogs (100 баллов)">Frogs</span></th>
          <th class="table__header_type_problem">B <span title="Binary">B</span></th>
          <th class="table__header_type_score">Score</th>
          <th class="table__header_type_penalty">Penalty</th>
        </tr>
        <tr>
          <td class="table__cell table__cell_role_place">1</td>
          <td class="table__cell table__cell_role_participant"><span title="Ivan Petrov">Ivan Petrov</span><div class="country-flag" title="Belarus"></div></td>
          <td class="table__cell table__cell_role_result table__cell_firstSolved_true">100 0:12</td>
          <td class="table__cell table__cell_role_result"><img class="image image_type_success"></td>
          <td class="table__cell table__header_type_score">1,100</td>
          <td class="table__cell table__header_type_penalty">12</td>
        </tr>
        <tr>
          <td class="table__cell table__cell_role_place">2</td>
          <td class="table__cell table__cell_role_participant">petya</td>
          <td class="table__cell table__cell_role_result">+2 1:05</td>
          <td class="table__cell table__cell_role_result"><img class="image image_type_fail"></td>
          <td class="table__cell table__header_type_score">1</td>
          <td class="table__cell table__header_type_penalty">65</td>
        </tr>
        <tr>
          <td class="table__cell table__cell_role_place">3</td>
          <td class="table__cell table__cell_role_participant">ghost</td>
          <td class="table__cell table__cell_role_result">0</td>
          <td class="table__cell table__cell_role_result"></td>
          <td class="table__cell table__header_type_score">0</td>
          <td class="table__cell table__header_type_penalty">0</td>
        </tr>
      </table>
      <a href="/contest/123/standings/?p=2">2</a>
    </body></html>"#;

    fn adapter(url: &str, month: u32) -> Yandex {
        struct Offline;
        impl PageFetcher for Offline {
            fn fetch(&self, url: &str) -> Result<String, crate::error::FetchError> {
                Err(crate::error::FetchError::network(url, "offline"))
            }
            fn submit_form(&self, url: &str, _: &[(String, String)]) -> Result<String, crate::error::FetchError> {
                Err(crate::error::FetchError::network(url, "offline"))
            }
        }
        let start = Utc.with_ymd_and_hms(2021, month, 1, 10, 0, 0).unwrap();
        Yandex::new(Contest::new("123", url, start, start), Arc::new(Offline), SyncOptions::default())
    }

    #[test]
    fn standings_url_and_season() {
        let y = adapter("https://contest.yandex.ru/contest/123/enter/?lang=ru", 10);
        assert_eq!(y.standings_url(), "https://contest.yandex.ru/contest/123/standings");
        assert_eq!(y.season(), "2021-2022");
        assert_eq!(adapter("https://contest.yandex.ru/contest/123/", 3).season(), "2020-2021");
    }

    #[test]
    fn class_roles_drive_the_row() {
        let y = adapter("https://contest.yandex.ru/contest/123/", 10);
        let mut rows = YandexRows::new(&y.season());
        rows.absorb(&y.parse_doc(PAGE).unwrap());

        let ivan = &rows.result["Ivan Petrov 2021-2022"];
        assert_eq!(ivan.name.as_deref(), Some("Ivan Petrov"));
        assert_eq!(ivan.place.as_deref(), Some("1"));
        assert_eq!(ivan.solving, 1100.0);
        assert_eq!(ivan.penalty, Some(Penalty::Points(12)));
        assert_eq!(ivan.extra["country"], Value::String(s!("Belarus")));
        assert_eq!(ivan.solved, Some(2));
        let a = &ivan.problems["A"];
        assert_eq!(a.result, Some(Verdict::Score(100.0)));
        assert!(a.first_ac);
        assert_eq!(ivan.problems["B"].binary, Some(true));

        let petya = &rows.result["petya"];
        assert_eq!(petya.problems["A"].result, Some(Verdict::Accepted { failures: 2 }));
        assert_eq!(petya.problems["B"].binary, Some(false));
        assert_eq!(petya.solved, None);

        // a lone "0" without a time is not a submission
        assert!(!rows.result.contains_key("ghost"));

        assert_eq!(rows.problems[0].name.as_deref(), Some("Frogs"));
        assert_eq!(rows.problems[0].full_score, Some(100.0));
        assert_eq!(rows.problems[1].full_score, None);
    }

    #[test]
    fn pager_links() {
        let base = "https://contest.yandex.ru/contest/123/standings";
        assert_eq!(
            next_page_url(PAGE, base, 2).as_deref(),
            Some("https://contest.yandex.ru/contest/123/standings/?p=2")
        );
        assert_eq!(next_page_url(PAGE, base, 3), None);
    }
}
