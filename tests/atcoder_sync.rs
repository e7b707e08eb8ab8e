// tests/atcoder_sync.rs
mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use common::{FakeFetcher, quick_options, utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use standings_sync::adapters::{AtCoder, StandingsAdapter, StandingsRequest};
use standings_sync::model::{Contest, Standing, StandingsDocument, StandingsReply, SyncCursor, Verdict};

const BASE: &str = "https://atcoder.jp/contests/abc100";

fn sub_url(page: u32) -> String {
    format!("{BASE}/submissions?page={page}")
}

fn detail(id: u32) -> String {
    format!("{BASE}/submissions/{id}")
}

/// (time, task, user, score, status, id)
type Sub<'a> = (&'a str, &'a str, &'a str, u32, &'a str, u32);

fn listing(rows: &[Sub], total_pages: u32) -> String {
    let mut html = String::from(
        "<table class=\"table\"><thead><tr><th>Submission Time</th><th>Task</th><th>User</th>\
         <th>Language</th><th>Score</th><th>Code Size</th><th>Status</th><th>Exec Time</th>\
         <th>Memory</th><th></th></tr></thead><tbody>",
    );
    for (time, task, user, score, status, id) in rows {
        html.push_str(&format!(
            "<tr><td><time class=\"fixtime\">{time}</time></td>\
             <td><a href=\"/contests/abc100/tasks/abc100_{lower}\">{task} - Problem</a></td>\
             <td><a href=\"/users/{user}\">{user}</a></td><td>Rust (1.42.0)</td><td>{score}</td>\
             <td>1 KB</td><td>{status}</td><td>1 ms</td><td>2 MB</td>\
             <td><a href=\"/contests/abc100/submissions/{id}\">Detail</a></td></tr>",
            lower = task.to_lowercase(),
        ));
    }
    html.push_str("</tbody></table><ul class=\"pagination\">");
    for p in 1..=total_pages {
        html.push_str(&format!("<li><a href=\"/contests/abc100/submissions?page={p}\">{p}</a></li>"));
    }
    html.push_str("</ul>");
    html
}

const P1: Sub = ("2021-01-02 10:00:00+0000", "B", "ann", 100, "AC", 5);
const P2: Sub = ("2021-01-02 09:00:00+0000", "A", "bob", 0, "WA", 4);
const P3: Sub = ("2021-01-02 08:00:00+0000", "B", "cat", 0, "WA", 3);
const P4: Sub = ("2021-01-01 13:00:00+0000", "A", "ann", 100, "AC", 2);
const P5: Sub = ("2021-01-01 12:30:00+0000", "A", "bob", 0, "WA", 1);

fn standings_json() -> String {
    json!({
        "TaskInfo": [
            {"TaskScreenName": "abc100_a", "Assignment": "A", "TaskName": "Happy Birthday!"},
            {"TaskScreenName": "abc100_b", "Assignment": "B", "TaskName": "Ringo's Favorite Numbers"}
        ],
        "StandingsData": [
            {"UserScreenName": "ann", "UserName": "Ann", "Rank": 1, "Country": "JP", "IsRated": true,
             "Rating": 1400, "OldRating": 1400, "AtCoderRank": 10,
             "TotalResult": {"Score": 10000, "Elapsed": 600_000_000_000i64},
             "TaskResults": {"abc100_a": {"Score": 10000, "Elapsed": 600_000_000_000i64, "Penalty": 0, "Failure": 0}}},
            {"UserScreenName": "bob", "Rank": 2, "IsRated": true, "Rating": 800, "OldRating": 800,
             "TotalResult": {"Score": 0, "Elapsed": 0},
             "TaskResults": {"abc100_a": {"Score": 0, "Failure": 2}}}
        ]
    })
    .to_string()
}

fn virtual_json() -> String {
    json!({
        "StandingsData": [
            {"UserScreenName": "dan", "TaskResults": {"abc100_b": {"Score": 20000, "Elapsed": 300_000_000_000i64}}}
        ]
    })
    .to_string()
}

fn results_page() -> String {
    let rows = json!([
        {"UserScreenName": "ann", "IsRated": true, "OldRating": 1400, "NewRating": 1500, "Performance": 1900},
        {"UserScreenName": "bob", "IsRated": true, "OldRating": 800, "NewRating": 780, "Performance": 600}
    ]);
    format!("<html><script>\nvar results = {rows};\n</script></html>")
}

fn contest() -> Contest {
    Contest::new("abc100", BASE, utc(2021, 1, 1, 12, 0), utc(2021, 1, 1, 13, 40))
}

fn fixture() -> (Arc<FakeFetcher>, AtCoder) {
    let f = Arc::new(FakeFetcher::new());
    f.serve(&format!("{BASE}/standings/json"), standings_json());
    f.serve(&format!("{BASE}/standings/virtual/json"), virtual_json());
    f.serve(BASE, "<ul><li>Writer: <a href=\"/users/setter\"><span>setter</span></a></li></ul>");
    f.serve(&format!("{BASE}/results/"), results_page());
    f.serve(
        &format!("{BASE}/tasks/abc100_a"),
        "<span class=\"lang-en\"><p>Score : <var>100</var> points</p></span>",
    );
    f.serve(
        &format!("{BASE}/tasks/abc100_b"),
        "<span class=\"lang-en\"><p>Score : <var>200</var> points</p></span>",
    );
    for (page, row) in [P1, P2, P3, P4, P5].into_iter().enumerate() {
        f.serve(&sub_url(page as u32 + 1), listing(&[row], 5));
    }
    let adapter = AtCoder::new(contest(), f.clone(), quick_options()).with_clock(|| utc(2021, 1, 5, 0, 0));
    (f, adapter)
}

fn document(reply: StandingsReply) -> StandingsDocument {
    reply.into_document().expect("expected a standings document")
}

fn ts(s: &str) -> i64 {
    chrono::DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z").unwrap().timestamp()
}

#[test]
fn interrupted_crawl_resumes_after_last_merged_page() {
    let (f, adapter) = fixture();
    f.fail(&sub_url(3));

    let first = document(adapter.get_standings(&StandingsRequest::default()).unwrap());
    let cursor = first.sync_state.unwrap();
    assert_eq!(
        cursor,
        SyncCursor { last_submission_time: -1, last_page: Some(2), last_page_submission_time: ts(P1.0) }
    );
    assert_eq!(first.timing_statistic_delta, Some(Duration::from_secs(15 * 60)));
    assert_eq!(first.writers, Some(vec!["setter".to_string()]));
    assert_eq!(first.problems.iter().map(|p| p.full_score).collect::<Vec<_>>(), vec![Some(100.0), Some(200.0)]);

    let ann = &first.result["ann"];
    assert_eq!(ann.place.as_deref(), Some("1"));
    assert_eq!(ann.extra["NewRating"], json!(1500));
    let ann_b = ann.problems["B"].upsolving.as_ref().unwrap();
    assert_eq!(ann_b.result, Some(Verdict::Score(100.0)));
    assert_eq!(ann_b.url.as_deref(), Some(detail(5).as_str()));
    assert_eq!(ann.problems["A"].url, None);
    let bob_a = &first.result["bob"].problems["A"];
    assert_eq!(bob_a.upsolving.as_ref().unwrap().result, Some(Verdict::Score(-1.0)));

    f.serve(&sub_url(3), listing(&[P3], 5));
    f.clear_log();
    let request = StandingsRequest { users: None, previous: Some(first.result.clone()), cursor: Some(cursor) };
    let second = document(adapter.get_standings(&request).unwrap());

    let fetched = f.fetched();
    for page in [1, 3, 4, 5] {
        assert!(fetched.contains(&sub_url(page)), "page {page} not fetched: {fetched:?}");
    }
    assert!(!fetched.contains(&sub_url(2)));
    assert_eq!(second.sync_state, Some(SyncCursor::completed(ts(P1.0))));
    assert_eq!(second.timing_statistic_delta, None);

    let ann = &second.result["ann"];
    assert_eq!(ann.problems["A"].result, Some(Verdict::Score(100.0)));
    assert_eq!(ann.problems["A"].url.as_deref(), Some(detail(2).as_str()));
    assert_eq!(ann.problems["B"].upsolving.as_ref().unwrap().url.as_deref(), Some(detail(5).as_str()));

    let bob_a = &second.result["bob"].problems["A"];
    assert_eq!(bob_a.result, Some(Verdict::Score(-2.0)));
    assert_eq!(bob_a.url.as_deref(), Some(detail(1).as_str()));
    assert_eq!(bob_a.verdict.as_deref(), Some("WA"));
    assert_eq!(bob_a.upsolving.as_ref().unwrap().result, Some(Verdict::Score(-1.0)));

    let cat_b = second.result["cat"].problems["B"].upsolving.as_ref().unwrap();
    assert_eq!(cat_b.result, Some(Verdict::Score(-1.0)));
}

#[test]
fn watermark_run_backfills_members_without_links() {
    let (f, adapter) = fixture();
    let first = document(adapter.get_standings(&StandingsRequest::default()).unwrap());
    let cursor = first.sync_state.unwrap();
    assert!(!cursor.in_progress());

    // dan only has a virtual-participation result, no submission link yet
    let dan_b = first.result["dan"].problems["B"].upsolving.as_ref().unwrap();
    assert_eq!(dan_b.result, Some(Verdict::Score(200.0)));
    assert_eq!(dan_b.url, None);

    let dan_url = format!("{}&f.User=dan", sub_url(1));
    f.serve(&dan_url, listing(&[("2021-01-03 10:00:00+0000", "B", "dan", 200, "AC", 6)], 1));
    f.clear_log();

    let request = StandingsRequest { users: None, previous: Some(first.result.clone()), cursor: Some(cursor) };
    let second = document(adapter.get_standings(&request).unwrap());
    assert!(f.fetched().contains(&dan_url));
    assert_eq!(second.sync_state, Some(cursor));

    let dan_b = second.result["dan"].problems["B"].upsolving.as_ref().unwrap();
    assert_eq!(dan_b.result, Some(Verdict::Score(200.0)));
    assert_eq!(dan_b.url.as_deref(), Some(detail(6).as_str()));
    assert_eq!(dan_b.submission_time, Some(ts("2021-01-03 10:00:00+0000")));
}

#[test]
fn member_refresh_reuses_stored_rows() {
    let (f, adapter) = fixture();
    let first = document(adapter.get_standings(&StandingsRequest::default()).unwrap());

    f.serve(&format!("{}&f.User=bob", sub_url(1)), listing(&[P2, P5], 1));
    f.clear_log();
    let request = StandingsRequest {
        users: Some(BTreeSet::from(["bob".to_string()])),
        previous: Some(first.result.clone()),
        cursor: first.sync_state,
    };
    let doc = document(adapter.get_standings(&request).unwrap());

    assert_eq!(doc.result.keys().collect::<Vec<_>>(), vec!["bob"]);
    assert_eq!(doc.result["bob"].unchanged, vec!["place", "solving", "upsolving"]);
    assert_eq!(doc.sync_state, first.sync_state);
    assert!(!f.fetched().iter().any(|u| u.ends_with("/standings/json")));
}

#[test]
fn empty_stored_rows_survive_and_stale_ones_do_not() {
    let (f, adapter) = fixture();
    f.serve(&sub_url(1), "<p>No Submissions</p>");

    let mut previous = BTreeMap::new();
    previous.insert("ghost".to_string(), Standing::new("ghost"));
    let mut stale = Standing::new("stale");
    stale.problem_mut("A").result = Some(Verdict::Score(100.0));
    previous.insert("stale".to_string(), stale);

    let request = StandingsRequest { previous: Some(previous), ..StandingsRequest::default() };
    let doc = document(adapter.get_standings(&request).unwrap());

    assert!(doc.result.contains_key("ghost"));
    assert!(doc.result["ghost"].no_update);
    assert!(!doc.result.contains_key("stale"));
    assert!(!doc.result["ann"].no_update);
    assert_eq!(doc.sync_state, Some(SyncCursor::completed(0)));
}

#[test]
fn missing_standings_delete_the_contest() {
    let (f, adapter) = fixture();
    f.forget(&format!("{BASE}/standings/json"));
    let reply = adapter.get_standings(&StandingsRequest::default()).unwrap();
    assert_eq!(reply, StandingsReply::delete());
    assert_eq!(f.fetched(), vec![format!("{BASE}/standings/json")]);
}
