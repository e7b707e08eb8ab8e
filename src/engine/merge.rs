// src/engine/merge.rs
//! Named update operations on `ProblemResult` / `Standing`.
//!
//! # Monotonic-improvement merge
//! A slot (in-contest record or its `upsolving` sub-record) is replaced only when
//! (a) the candidate score is positive and beats the stored score, or
//! (b) both are non-positive, the candidate carries more failures (lower score) and its
//!     submission time is at least as recent as the recorded one.
//! Equal scores only refresh provenance, and only for a strictly later submission
//! (`(time, url)` compared as a pair), so applying the same candidate twice is a no-op
//! and the winner of a set of candidates does not depend on arrival order.
//!
//! Failed submissions reach the merge through `FailureTally`, which counts distinct
//! failures newer than the slot's recorded submission and turns them into one candidate.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::consts::SCORE_EPS;
use crate::model::{ProblemResult, Standing, Verdict};

/// Where a result came from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmissionRef {
    pub url: Option<String>,
    pub verdict: Option<String>,
    pub language: Option<String>,
    pub external_solution: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    /// Positive: solved with this score. Non-positive: signed failure count.
    pub score: f64,
    /// Unix time of the backing submission; `None` for aggregate snapshots.
    pub time: Option<i64>,
    /// Seconds since contest start, shown as `m:ss`.
    pub elapsed: Option<i64>,
    pub penalty: Option<u32>,
    pub source: SubmissionRef,
}

impl Candidate {
    pub fn solved(score: f64, time: Option<i64>) -> Self {
        Self { score, time, elapsed: None, penalty: None, source: SubmissionRef::default() }
    }

    pub fn failures(count: u32, time: Option<i64>) -> Self {
        Self::solved(-(count as f64), time)
    }
}

/// `(time, url)` of `a` strictly after `b`; `None` sorts first.
fn supersedes(a_time: Option<i64>, a_url: Option<&str>, b_time: Option<i64>, b_url: Option<&str>) -> bool {
    (a_time, a_url) > (b_time, b_url)
}

fn at_least_as_recent(cand: Option<i64>, recorded: Option<i64>) -> bool {
    match (cand, recorded) {
        (Some(c), Some(r)) => c >= r,
        _ => true,
    }
}

fn take_provenance(slot: &mut ProblemResult, cand: &Candidate) {
    slot.submission_time = cand.time;
    slot.url = cand.source.url.clone();
    slot.verdict = cand.source.verdict.clone();
    slot.language = cand.source.language.clone();
    slot.external_solution = cand.source.external_solution;
}

fn take_result(slot: &mut ProblemResult, cand: &Candidate) {
    slot.result = Some(Verdict::Score(cand.score));
    match cand.elapsed {
        Some(secs) => slot.set_elapsed(secs),
        None => {
            slot.time = None;
            slot.time_in_seconds = None;
        }
    }
    slot.penalty = cand.penalty.filter(|p| *p > 0);
    // aggregate snapshots carry no submission of their own
    if cand.time.is_some() || cand.source != SubmissionRef::default() {
        take_provenance(slot, cand);
    }
}

/// Apply the monotonic-improvement rule. Returns whether the slot changed.
pub fn merge_if_better(slot: &mut ProblemResult, cand: &Candidate) -> bool {
    let prev = slot.score();
    let newer = supersedes(cand.time, cand.source.url.as_deref(), slot.submission_time, slot.url.as_deref());

    if cand.score > SCORE_EPS {
        if cand.score > prev + SCORE_EPS {
            take_result(slot, cand);
            return true;
        }
        if (cand.score - prev).abs() <= SCORE_EPS && newer {
            take_provenance(slot, cand);
            return true;
        }
        return false;
    }

    if prev > SCORE_EPS {
        return false;
    }
    if cand.score < prev - SCORE_EPS && at_least_as_recent(cand.time, slot.submission_time) {
        take_result(slot, cand);
        return true;
    }
    if slot.has_result() && (cand.score - prev).abs() <= SCORE_EPS && newer {
        take_provenance(slot, cand);
        return true;
    }
    false
}

/// Attach a submission to an in-contest record without touching its result (the
/// standings page owns that). The latest submission not beaten by the stored score wins.
pub fn attach_submission(slot: &mut ProblemResult, score: f64, time: i64, source: &SubmissionRef) -> bool {
    if !supersedes(Some(time), source.url.as_deref(), slot.submission_time, slot.url.as_deref()) {
        return false;
    }
    let cur = slot.score();
    if cur > SCORE_EPS && cur > score + SCORE_EPS {
        return false;
    }
    slot.submission_time = Some(time);
    slot.url = source.url.clone();
    slot.verdict = source.verdict.clone();
    slot.language = source.language.clone();
    slot.external_solution = source.external_solution;
    true
}

/// Distinct failed submissions of one slot seen during one pass.
#[derive(Clone, Debug)]
pub struct FailureTally {
    base: f64,
    base_time: Option<i64>,
    seen: BTreeSet<(i64, String)>,
    latest: Option<(i64, SubmissionRef)>,
}

impl FailureTally {
    /// Snapshot the slot on first touch in a pass.
    pub fn new(slot: &ProblemResult) -> Self {
        Self {
            base: slot.score().min(0.0),
            base_time: slot.submission_time,
            seen: BTreeSet::new(),
            latest: None,
        }
    }

    /// Count a failure; older-or-equal than what the slot already recorded is
    /// assumed counted by an earlier pass. Returns the candidate to merge, if any.
    pub fn record(&mut self, time: i64, source: &SubmissionRef) -> Option<Candidate> {
        if self.base_time.is_some_and(|t| time <= t) {
            return None;
        }
        let key = (time, source.url.clone().unwrap_or_default());
        if !self.seen.insert(key) {
            return None;
        }
        let newest = match &self.latest {
            Some((t, s)) => supersedes(Some(time), source.url.as_deref(), Some(*t), s.url.as_deref()),
            None => true,
        };
        if newest {
            self.latest = Some((time, source.clone()));
        }
        let (t, src) = self.latest.clone()?;
        Some(Candidate {
            score: self.base - self.seen.len() as f64,
            time: Some(t),
            elapsed: None,
            penalty: None,
            source: src,
        })
    }
}

/// Previous rows of the refreshed members seed a member-filtered run. Ranking fields
/// stay with the orchestrator's stored copy.
pub fn seed_partial_refresh<'a>(
    users: impl IntoIterator<Item = &'a String>,
    previous: &BTreeMap<String, Standing>,
) -> BTreeMap<String, Standing> {
    let mut out = BTreeMap::new();
    for member in users {
        let Some(prev) = previous.get(member) else { continue };
        let mut row = prev.clone();
        row.member = member.clone();
        row.unchanged = vec![s!("place"), s!("solving"), s!("upsolving")];
        out.insert(member.clone(), row);
    }
    out
}

/// Bring back members missing from a partial fetch only when they have nothing to
/// lose: a stored row with any recorded problem result is stale and stays dropped.
/// Returns how many placeholders were retained.
pub fn reconcile_with_previous(
    result: &mut BTreeMap<String, Standing>,
    previous: &BTreeMap<String, Standing>,
) -> usize {
    let mut retained = 0;
    for (member, row) in previous {
        if result.contains_key(member) || row.has_any_result() {
            continue;
        }
        let mut row = row.clone();
        row.member = member.clone();
        result.insert(member.clone(), row);
        retained += 1;
    }
    retained
}

/// Flag rows that carry neither a result nor a rating (`rated_key` set to `true`).
pub fn mark_no_update(result: &mut BTreeMap<String, Standing>, rated_key: &str) {
    for row in result.values_mut() {
        let rated = row.extra.get(rated_key).and_then(|v| v.as_bool()).unwrap_or(false);
        row.no_update = !(row.has_any_result() || rated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(url: &str) -> SubmissionRef {
        SubmissionRef { url: Some(s!(url)), ..SubmissionRef::default() }
    }

    fn at(score: f64, time: i64, url: &str) -> Candidate {
        Candidate { source: src(url), ..Candidate::solved(score, Some(time)) }
    }

    #[test]
    fn higher_positive_replaces_lower_does_not() {
        let mut slot = ProblemResult::default();
        assert!(merge_if_better(&mut slot, &at(50.0, 10, "s/1")));
        assert!(merge_if_better(&mut slot, &at(100.0, 5, "s/2")));
        assert!(!merge_if_better(&mut slot, &at(70.0, 20, "s/3")));
        assert_eq!(slot.result, Some(Verdict::Score(100.0)));
        assert_eq!(slot.url.as_deref(), Some("s/2"));
    }

    #[test]
    fn failures_never_override_a_solve() {
        let mut slot = ProblemResult::default();
        merge_if_better(&mut slot, &at(100.0, 10, "s/1"));
        assert!(!merge_if_better(&mut slot, &Candidate { source: src("s/2"), ..Candidate::failures(3, Some(99)) }));
        assert_eq!(slot.score(), 100.0);
    }

    #[test]
    fn more_failures_need_recency() {
        let mut slot = ProblemResult::with_result(Verdict::Score(-1.0));
        slot.submission_time = Some(50);
        assert!(!merge_if_better(&mut slot, &Candidate::failures(2, Some(40))));
        assert!(merge_if_better(&mut slot, &Candidate::failures(2, Some(50))));
        assert!(!merge_if_better(&mut slot, &Candidate::failures(1, Some(60))));
        assert_eq!(slot.score(), -2.0);
        // aggregate snapshots carry no time
        assert!(merge_if_better(&mut slot, &Candidate::failures(4, None)));
        assert_eq!(slot.score(), -4.0);
    }

    #[test]
    fn equal_score_refreshes_to_latest_only() {
        let mut slot = ProblemResult::default();
        merge_if_better(&mut slot, &at(100.0, 10, "s/1"));
        assert!(merge_if_better(&mut slot, &at(100.0, 30, "s/3")));
        assert!(!merge_if_better(&mut slot, &at(100.0, 20, "s/2")));
        assert!(!merge_if_better(&mut slot, &at(100.0, 30, "s/3")));
        assert_eq!(slot.submission_time, Some(30));
    }

    #[test]
    fn attach_keeps_result_and_prefers_latest_unbeaten() {
        let mut slot = ProblemResult::with_result(Verdict::Score(100.0));
        assert!(attach_submission(&mut slot, 100.0, 10, &src("s/1")));
        assert!(!attach_submission(&mut slot, 0.0, 20, &src("s/2")));
        assert!(!attach_submission(&mut slot, 100.0, 5, &src("s/0")));
        assert_eq!(slot.url.as_deref(), Some("s/1"));
        assert_eq!(slot.result, Some(Verdict::Score(100.0)));
    }

    #[test]
    fn tally_counts_distinct_newer_failures() {
        let mut slot = ProblemResult::with_result(Verdict::Score(-1.0));
        slot.submission_time = Some(100);
        let mut tally = FailureTally::new(&slot);
        assert!(tally.record(90, &src("s/old")).is_none());
        let c = tally.record(120, &src("s/a")).unwrap();
        assert_eq!((c.score, c.time), (-2.0, Some(120)));
        assert!(tally.record(120, &src("s/a")).is_none());
        let c = tally.record(110, &src("s/b")).unwrap();
        assert_eq!((c.score, c.time), (-3.0, Some(120)));
        assert_eq!(c.source.url.as_deref(), Some("s/a"));
    }

    #[test]
    fn reconcile_keeps_only_empty_placeholders() {
        let mut prev = BTreeMap::new();
        prev.insert(s!("ghost"), Standing::new("ghost"));
        let mut real = Standing::new("real");
        real.problem_mut("A").result = Some(Verdict::Score(-1.0));
        prev.insert(s!("real"), real);

        let mut fresh = BTreeMap::new();
        fresh.insert(s!("alice"), Standing::new("alice"));
        assert_eq!(reconcile_with_previous(&mut fresh, &prev), 1);
        assert!(fresh.contains_key("ghost"));
        assert!(!fresh.contains_key("real"));
    }

    #[test]
    fn rows_without_result_or_rating_are_flagged() {
        let mut result = BTreeMap::new();
        let mut rated = Standing::new("rated");
        rated.extra.insert(s!("IsRated"), serde_json::json!(true));
        result.insert(s!("rated"), rated);
        result.insert(s!("idle"), Standing::new("idle"));
        mark_no_update(&mut result, "IsRated");
        assert!(!result["rated"].no_update);
        assert!(result["idle"].no_update);
    }

    #[test]
    fn seeded_rows_keep_ranking_fields() {
        let mut prev = BTreeMap::new();
        let mut row = Standing::new("bob");
        row.place = Some(s!("7"));
        prev.insert(s!("bob"), row);
        let users = vec![s!("bob"), s!("nobody")];
        let seeded = seed_partial_refresh(&users, &prev);
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded["bob"].place.as_deref(), Some("7"));
        assert_eq!(seeded["bob"].unchanged, vec!["place", "solving", "upsolving"]);
    }
}
