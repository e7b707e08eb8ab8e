// src/model/standing.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::consts::SCORE_EPS;
use crate::core::sanitize::{format_clock, parse_clock};
use crate::error::ParseError;

/// Outcome of one contestant on one problem.
///
/// Wire form: scores are numbers, accepted/rejected markers are strings
/// (`"+"`, `"+2"`, `"-3"`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "VerdictRepr", try_from = "VerdictRepr")]
pub enum Verdict {
    /// Numeric score. Negative values are a signed failed-attempt count.
    Score(f64),
    Accepted { failures: u32 },
    Rejected { failures: u32 },
}

impl Verdict {
    /// Projection used by the monotonic merge: positive means solved.
    pub fn score(&self) -> f64 {
        match *self {
            Verdict::Score(x) => x,
            Verdict::Accepted { .. } => 1.0,
            Verdict::Rejected { failures } => -(failures as f64),
        }
    }

    /// Full marks (or an accepted marker). Scores without a known full score
    /// count as solved at 100 points.
    pub fn is_solved(&self, full_score: Option<f64>) -> bool {
        match *self {
            Verdict::Accepted { .. } => true,
            Verdict::Rejected { .. } => false,
            Verdict::Score(x) => x + SCORE_EPS >= full_score.unwrap_or(100.0),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Verdict::Score(x) => write!(f, "{x}"),
            Verdict::Accepted { failures: 0 } => write!(f, "+"),
            Verdict::Accepted { failures } => write!(f, "+{failures}"),
            Verdict::Rejected { failures: 0 } => write!(f, "-"),
            Verdict::Rejected { failures } => write!(f, "-{failures}"),
        }
    }
}

impl FromStr for Verdict {
    type Err = ParseError;

    /// `"+"`/`"+0"` accepted, `"+N"` accepted after N failures, `"-N"` N failed attempts
    /// (a bare `"-"` is a binary reject), plain digits a score.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseError::BadValue { field: s!("result"), value: s!(s) };
        let t = s.trim();
        if let Some(rest) = t.strip_prefix('+') {
            let failures = if rest.is_empty() { 0 } else { rest.parse().map_err(|_| bad())? };
            return Ok(Verdict::Accepted { failures });
        }
        if let Some(rest) = t.strip_prefix('-') {
            let failures = if rest.is_empty() { 0 } else { rest.parse().map_err(|_| bad())? };
            return Ok(Verdict::Rejected { failures });
        }
        let cleaned = t.replace(',', "");
        cleaned.parse::<f64>().map(Verdict::Score).map_err(|_| bad())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum VerdictRepr {
    Number(f64),
    Text(String),
}

impl From<Verdict> for VerdictRepr {
    fn from(v: Verdict) -> Self {
        match v {
            Verdict::Score(x) => VerdictRepr::Number(x),
            other => VerdictRepr::Text(other.to_string()),
        }
    }
}

impl TryFrom<VerdictRepr> for Verdict {
    type Error = ParseError;
    fn try_from(r: VerdictRepr) -> Result<Self, Self::Error> {
        match r {
            VerdictRepr::Number(x) => Ok(Verdict::Score(x)),
            VerdictRepr::Text(s) => s.parse(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_seconds: Option<i64>,
    /// Attempt penalty reported by the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub first_ac: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<bool>,

    // provenance of the submission backing this result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub external_solution: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upsolving: Option<Box<ProblemResult>>,
}

impl ProblemResult {
    pub fn with_result(result: Verdict) -> Self {
        Self { result: Some(result), ..Self::default() }
    }

    /// Score projection; no result counts as 0.
    pub fn score(&self) -> f64 {
        self.result.map_or(0.0, |r| r.score())
    }

    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }

    /// Result present here or in the upsolving record.
    pub fn has_any_result(&self) -> bool {
        self.has_result() || self.upsolving.as_ref().is_some_and(|u| u.has_result())
    }

    pub fn set_elapsed(&mut self, seconds: i64) {
        self.time_in_seconds = Some(seconds);
        self.time = Some(format_clock(seconds));
    }

    pub fn upsolving_mut(&mut self) -> &mut ProblemResult {
        self.upsolving.get_or_insert_with(Default::default)
    }

    /// Result recorded without the submission link needed to show it.
    pub fn lacks_url(&self) -> bool {
        let own = self.has_result() && self.url.is_none();
        let up = self.upsolving.as_ref().is_some_and(|u| u.has_result() && u.url.is_none());
        own || up
    }
}

/// Total penalty of a row. Ranking compares `key()`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "PenaltyRepr", try_from = "PenaltyRepr")]
pub enum Penalty {
    Points(i64),
    Elapsed { seconds: i64 },
}

impl Penalty {
    pub fn key(&self) -> i64 {
        match *self {
            Penalty::Points(p) => p,
            Penalty::Elapsed { seconds } => seconds,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PenaltyRepr {
    Number(i64),
    Text(String),
}

impl From<Penalty> for PenaltyRepr {
    fn from(p: Penalty) -> Self {
        match p {
            Penalty::Points(x) => PenaltyRepr::Number(x),
            Penalty::Elapsed { seconds } => PenaltyRepr::Text(format_clock(seconds)),
        }
    }
}

impl TryFrom<PenaltyRepr> for Penalty {
    type Error = ParseError;
    fn try_from(r: PenaltyRepr) -> Result<Self, Self::Error> {
        match r {
            PenaltyRepr::Number(x) => Ok(Penalty::Points(x)),
            PenaltyRepr::Text(s) => parse_clock(&s)
                .map(|seconds| Penalty::Elapsed { seconds })
                .ok_or(ParseError::BadValue { field: s!("penalty"), value: s }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Delete,
}

/// Canonical result row of one contestant.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Standing {
    pub member: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(default)]
    pub solving: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Penalty>,
    /// Number of accepted problems.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solved: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub problems: BTreeMap<String, ProblemResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RowAction>,
    /// Fields the orchestrator keeps from its stored row (partial refresh).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unchanged: Vec<String>,
    /// No result and no rating: not worth counting as a played contest.
    #[serde(default, skip_serializing_if = "is_false")]
    pub no_update: bool,
    /// Country, rating changes and anything else the platform reports.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Standing {
    pub fn new(member: &str) -> Self {
        Self { member: s!(member), ..Self::default() }
    }

    /// Any problem with a recorded result, in-contest or upsolving.
    pub fn has_any_result(&self) -> bool {
        self.problems.values().any(ProblemResult::has_any_result)
    }

    pub fn problem_mut(&mut self, short: &str) -> &mut ProblemResult {
        self.problems.entry(s!(short)).or_default()
    }

    /// Set an extra field only if it is not there yet.
    pub fn set_extra_if_absent(&mut self, key: &str, value: Value) {
        self.extra.entry(s!(key)).or_insert(value);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemInfo {
    pub code: String,
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ProblemInfo {
    pub fn new(short: &str) -> Self {
        Self { code: s!(short), short: s!(short), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verdict_encodings() {
        assert_eq!("+0".parse::<Verdict>().unwrap(), Verdict::Accepted { failures: 0 });
        assert_eq!("+".parse::<Verdict>().unwrap(), Verdict::Accepted { failures: 0 });
        assert_eq!("+2".parse::<Verdict>().unwrap(), Verdict::Accepted { failures: 2 });
        assert_eq!("-3".parse::<Verdict>().unwrap(), Verdict::Rejected { failures: 3 });
        assert_eq!("1,200".parse::<Verdict>().unwrap(), Verdict::Score(1200.0));
        assert!("+x".parse::<Verdict>().is_err());
    }

    #[test]
    fn verdict_wire_form() {
        let p = ProblemResult::with_result(Verdict::Accepted { failures: 0 });
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({"result": "+"}));

        let back: ProblemResult = serde_json::from_value(json!({"result": -2.0})).unwrap();
        assert_eq!(back.result, Some(Verdict::Score(-2.0)));
        let back: ProblemResult = serde_json::from_value(json!({"result": "-3"})).unwrap();
        assert_eq!(back.result, Some(Verdict::Rejected { failures: 3 }));
    }

    #[test]
    fn standing_extra_fields_flatten() {
        let mut s = Standing::new("tourist");
        s.penalty = Some(Penalty::Elapsed { seconds: 754 });
        s.set_extra_if_absent("country", json!("BY"));
        s.set_extra_if_absent("country", json!("RU"));
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["country"], json!("BY"));
        assert_eq!(v["penalty"], json!("12:34"));

        let back: Standing = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn upsolving_counts_as_result() {
        let mut s = Standing::new("m");
        assert!(!s.has_any_result());
        s.problem_mut("A").upsolving_mut().result = Some(Verdict::Score(100.0));
        assert!(s.has_any_result());
        assert!(s.problems["A"].lacks_url());
    }
}
