// src/adapters/cells.rs
// Problem-cell text shared by the table adapters.

use crate::core::sanitize::parse_clock;
use crate::model::{ProblemResult, Verdict};

/// `"+0"`/`"+"` accepted, `"+N"` accepted after N failures, `"-N"` rejected after N,
/// digits a score; an optional second token is the submission time. Blank or
/// unrecognized text yields `None`.
pub fn parse_problem_cell(text: &str) -> Option<ProblemResult> {
    let text = text.trim();
    let (point, time) = match text.split_once(char::is_whitespace) {
        Some((p, t)) => (p, Some(t.trim())),
        None => (text, None),
    };

    let result = if point.contains('+') || point.contains('-') {
        point.parse::<Verdict>().ok()?
    } else if !point.is_empty() && point.chars().all(|c| c.is_ascii_digit()) {
        Verdict::Score(point.parse().ok()?)
    } else {
        return None;
    };

    let mut p = ProblemResult::with_result(result);
    if let Some(t) = time.filter(|t| !t.is_empty()) {
        match parse_clock(t) {
            Some(secs) => p.set_elapsed(secs),
            None => p.time = Some(s!(t)),
        }
    }
    Some(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_and_scores() {
        assert_eq!(parse_problem_cell("+0").unwrap().result, Some(Verdict::Accepted { failures: 0 }));
        assert_eq!(parse_problem_cell("+2").unwrap().result, Some(Verdict::Accepted { failures: 2 }));
        assert_eq!(parse_problem_cell("-3").unwrap().result, Some(Verdict::Rejected { failures: 3 }));
        assert_eq!(parse_problem_cell("100").unwrap().result, Some(Verdict::Score(100.0)));
    }

    #[test]
    fn trailing_time_token() {
        let p = parse_problem_cell("+1 01:05").unwrap();
        assert_eq!(p.result, Some(Verdict::Accepted { failures: 1 }));
        assert_eq!(p.time_in_seconds, Some(65));
        assert_eq!(p.time.as_deref(), Some("1:05"));
    }

    #[test]
    fn blanks_produce_nothing() {
        assert!(parse_problem_cell("").is_none());
        assert!(parse_problem_cell("   ").is_none());
        assert!(parse_problem_cell("n/a").is_none());
        assert!(parse_problem_cell("+?").is_none());
    }
}
