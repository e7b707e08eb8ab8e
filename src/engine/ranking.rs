// src/engine/ranking.rs
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::consts::SCORE_EPS;
use crate::model::Standing;

fn penalty_key(row: &Standing) -> i64 {
    row.penalty.map_or(0, |p| p.key())
}

fn same_key(a: &Standing, b: &Standing) -> bool {
    (a.solving - b.solving).abs() <= SCORE_EPS && penalty_key(a) == penalty_key(b)
}

/// Order by solving (desc), then penalty (asc), then member for a stable tie order.
fn rank_order(a: &Standing, b: &Standing) -> Ordering {
    if (a.solving - b.solving).abs() > SCORE_EPS {
        return b.solving.partial_cmp(&a.solving).unwrap_or(Ordering::Equal);
    }
    penalty_key(a).cmp(&penalty_key(b)).then_with(|| a.member.cmp(&b.member))
}

/// Competition ranking: equal `(solving, penalty)` share a place, the next
/// distinct key skips ahead (1, 1, 3). Rows flagged for deletion are not placed.
pub fn assign_places(result: &mut BTreeMap<String, Standing>) {
    let mut rows: Vec<&mut Standing> = result.values_mut().filter(|r| r.action.is_none()).collect();
    rows.sort_by(|a, b| rank_order(a, b));

    let mut place = 0usize;
    for i in 0..rows.len() {
        if i == 0 || !same_key(rows[i - 1], rows[i]) {
            place = i + 1;
        }
        rows[i].place = Some(place.to_string());
    }
}

/// Member keys in rank order.
pub fn ranked_members(result: &BTreeMap<String, Standing>) -> Vec<&str> {
    let mut rows: Vec<&Standing> = result.values().collect();
    rows.sort_by(|a, b| rank_order(a, b));
    rows.into_iter().map(|r| r.member.as_str()).collect()
}
