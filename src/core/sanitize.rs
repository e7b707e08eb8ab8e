// src/core/sanitize.rs

/// Collapse runs of whitespace (including nbsp) into one space and trim.
pub fn normalize_ws(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() || ch == '\u{a0}' {
            if !prev_space { out.push(' '); prev_space = true; }
        } else { out.push(ch); prev_space = false; }
    }
    out.trim().to_string()
}

/// `"1,234.5"` → 1234.5. Thousands separators are dropped.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '\u{a0}').collect();
    if cleaned.is_empty() { return None; }
    cleaned.parse::<f64>().ok()
}

pub fn is_integer(s: &str) -> bool {
    let t = s.strip_prefix('-').unwrap_or(s);
    !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

/// Seconds → `m:ss` (minutes are not wrapped into hours).
pub fn format_clock(seconds: i64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Inverse of `format_clock`; also accepts `h:mm:ss`.
pub fn parse_clock(s: &str) -> Option<i64> {
    let mut total = 0i64;
    let mut parts = 0;
    for part in s.trim().split(':') {
        let v: i64 = part.parse().ok()?;
        total = total.checked_mul(60)?.checked_add(v)?;
        parts += 1;
    }
    if parts < 2 { None } else { Some(total) }
}

/// First whitespace-separated word; `"A - Frog"` → `"A"`.
pub fn first_word(s: &str) -> &str {
    s.split_whitespace().next().unwrap_or("")
}

/// Last path segment of a link: `/users/tourist` → `tourist`.
pub fn last_segment(href: &str) -> &str {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}
