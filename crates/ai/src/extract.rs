//! Recover a table of rows from free-form model output.
//!
//! Strategies are pure functions tried in a fixed order; the first one that
//! yields a non-empty array of JSON objects wins:
//!
//! 1. [`marker_strategy`]: the array follows the results marker.
//! 2. [`bracket_scan`]: a `[{...}]`-shaped substring anywhere in the text.
//! 3. [`fenced_code_scan`]: the contents of a fenced code block.
//! 4. [`whole_response`]: the entire text parses as an array.
//!
//! Rows are sanitized after extraction: ISO date-times are reformatted and
//! nested values become their JSON text.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sheetwise_engine::value::DATETIME_FORMAT;

pub const DEFAULT_MAX_ROWS: usize = 1000;

pub type Row = Map<String, Value>;

/// Section markers the transform prompt asks the model to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub explanation: String,
    pub results: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            explanation: "=== EXPLANATION ===".to_string(),
            results: "=== PROCESSED DATA ===".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Marker,
    BracketScan,
    FencedCode,
    WholeResponse,
}

/// Rows found by one strategy and the text left over as explanation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub rows: Vec<Row>,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub rows: Vec<Row>,
    pub explanation: String,
    pub strategy: Option<Strategy>,
}

type StrategyFn = fn(&str, &Markers) -> Option<Candidate>;

const STRATEGIES: &[(Strategy, StrategyFn)] = &[
    (Strategy::Marker, marker_strategy),
    (Strategy::BracketScan, bracket_scan),
    (Strategy::FencedCode, fenced_code_scan),
    (Strategy::WholeResponse, whole_response),
];

/// Run the strategy chain over `response`.
pub fn extract(response: &str, markers: &Markers, max_rows: usize) -> ExtractionResult {
    for (strategy, run) in STRATEGIES {
        if let Some(candidate) = run(response, markers) {
            let total = candidate.rows.len();
            let mut rows: Vec<Row> = candidate.rows.into_iter().map(sanitize_row).collect();
            if rows.len() > max_rows {
                log::info!("truncating extracted rows from {} to {}", total, max_rows);
                rows.truncate(max_rows);
            }
            log::debug!("extracted {} rows via {:?}", rows.len(), strategy);
            return ExtractionResult {
                success: true,
                rows,
                explanation: candidate.explanation,
                strategy: Some(*strategy),
            };
        }
    }

    log::warn!("no structured rows found in a {}-byte response", response.len());
    ExtractionResult {
        success: false,
        rows: Vec::new(),
        explanation: salvage_explanation(response),
        strategy: None,
    }
}

/// Parse `text` as a non-empty JSON array whose elements are all objects.
pub fn parse_rows(text: &str) -> Option<Vec<Row>> {
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) else {
        return None;
    };
    if items.is_empty() {
        return None;
    }
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Text before the first `[`, or the whole response when there is none.
pub fn salvage_explanation(response: &str) -> String {
    match response.find('[') {
        Some(idx) => response[..idx].trim().to_string(),
        None => response.trim().to_string(),
    }
}

fn fence_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z]*\s*").expect("static regex"))
}

fn fence_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*```$").expect("static regex"))
}

fn greedy_array_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("static regex"))
}

fn fenced_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```([A-Za-z]*)\s*(.*?)\s*```").expect("static regex"))
}

// ============================================================================
// Strategies
// ============================================================================

/// Array after the results marker, up to the next results marker.
pub fn marker_strategy(text: &str, markers: &Markers) -> Option<Candidate> {
    if markers.results.is_empty() {
        return None;
    }
    let mut parts = text.split(markers.results.as_str());
    let before = parts.next()?;
    let section = parts.next()?.trim();

    let section = fence_open_re().replace(section, "");
    let section = fence_close_re().replace(&section, "");
    let rows = parse_rows(&section)?;

    let mut explanation = before.trim();
    if !markers.explanation.is_empty() {
        if let Some((_, after)) = explanation.split_once(markers.explanation.as_str()) {
            explanation = after.trim();
        }
    }
    Some(Candidate {
        rows,
        explanation: explanation.to_string(),
    })
}

/// Start offsets of `[` that open an array of objects.
fn array_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.match_indices('[').map(|(i, _)| i).filter(move |&i| {
        text[i + 1..].trim_start().starts_with('{')
    })
}

/// End offset (exclusive) of the bracketed value starting at `start`,
/// skipping brackets inside JSON strings.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn remove_span(text: &str, start: usize, end: usize) -> String {
    format!("{}{}", &text[..start], &text[end..]).trim().to_string()
}

/// First `[{...}]` substring that parses, in order of appearance.
///
/// The widest match is tried first, then each balanced array on its own.
pub fn bracket_scan(text: &str, _markers: &Markers) -> Option<Candidate> {
    let greedy = greedy_array_re().find_iter(text).map(|m| (m.start(), m.end()));
    let balanced = array_starts(text).filter_map(|s| balanced_end(text, s).map(|e| (s, e)));

    greedy.chain(balanced).find_map(|(start, end)| {
        parse_rows(&text[start..end]).map(|rows| Candidate {
            rows,
            explanation: remove_span(text, start, end),
        })
    })
}

/// Contents of the first fenced block that parses.
pub fn fenced_code_scan(text: &str, _markers: &Markers) -> Option<Candidate> {
    fenced_block_re().captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        let rows = parse_rows(caps.get(2)?.as_str())?;
        Some(Candidate {
            rows,
            explanation: remove_span(text, whole.start(), whole.end()),
        })
    })
}

pub fn whole_response(text: &str, _markers: &Markers) -> Option<Candidate> {
    parse_rows(text).map(|rows| Candidate {
        rows,
        explanation: String::new(),
    })
}

// ============================================================================
// Sanitation
// ============================================================================

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 date-time. Plain dates are not date-times.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    // Cheap shape check before trying formats
    let bytes = s.as_bytes();
    if bytes.len() < 16 || bytes[4] != b'-' || bytes[7] != b'-' || !matches!(bytes[10], b'T' | b' ') {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => match parse_datetime(&s) {
            Some(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            None => Value::String(s),
        },
        Value::Array(_) | Value::Object(_) => Value::String(value.to_string()),
        other => other,
    }
}

pub fn sanitize_row(row: Row) -> Row {
    row.into_iter().map(|(k, v)| (k, sanitize_value(v))).collect()
}

/// Body of the first ```` ```lang ```` block, else the whole trimmed response.
pub fn extract_code_block(response: &str, lang: &str) -> String {
    fenced_block_re()
        .captures_iter(response)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(lang)))
        .or_else(|| fenced_block_re().captures(response))
        .and_then(|caps| caps.get(2).map(|m| m.as_str().trim().to_string()))
        .unwrap_or_else(|| response.trim().to_string())
}
