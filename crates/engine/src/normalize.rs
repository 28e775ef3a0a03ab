// Grid normalization: header-depth detection, composite column naming,
// and cleanup into a Dataset.
//
// Pure functions. Reading and writing workbooks happens in sheetwise-io.

use serde::Serialize;

use crate::dataset::Dataset;
use crate::grid::Grid;
use crate::value::Value;

/// Default fraction of empty cells at which a row counts as header-like.
pub const DEFAULT_EMPTY_RATIO_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// Rows with an empty fraction at or above this are header-like.
    pub empty_ratio_threshold: f64,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self { empty_ratio_threshold: DEFAULT_EMPTY_RATIO_THRESHOLD }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeSummary {
    pub unmerged_cells: usize,
    pub header_rows_detected: usize,
    pub total_rows: usize,
    pub total_cols: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub dataset: Dataset,
    pub summary: NormalizeSummary,
}

/// Fraction of empty cells in a row, over the grid width.
pub fn empty_ratio(row: &[Value]) -> f64 {
    if row.is_empty() {
        return 1.0;
    }
    row.iter().filter(|v| v.is_empty()).count() as f64 / row.len() as f64
}

/// Count the leading run of header-like rows.
///
/// Stops at the first row whose empty fraction is below the threshold; that
/// row and everything after it is data.
pub fn detect_header_depth(rows: &[Vec<Value>], threshold: f64) -> usize {
    rows.iter()
        .take_while(|row| empty_ratio(row) >= threshold)
        .count()
}

/// True for tokens left behind by blank header cells.
fn is_placeholder_token(token: &str) -> bool {
    if token.eq_ignore_ascii_case("nan") {
        return true;
    }
    // "Unnamed: 3" arrives as two tokens; "Unnamed:" alone is caught here,
    // the numeric tail is handled by the caller.
    token == "Unnamed:" || token.starts_with("Unnamed:")
}

fn is_positional_tail(token: &str) -> bool {
    let mut parts = token.splitn(2, "_level_");
    let head = parts.next().unwrap_or("");
    let head_ok = !head.is_empty() && head.chars().all(|c| c.is_ascii_digit());
    match parts.next() {
        Some(level) => head_ok && !level.is_empty() && level.chars().all(|c| c.is_ascii_digit()),
        None => head_ok,
    }
}

/// Remove placeholder tokens ("nan", "Unnamed: N", "Unnamed: N_level_M")
/// and collapse whitespace.
pub fn strip_placeholders(name: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut after_unnamed = false;
    for token in name.split_whitespace() {
        if after_unnamed {
            after_unnamed = false;
            if is_positional_tail(token) {
                continue;
            }
        }
        if is_placeholder_token(token) {
            after_unnamed = token == "Unnamed:";
            continue;
        }
        kept.push(token);
    }
    kept.join(" ")
}

/// Join each column's header cells with a space and clean the result.
///
/// Blank results fall back to `Column N`; duplicates gain `.1`, `.2` suffixes.
pub fn composite_names(header_rows: &[Vec<Value>], width: usize) -> Vec<String> {
    let raw: Vec<String> = (0..width)
        .map(|col| {
            let joined = header_rows
                .iter()
                .map(|row| row.get(col).map(|v| v.to_string()).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" ");
            strip_placeholders(&joined)
        })
        .collect();

    dedupe_names(raw)
}

fn dedupe_names(raw: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for (i, name) in raw.into_iter().enumerate() {
        let base = if name.is_empty() { format!("Column {}", i + 1) } else { name };
        let mut candidate = base.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

/// Interpret a flat (merge-free) grid as a dataset.
///
/// Returns the dataset and the detected header depth. Depth 0 uses the
/// first row alone as the header.
pub fn tabulate(grid: &Grid, opts: &NormalizeOptions) -> (Dataset, usize) {
    let rows = grid.rows();
    let width = grid.width();
    if rows.is_empty() || width == 0 {
        return (Dataset::default(), 0);
    }

    let depth = detect_header_depth(rows, opts.empty_ratio_threshold);
    let header_len = depth.max(1);
    let columns = composite_names(&rows[..header_len.min(rows.len())], width);
    let data: Vec<Vec<Value>> = rows.iter().skip(header_len).cloned().collect();

    let mut dataset = Dataset::new(columns, data);
    dataset.drop_empty_rows();
    (dataset, depth)
}

/// Resolve merges and tabulate in one pass, without any persistence step.
pub fn normalize_grid(mut grid: Grid, opts: &NormalizeOptions) -> Normalized {
    let unmerged = grid.resolve_merges();
    let (dataset, depth) = tabulate(&grid, opts);
    let summary = NormalizeSummary {
        unmerged_cells: unmerged,
        header_rows_detected: depth,
        total_rows: dataset.row_count(),
        total_cols: dataset.col_count(),
    };
    Normalized { dataset, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MergeRange;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_header_depth_counts_sparse_leading_rows() {
        let rows = vec![
            vec![text("Q1"), Value::Null, Value::Null, Value::Null, Value::Null],
            vec![text("a"), text("b"), Value::Null, Value::Null, Value::Null],
            vec![text("x"), text("y"), text("z"), text("w"), Value::Null],
            vec![Value::Null, Value::Null, Value::Null, Value::Null, Value::Null],
        ];
        // row 1 is exactly 60% empty, still header-like
        assert_eq!(detect_header_depth(&rows, 0.4), 2);
    }

    #[test]
    fn test_header_depth_zero_when_first_row_dense() {
        let rows = vec![
            vec![text("a"), text("b"), text("c")],
            vec![Value::Null, Value::Null, Value::Null],
        ];
        assert_eq!(detect_header_depth(&rows, 0.4), 0);
    }

    #[test]
    fn test_header_depth_threshold_boundary() {
        // 2 of 5 empty = exactly 0.4
        let row = vec![text("a"), text("b"), text("c"), Value::Null, Value::Null];
        assert_eq!(detect_header_depth(&[row.clone()], 0.4), 1);
        assert_eq!(detect_header_depth(&[row], 0.41), 0);
    }

    #[test]
    fn test_strip_placeholders() {
        assert_eq!(strip_placeholders("Sales nan"), "Sales");
        assert_eq!(strip_placeholders("Unnamed: 0 Region"), "Region");
        assert_eq!(strip_placeholders("Unnamed: 2_level_1 Total"), "Total");
        assert_eq!(strip_placeholders("  nan   nan "), "");
        // whole tokens only
        assert_eq!(strip_placeholders("Financial Year"), "Financial Year");
        assert_eq!(strip_placeholders("Unnamed: Total"), "Total");
    }

    #[test]
    fn test_composite_names_join_and_fallback() {
        let header = vec![
            vec![text("Region"), text("Region"), Value::Null],
            vec![text("North"), text("South"), Value::Null],
        ];
        let names = composite_names(&header, 3);
        assert_eq!(names, vec!["Region North", "Region South", "Column 3"]);
    }

    #[test]
    fn test_composite_names_dedupe() {
        let header = vec![vec![text("A"), text("A"), text("A")]];
        assert_eq!(composite_names(&header, 3), vec!["A", "A.1", "A.2"]);
    }

    #[test]
    fn test_names_never_contain_placeholders() {
        let header = vec![
            vec![text("nan"), Value::Null, text("Unnamed: 4")],
            vec![Value::Null, text("Amount"), Value::Null],
        ];
        for name in composite_names(&header, 3) {
            assert!(!name.contains("nan"), "{}", name);
            assert!(!name.contains("Unnamed"), "{}", name);
        }
    }

    #[test]
    fn test_tabulate_single_header_row() {
        let grid = Grid::new(vec![
            vec![text("id"), text("name")],
            vec![Value::Int(1), text("a")],
            vec![Value::Null, Value::Null],
            vec![Value::Int(2), text("b")],
        ]);
        let (ds, depth) = tabulate(&grid, &NormalizeOptions::default());
        assert_eq!(depth, 0);
        assert_eq!(ds.columns(), &["id", "name"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows()[1][0], Value::Int(2));
    }

    #[test]
    fn test_normalize_grid_merged_header_row() {
        let grid = Grid::new(vec![
            vec![text("Region"), Value::Null, Value::Null, text("Note")],
            vec![text("North"), text("South"), text("East"), Value::Null],
            vec![Value::Int(1), Value::Int(2), Value::Int(3), text("ok")],
            vec![Value::Int(4), Value::Int(5), Value::Int(6), Value::Null],
        ])
        .with_merges(vec![MergeRange::parse("A1:C1").unwrap()]);

        let out = normalize_grid(grid, &NormalizeOptions::default());
        // row 0 after merge fill: 0/4 empty -> dense, so the single header row is used
        assert_eq!(out.summary.unmerged_cells, 3);
        assert_eq!(out.summary.header_rows_detected, 0);
        assert_eq!(out.dataset.columns(), &["Region", "Region.1", "Region.2", "Note"]);
        assert_eq!(out.summary.total_rows, 3);
        assert_eq!(out.summary.total_cols, 4);
    }

    #[test]
    fn test_normalize_grid_sparse_title_rows() {
        let grid = Grid::new(vec![
            vec![text("Report"), Value::Null, Value::Null, Value::Null],
            vec![text("Year"), text("Amount"), Value::Null, Value::Null],
            vec![Value::Int(2023), Value::Float(10.5), text("x"), text("y")],
        ]);
        let out = normalize_grid(grid, &NormalizeOptions::default());
        assert_eq!(out.summary.header_rows_detected, 2);
        assert_eq!(out.dataset.columns(), &["Report Year", "Amount", "Column 3", "Column 4"]);
        assert_eq!(out.dataset.row_count(), 1);
    }

    #[test]
    fn test_tabulate_empty_grid() {
        let (ds, depth) = tabulate(&Grid::default(), &NormalizeOptions::default());
        assert_eq!(depth, 0);
        assert_eq!(ds.col_count(), 0);
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let s = NormalizeSummary { unmerged_cells: 3, header_rows_detected: 1, total_rows: 2, total_cols: 4 };
        let json = serde_json::to_value(s).unwrap();
        assert_eq!(json["unmergedCells"], 3);
        assert_eq!(json["headerRowsDetected"], 1);
    }
}
