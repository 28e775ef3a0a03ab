// Prompt construction for the three reasoning-service tasks: instruction
// driven transforms, the written analysis report and chart code generation.

use std::fmt::Write as _;

use serde_json::json;
use sheetwise_engine::dataset::ByColumn;
use sheetwise_engine::stats::{basic_stats, BasicStats, CategoricalSummary, NumericSummary};
use sheetwise_engine::Dataset;

use crate::extract::Markers;

/// Top values listed per categorical column in the transform prompt
pub const TRANSFORM_TOP_VALUES: usize = 5;
/// Columns of each kind summarized in the report prompt
pub const REPORT_STATS_COLUMNS: usize = 5;
const REPORT_SAMPLE_ROWS: usize = 5;
const REPORT_SAMPLE_COLUMNS: usize = 10;
const VIZ_STATS_COLUMNS: usize = 3;
const VIZ_SAMPLE_ROWS: usize = 3;

pub const TRANSFORM_SYSTEM: &str = "You are a data processing expert. You understand what the user \
wants done to a table and apply it exactly, returning the processed data in the requested format.";

pub const REPORT_SYSTEM: &str = "You are a professional data analyst. You find insights and value \
in data and write clear, well-structured analysis reports.";

pub const VISUALIZATION_SYSTEM: &str = "You are a data visualization expert who writes Lua chart \
code. Your code must run without errors and cope with many different datasets.";

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "null".to_string())
}

fn top_names(summary: &CategoricalSummary, n: usize) -> String {
    let names: Vec<&str> = summary.top_categories.0.iter().take(n).map(|(k, _)| k.as_str()).collect();
    format!("{:?}", names)
}

/// Fixed-width text rendering of the first rows and columns.
pub fn text_table(ds: &Dataset, max_rows: usize, max_cols: usize) -> String {
    let cols = ds.col_count().min(max_cols);
    let mut cells: Vec<Vec<String>> = Vec::new();
    cells.push(ds.columns()[..cols].to_vec());
    for row in ds.rows().iter().take(max_rows) {
        cells.push(row[..cols].iter().map(|v| v.to_string()).collect());
    }

    let widths: Vec<usize> = (0..cols)
        .map(|c| cells.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
        .collect();

    let mut out = String::new();
    for (i, row) in cells.iter().enumerate() {
        let label = if i == 0 { String::new() } else { (i - 1).to_string() };
        let _ = write!(out, "{:<4}", label);
        for (c, cell) in row.iter().enumerate() {
            let pad = widths[c].saturating_sub(cell.chars().count());
            let _ = write!(out, "  {}{}", " ".repeat(pad), cell);
        }
        out.push('\n');
    }
    out
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// ============================================================================
// Transform
// ============================================================================

pub fn transform_prompt(
    ds: &Dataset,
    instruction: &str,
    markers: &Markers,
    numeric: &ByColumn<NumericSummary>,
    categorical: &ByColumn<CategoricalSummary>,
    preview_rows: usize,
) -> String {
    let basic = basic_stats(ds);
    let dtypes = serde_json::to_value(&basic.data_types).unwrap_or_default();
    let missing: serde_json::Map<String, serde_json::Value> = basic
        .missing_values
        .0
        .iter()
        .filter(|(_, n)| *n > 0)
        .map(|(k, n)| (k.clone(), json!(n)))
        .collect();
    let top_values: serde_json::Map<String, serde_json::Value> = categorical
        .0
        .iter()
        .map(|(col, s)| {
            let top: serde_json::Map<String, serde_json::Value> = s
                .top_categories
                .0
                .iter()
                .take(TRANSFORM_TOP_VALUES)
                .map(|(k, n)| (k.clone(), json!(n)))
                .collect();
            (col.clone(), json!({ "top_values": top }))
        })
        .collect();
    let preview = serde_json::Value::Array(
        ds.head(preview_rows)
            .to_records()
            .into_iter()
            .map(serde_json::Value::Object)
            .collect(),
    );

    let mut p = String::new();
    p.push_str("I need you to process a spreadsheet table according to a user instruction.\n\n");
    p.push_str("Table details:\n");
    let _ = writeln!(p, "- Rows: {}", basic.rows);
    let _ = writeln!(p, "- Columns: {}", basic.columns);
    let _ = writeln!(p, "- Column names: {}\n", basic.column_names.join(", "));

    let _ = writeln!(p, "Column data types:\n{}\n", pretty(&dtypes));

    p.push_str("Missing values:\n");
    if missing.is_empty() {
        p.push_str("No missing values\n\n");
    } else {
        let _ = writeln!(p, "{}\n", pretty(&serde_json::Value::Object(missing)));
    }

    p.push_str("Numeric column statistics:\n");
    if numeric.is_empty() {
        p.push_str("No numeric columns\n\n");
    } else {
        let _ = writeln!(p, "{}\n", pretty(&serde_json::to_value(numeric).unwrap_or_default()));
    }

    p.push_str("Most common values of categorical columns:\n");
    if top_values.is_empty() {
        p.push_str("No categorical columns\n\n");
    } else {
        let _ = writeln!(p, "{}\n", pretty(&serde_json::Value::Object(top_values)));
    }

    let _ = writeln!(p, "Data preview (first {} rows):\n{}\n", preview_rows, pretty(&preview));
    let _ = writeln!(p, "The user's instruction is: {}\n", instruction);

    let _ = write!(
        p,
        r#"Process the data and return the modified result. Your reply must follow this format exactly.

The first part of the reply is:
{explanation}
Describe your approach, the concrete steps you took and how the data changed.

The second part of the reply is:
{results}
Only a JSON array goes here, in this shape:
[
  {{"column1": "value1", "column2": "value2", ...}},
  {{"column1": "value1", "column2": "value2", ...}}
]

Do not add any other text, comments or Markdown markers (such as ```json). The JSON array must parse with a standard JSON parser as-is.

When processing the data:
1. Transform the data meaningfully according to the instruction; do not simply copy it
2. Sort, filter or compute new columns as the instruction requires
3. Keep non-English text intact
4. Convert every date value to a string such as "2023-01-01"
5. Wrap all column names and text values in double quotes; numbers may be unquoted
6. Do not put comments, markers or notes before or after the JSON

Example of the expected output:
{explanation}
I processed the data as instructed...

{results}
[
  {{"name": "Alice", "age": 30}},
  {{"name": "Bob", "age": 25}}
]
"#,
        explanation = markers.explanation,
        results = markers.results,
    );
    p
}

// ============================================================================
// Analysis report
// ============================================================================

pub fn report_prompt(
    ds: &Dataset,
    basic: &BasicStats,
    numeric: &ByColumn<NumericSummary>,
    categorical: &ByColumn<CategoricalSummary>,
) -> String {
    let mut summary = String::new();
    let names = &basic.column_names;
    let shown: Vec<&str> = names.iter().take(REPORT_SAMPLE_COLUMNS).map(String::as_str).collect();
    let _ = writeln!(summary, "Overview:");
    let _ = writeln!(summary, "- Total rows: {}", basic.rows);
    let _ = writeln!(summary, "- Total columns: {}", basic.columns);
    let _ = writeln!(
        summary,
        "- Column names: {}{}",
        shown.join(", "),
        if names.len() > REPORT_SAMPLE_COLUMNS { "..." } else { "" }
    );

    summary.push_str("\nNumeric columns:\n");
    for (col, s) in numeric.0.iter().take(REPORT_STATS_COLUMNS) {
        let _ = writeln!(
            summary,
            "- {}: mean={}, median={}, min={}, max={}, std={}",
            col,
            fmt_opt(s.mean),
            fmt_opt(s.median),
            fmt_opt(s.min),
            fmt_opt(s.max),
            fmt_opt(s.std)
        );
    }

    summary.push_str("\nCategorical columns:\n");
    for (col, s) in categorical.0.iter().take(REPORT_STATS_COLUMNS) {
        let _ = writeln!(
            summary,
            "- {}: unique values={}, main categories={}",
            col,
            s.unique_values,
            top_names(s, 3)
        );
    }

    let _ = write!(
        summary,
        "\nSample (first {} rows):\n{}",
        REPORT_SAMPLE_ROWS,
        text_table(ds, REPORT_SAMPLE_ROWS, REPORT_SAMPLE_COLUMNS)
    );

    format!(
        r#"As a professional data analyst, write an in-depth analysis report based on the data below.
The report must cover at least:

1. Data overview (size, types and basic structure)
2. Key insights and findings (main characteristics and patterns)
3. Potential issues (data quality problems, outliers and so on)
4. Concrete recommendations (how to use this data for decisions or further analysis)
5. The value of this data and a longer-term outlook

Data information:
{summary}
Make the report professional, insightful and structured for easy reading, with actionable recommendations. Use Markdown headings and lists.
"#
    )
}

// ============================================================================
// Visualization code
// ============================================================================

/// The chart API as described to the model.
pub const LUA_CHART_API: &str = r#"Globals available to your code:
- df: table mapping column name -> array of values. Numeric columns hold numbers (missing = NaN,
  test with `v ~= v`); other columns hold strings (missing = "").
- dataset: { rows = <count>, columns = {...}, numeric = {...}, categorical = {...} }
- stats.numbers(t) -> array without NaN/missing values
- stats.sum(t), stats.mean(t), stats.median(t), stats.std(t), stats.min(t), stats.max(t)
  (mean/median/std/min/max return nil for empty input)
- stats.counts(t [, top_n]) -> labels, counts (most frequent first)
- stats.unique(t) -> distinct values in first-seen order
- stats.group_sum(keys, values), stats.group_mean(keys, values) -> labels, aggregates
- plt.title(s), plt.xlabel(s), plt.ylabel(s), plt.legend(), plt.grid(on)
- plt.bar(labels, values [, {label = "..."}])
- plt.plot(y) or plt.plot(x, y [, {label = "..."}])
- plt.scatter(x, y [, {label = "..."}])
- plt.hist(values [, bins])
- plt.pie(values, labels)
- plt.boxplot({values1, values2, ...}, labels)
- plt.rc(key, value)
There is no os, io, require or load. Each plotN function draws exactly one chart."#;

pub fn visualization_prompt(
    ds: &Dataset,
    numeric: &ByColumn<NumericSummary>,
    categorical: &ByColumn<CategoricalSummary>,
    max_routines: usize,
) -> String {
    let basic = basic_stats(ds);
    let mut desc = String::new();
    let _ = writeln!(desc, "Total rows: {}", basic.rows);
    let _ = writeln!(desc, "Total columns: {}", basic.columns);
    desc.push_str("Columns and data types:\n");
    for (col, dtype) in &basic.data_types.0 {
        let _ = writeln!(desc, "- {}: {}", col, dtype);
    }

    let missing: Vec<&(String, usize)> = basic.missing_values.0.iter().filter(|(_, n)| *n > 0).collect();
    if !missing.is_empty() {
        desc.push_str("\nMissing values:\n");
        for (col, n) in missing {
            let pct = *n as f64 / basic.rows.max(1) as f64 * 100.0;
            let _ = writeln!(desc, "- {}: {} missing ({:.2}%)", col, n, pct);
        }
    }

    if !numeric.is_empty() {
        let names: Vec<&str> = numeric.0.iter().map(|(k, _)| k.as_str()).collect();
        let _ = writeln!(desc, "\nNumeric columns: {}", names.join(", "));
        for (col, s) in numeric.0.iter().take(VIZ_STATS_COLUMNS) {
            let _ = writeln!(
                desc,
                "- {} - mean: {}, median: {}, min: {}, max: {}, std: {}",
                col,
                fmt_opt(s.mean),
                fmt_opt(s.median),
                fmt_opt(s.min),
                fmt_opt(s.max),
                fmt_opt(s.std)
            );
        }
    }

    if !categorical.is_empty() {
        let names: Vec<&str> = categorical.0.iter().map(|(k, _)| k.as_str()).collect();
        let _ = writeln!(desc, "\nCategorical columns: {}", names.join(", "));
        for (col, s) in categorical.0.iter().take(VIZ_STATS_COLUMNS) {
            let _ = writeln!(
                desc,
                "- {} - unique values: {}, main categories: {}",
                col,
                s.unique_values,
                top_names(s, 3)
            );
        }
    }

    let _ = write!(
        desc,
        "\nSample (first {} rows):\n{}",
        VIZ_SAMPLE_ROWS,
        text_table(ds, VIZ_SAMPLE_ROWS, usize::MAX)
    );

    let names: Vec<String> = (1..=max_routines).map(|i| format!("plot{}", i)).collect();
    format!(
        r#"Write Lua code for {n} different charts of the following data.

Data description:
{desc}
{api}

Requirements:
1. Write {n} different charts, each showing a different aspect of the data
2. Define them as global functions named {names}, each taking one argument `df`
3. Give every chart a title and axis labels
4. Every chart should provide a useful insight into the data
5. Handle missing values (use stats.numbers or skip NaN and "" entries)
6. Chart types may include bar, line, scatter, histogram, pie and box plots
7. Only reference columns that exist in the data description
8. Use correct indentation inside every function body
9. Add short comments explaining what each chart shows

Start every plotN body with:
```lua
plt.rc("font.sans-serif", {{"Noto Sans CJK SC", "Microsoft YaHei", "PingFang SC", "SimHei"}})
plt.rc("axes.unicode_minus", false)
```

Return only the Lua code, in a single ```lua block, with no explanatory text.
"#,
        n = max_routines,
        names = names.join(", "),
        desc = desc,
        api = LUA_CHART_API,
    )
}
