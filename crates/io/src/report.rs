// Analysis artifacts: the multi-sheet analysis workbook and the standalone
// HTML report.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use pulldown_cmark::{html, Event, Options, Parser};
use sheetwise_engine::{Dataset, Value};

use crate::error::IoError;
use crate::xlsx;

/// Rows of the preview sheet in the analysis workbook
pub const WORKBOOK_PREVIEW_ROWS: usize = 100;

/// Metric/value pairs shown in the stats sheet and the report's stats table.
///
/// Takes serialized basic statistics (`rows`, `columns`, `dataTypes`).
pub fn summary_rows(basic_stats: &serde_json::Value) -> Vec<(String, String)> {
    let count = |key: &str| basic_stats.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
    let dtypes: Vec<&str> = basic_stats
        .get("dataTypes")
        .and_then(|v| v.as_object())
        .map(|m| m.values().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();
    let numeric = dtypes.iter().filter(|t| matches!(**t, "int64" | "float64")).count();
    let categorical = dtypes.iter().filter(|t| **t == "object").count();

    vec![
        ("Total rows".to_string(), count("rows").to_string()),
        ("Total columns".to_string(), count("columns").to_string()),
        ("Numeric columns".to_string(), numeric.to_string()),
        ("Categorical columns".to_string(), categorical.to_string()),
    ]
}

/// Everything the analysis workbook holds.
pub struct AnalysisWorkbook<'a> {
    pub dataset: &'a Dataset,
    pub stats: &'a [(String, String)],
    pub report: &'a str,
    pub code: &'a str,
}

pub fn write_analysis_workbook(book: &AnalysisWorkbook<'_>, path: &Path) -> Result<(), IoError> {
    let preview = book.dataset.head(WORKBOOK_PREVIEW_ROWS);
    let stats = Dataset::new(
        vec!["Metric".to_string(), "Value".to_string()],
        book.stats
            .iter()
            .map(|(k, v)| vec![Value::Text(k.clone()), Value::Text(v.clone())])
            .collect(),
    );
    let report = single_cell("Analysis Report", book.report);
    let code = single_cell("Visualization Code", book.code);

    xlsx::write_sheets(
        &[
            ("Data Preview", &preview),
            ("Basic Stats", &stats),
            ("Analysis Report", &report),
            ("Visualization Code", &code),
        ],
        path,
    )
}

fn single_cell(header: &str, text: &str) -> Dataset {
    Dataset::new(vec![header.to_string()], vec![vec![Value::Text(text.to_string())]])
}

// ============================================================================
// HTML report
// ============================================================================

pub struct ReportContent<'a> {
    /// Name of the analyzed file
    pub title: &'a str,
    pub generated_at: &'a str,
    pub stats: &'a [(String, String)],
    pub preview: &'a Dataset,
    /// Markdown text from the reasoning service
    pub report: &'a str,
    /// Base64-encoded PNG charts, in order
    pub images: &'a [String],
}

pub fn write_html_report(content: &ReportContent<'_>, path: &Path) -> Result<(), IoError> {
    fs::write(path, render_html(content))
        .map_err(|e| IoError::Io(format!("Failed to write report: {}", e)))
}

pub fn render_html(content: &ReportContent<'_>) -> String {
    let mut out = String::with_capacity(16 * 1024);
    let title = escape_html(content.title);

    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Analysis report: {title}</title>
<style>
body {{ font-family: -apple-system, "Segoe UI", "Noto Sans CJK SC", sans-serif; margin: 2rem auto; max-width: 1100px; color: #222; }}
h1 {{ border-bottom: 2px solid #3b82f6; padding-bottom: .4rem; }}
table {{ border-collapse: collapse; margin: 1rem 0; font-size: .9rem; }}
th, td {{ border: 1px solid #ddd; padding: .35rem .6rem; text-align: left; }}
th {{ background: #f3f4f6; }}
.preview {{ overflow-x: auto; }}
.gallery img {{ max-width: 100%; margin: 1rem 0; border: 1px solid #eee; }}
</style>
</head>
<body>
<h1>Analysis report: {title}</h1>
<p>Generated {generated}</p>
"#,
        title = title,
        generated = escape_html(content.generated_at),
    );

    out.push_str("<h2>Basic statistics</h2>\n<table>\n<tr><th>Metric</th><th>Value</th></tr>\n");
    for (metric, value) in content.stats {
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td>{}</td></tr>",
            escape_html(metric),
            escape_html(value)
        );
    }
    out.push_str("</table>\n");

    out.push_str("<h2>Data preview</h2>\n<div class=\"preview\">\n");
    push_table(&mut out, content.preview);
    out.push_str("</div>\n");

    out.push_str("<h2>Findings</h2>\n<div class=\"report\">\n");
    out.push_str(&markdown_to_html(content.report));
    out.push_str("</div>\n");

    if !content.images.is_empty() {
        out.push_str("<h2>Charts</h2>\n<div class=\"gallery\">\n");
        for (i, image) in content.images.iter().enumerate() {
            let _ = writeln!(
                out,
                "<img src=\"data:image/png;base64,{}\" alt=\"Chart {}\">",
                image,
                i + 1
            );
        }
        out.push_str("</div>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}

fn push_table(out: &mut String, dataset: &Dataset) {
    out.push_str("<table>\n<tr>");
    for column in dataset.columns() {
        let _ = write!(out, "<th>{}</th>", escape_html(column));
    }
    out.push_str("</tr>\n");
    for row in dataset.rows() {
        out.push_str("<tr>");
        for value in row {
            let _ = write!(out, "<td>{}</td>", escape_html(&value.to_string()));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}

/// Render report markdown. Raw HTML in the source is shown as text.
pub fn markdown_to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, Options::ENABLE_TABLES).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto, Reader};
    use serde_json::json;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["city".into(), "sales".into()],
            vec![vec!["<Paris>".into(), Value::Int(3)]],
        )
    }

    #[test]
    fn test_summary_rows_from_basic_stats() {
        let stats = json!({
            "rows": 3,
            "columns": 3,
            "dataTypes": {"a": "int64", "b": "object", "c": "float64"}
        });
        let rows = summary_rows(&stats);
        assert_eq!(rows[0], ("Total rows".to_string(), "3".to_string()));
        assert_eq!(rows[2].1, "2");
        assert_eq!(rows[3].1, "1");
    }

    #[test]
    fn test_markdown_rendering_escapes_raw_html() {
        let html = markdown_to_html("**Trend** is up\n\n- one\n- two\n\n<script>x</script>");
        assert!(html.contains("<strong>Trend</strong>"));
        assert!(html.contains("<li>one</li>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_render_html_sections() {
        let ds = dataset();
        let stats = vec![("Total rows".to_string(), "1".to_string())];
        let images = vec!["iVBORw0KGgo=".to_string()];
        let html = render_html(&ReportContent {
            title: "sales.xlsx",
            generated_at: "2025-01-01 00:00:00",
            stats: &stats,
            preview: &ds,
            report: "All good",
            images: &images,
        });
        assert!(html.contains("<td>&lt;Paris&gt;</td>"));
        assert!(html.contains("<td>Total rows</td><td>1</td>"));
        assert!(html.contains("data:image/png;base64,iVBORw0KGgo="));
        assert!(html.contains("<p>All good</p>"));
    }

    #[test]
    fn test_write_analysis_workbook_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_x.xlsx");
        let ds = dataset();
        let stats = summary_rows(&json!({"rows": 1, "columns": 2}));
        write_analysis_workbook(
            &AnalysisWorkbook {
                dataset: &ds,
                stats: &stats,
                report: "report text",
                code: "function plot1(df) end",
            },
            &path,
        )
        .unwrap();

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(
            workbook.sheet_names(),
            vec!["Data Preview", "Basic Stats", "Analysis Report", "Visualization Code"]
        );
    }
}
