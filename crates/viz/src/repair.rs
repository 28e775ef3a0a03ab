//! Source repairs applied to generated chart code before it runs.
//!
//! Three passes, each a plain string transformation:
//!
//! 1. [`repair_indentation`]: the first line of a function body is indented
//!    under its `function` line.
//! 2. [`repair_column_refs`]: `df["name"]` references to columns that do not
//!    exist are pointed at a column that does.
//! 3. [`inject_font_shim`]: every `plotN` routine starts by selecting
//!    CJK-capable fonts.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use sheetwise_engine::Dataset;

/// Prologue inserted at the top of every `plotN` body
pub const FONT_SHIM: &[&str] = &[
    "-- CJK-capable fonts",
    r#"plt.rc("font.sans-serif", {"Noto Sans CJK SC", "Microsoft YaHei", "PingFang SC", "SimHei"})"#,
    r#"plt.rc("axes.unicode_minus", false)"#,
];

const INDENT: usize = 4;

/// A `df[...]` reference rewritten to a different column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRepair {
    pub missing: String,
    pub replacement: String,
}

fn function_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:local\s+)?function\b|^\s*[A-Za-z_][A-Za-z0-9_.]*\s*=\s*function\b")
            .expect("static regex")
    })
}

fn plot_def_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:local\s+)?function\s+plot\d+\s*\(|^\s*plot\d+\s*=\s*function\s*\(")
            .expect("static regex")
    })
}

fn column_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"df\[\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')\s*\]"#)
            .expect("static regex")
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with("--")
}

/// Indent the line right after a function definition when it sits at or
/// left of the definition's own indent. Blank and comment lines are kept.
pub fn repair_indentation(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    let mut fixed: Vec<String> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if is_blank_or_comment(line) || function_line_re().is_match(line) {
            fixed.push(line.to_string());
            continue;
        }
        let after_def = i > 0 && function_line_re().is_match(lines[i - 1]);
        if after_def {
            let expected = indent_of(lines[i - 1]) + INDENT;
            if indent_of(line) < expected {
                fixed.push(format!("{}{}", " ".repeat(expected), line.trim_start()));
                continue;
            }
        }
        fixed.push(line.to_string());
    }

    fixed.join("\n")
}

fn lua_quote(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("df[\"{}\"]", escaped)
}

fn lua_unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Column used in place of references to missing columns: the first
/// numeric column, else the first column.
pub fn fallback_column(dataset: &Dataset) -> Option<&str> {
    dataset
        .numeric_columns()
        .first()
        .map(|&i| dataset.columns()[i].as_str())
        .or_else(|| dataset.columns().first().map(String::as_str))
}

/// Rewrite `df["missing"]` references to the fallback column.
///
/// Returns the new code and one entry per distinct missing name.
pub fn repair_column_refs(code: &str, dataset: &Dataset) -> (String, Vec<ColumnRepair>) {
    let Some(fallback) = fallback_column(dataset) else {
        return (code.to_string(), Vec::new());
    };

    let mut repairs: Vec<ColumnRepair> = Vec::new();
    let replaced = column_ref_re().replace_all(code, |caps: &regex::Captures<'_>| {
        let raw = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        let name = lua_unescape(raw);
        if dataset.column_index(&name).is_some() {
            return caps[0].to_string();
        }
        if !repairs.iter().any(|r| r.missing == name) {
            log::warn!("chart code references missing column {:?}; using {:?}", name, fallback);
            repairs.push(ColumnRepair {
                missing: name,
                replacement: fallback.to_string(),
            });
        }
        lua_quote(fallback)
    });

    (replaced.into_owned(), repairs)
}

/// Insert [`FONT_SHIM`] before the first statement of every `plotN` body.
pub fn inject_font_shim(code: &str) -> String {
    let lines: Vec<&str> = code.split('\n').collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + FONT_SHIM.len() * 5);
    let mut pending_indent: Option<usize> = None;

    for line in &lines {
        if let Some(indent) = pending_indent {
            if !is_blank_or_comment(line) {
                let pad = " ".repeat(indent);
                out.extend(FONT_SHIM.iter().map(|s| format!("{}{}", pad, s)));
                pending_indent = None;
            }
        }
        if plot_def_re().is_match(line) {
            pending_indent = Some(indent_of(line) + INDENT);
        }
        out.push(line.to_string());
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetwise_engine::Value;

    fn dataset() -> Dataset {
        Dataset::new(
            vec!["city".into(), "sales".into()],
            vec![vec!["Paris".into(), Value::Int(3)]],
        )
    }

    #[test]
    fn test_indentation_after_definition() {
        let code = "function plot1(df)\nplt.title(\"x\")\n  plt.bar({}, {})\nend";
        let fixed = repair_indentation(code);
        assert_eq!(
            fixed,
            "function plot1(df)\n    plt.title(\"x\")\n  plt.bar({}, {})\nend"
        );
    }

    #[test]
    fn test_indentation_nested_definition() {
        let code = "  local function helper()\n  return 1\n  end";
        assert_eq!(
            repair_indentation(code),
            "  local function helper()\n      return 1\n  end"
        );
    }

    #[test]
    fn test_indentation_keeps_comment_after_def() {
        let code = "function plot2(df)\n-- note\nplt.grid(true)\nend";
        // Only the line directly after the definition is considered
        assert_eq!(repair_indentation(code), code);
    }

    #[test]
    fn test_column_refs_replaced_with_first_numeric() {
        let code = r#"local a = df["revenue"]
local b = df['city']
local c = df[ "revenue" ]"#;
        let (fixed, repairs) = repair_column_refs(code, &dataset());
        assert_eq!(
            fixed,
            "local a = df[\"sales\"]\nlocal b = df['city']\nlocal c = df[\"sales\"]"
        );
        assert_eq!(
            repairs,
            vec![ColumnRepair { missing: "revenue".into(), replacement: "sales".into() }]
        );
    }

    #[test]
    fn test_column_refs_fall_back_to_first_column() {
        let ds = Dataset::new(vec!["name".into()], vec![vec!["a".into()]]);
        let (fixed, repairs) = repair_column_refs(r#"df["x"]"#, &ds);
        assert_eq!(fixed, r#"df["name"]"#);
        assert_eq!(repairs.len(), 1);
    }

    #[test]
    fn test_column_refs_without_columns_untouched() {
        let (fixed, repairs) = repair_column_refs(r#"df["x"]"#, &Dataset::default());
        assert_eq!(fixed, r#"df["x"]"#);
        assert!(repairs.is_empty());
    }

    #[test]
    fn test_font_shim_after_leading_comments() {
        let code = "function plot1(df)\n    -- bar chart\n\n    plt.title(\"t\")\nend\nfunction helper()\n    return 1\nend";
        let shimmed = inject_font_shim(code);
        let lines: Vec<&str> = shimmed.lines().collect();
        assert_eq!(lines[3], "    -- CJK-capable fonts");
        assert!(lines[4].starts_with("    plt.rc(\"font.sans-serif\""));
        assert_eq!(lines[5], "    plt.rc(\"axes.unicode_minus\", false)");
        assert_eq!(lines[6], "    plt.title(\"t\")");
        // helper is not a plot routine
        assert_eq!(shimmed.matches("axes.unicode_minus").count(), 1);
    }

    #[test]
    fn test_font_shim_every_routine() {
        let code = "function plot1(df)\n  plt.grid(true)\nend\nplot2 = function(df)\n  plt.grid(false)\nend";
        assert_eq!(inject_font_shim(code).matches("font.sans-serif").count(), 2);
    }
}
