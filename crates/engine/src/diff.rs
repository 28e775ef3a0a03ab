// Change summary between an original dataset and a transformed one.
// Pure functions: two datasets in, a bounded summary out.

use serde::Serialize;

use crate::dataset::Dataset;
use crate::value::{Incomparable, Value};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

pub const DEFAULT_SAMPLE_ROWS: usize = 100;
pub const DEFAULT_MAX_MODIFIED: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Leading rows compared per common column.
    pub sample_rows: usize,
    /// Cap on reported modified columns.
    pub max_modified: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_modified: DEFAULT_MAX_MODIFIED,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub added_columns: Vec<String>,
    pub removed_columns: Vec<String>,
    pub modified_columns: Vec<String>,
    pub row_count_before: usize,
    pub row_count_after: usize,
    pub has_changes: bool,
}

// ---------------------------------------------------------------------------
// Summarize
// ---------------------------------------------------------------------------

/// Compare columns and a leading sample of values.
///
/// Differences past the sample window are not detected.
pub fn summarize(original: &Dataset, transformed: &Dataset, opts: &DiffOptions) -> DiffSummary {
    let added_columns: Vec<String> = transformed
        .columns()
        .iter()
        .filter(|c| original.column_index(c).is_none())
        .cloned()
        .collect();
    let removed_columns: Vec<String> = original
        .columns()
        .iter()
        .filter(|c| transformed.column_index(c).is_none())
        .cloned()
        .collect();

    let mut modified_columns = Vec::new();
    for (orig_idx, name) in original.columns().iter().enumerate() {
        if modified_columns.len() >= opts.max_modified {
            break;
        }
        let Some(new_idx) = transformed.column_index(name) else {
            continue;
        };

        let before: Vec<&Value> = original.column_values(orig_idx).take(opts.sample_rows).collect();
        let after: Vec<&Value> = transformed.column_values(new_idx).take(opts.sample_rows).collect();

        // An incomparable pair counts as modified.
        let same = samples_equal(&before, &after).unwrap_or(false);
        if !same {
            modified_columns.push(name.clone());
        }
    }

    let row_count_before = original.row_count();
    let row_count_after = transformed.row_count();
    let has_changes = !added_columns.is_empty()
        || !removed_columns.is_empty()
        || !modified_columns.is_empty()
        || row_count_before != row_count_after;

    DiffSummary {
        added_columns,
        removed_columns,
        modified_columns,
        row_count_before,
        row_count_after,
        has_changes,
    }
}

fn samples_equal(before: &[&Value], after: &[&Value]) -> Result<bool, Incomparable> {
    if before.len() != after.len() {
        return Ok(false);
    }
    for (a, b) in before.iter().zip(after) {
        if !a.try_eq(b)? {
            return Ok(false);
        }
    }
    Ok(true)
}
