// Descriptive statistics for datasets: shape, missing values, numeric
// summaries and categorical frequency tables.

use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::dataset::{ByColumn, ColumnKind, Dataset};
use crate::value::Value;

pub const DEFAULT_TOP_CATEGORIES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicStats {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub missing_values: ByColumn<usize>,
    pub data_types: ByColumn<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalSummary {
    pub unique_values: usize,
    pub top_categories: ByColumn<usize>,
}

pub fn basic_stats(ds: &Dataset) -> BasicStats {
    let missing_values = ByColumn(
        ds.columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), ds.column_values(i).filter(|v| v.is_empty()).count()))
            .collect(),
    );
    let data_types = ByColumn(
        ds.columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), ds.column_kind(i).dtype().to_string()))
            .collect(),
    );

    BasicStats {
        rows: ds.row_count(),
        columns: ds.col_count(),
        column_names: ds.columns().to_vec(),
        missing_values,
        data_types,
    }
}

/// Summaries for every numeric column. Empty cells are skipped.
pub fn numeric_stats(ds: &Dataset) -> ByColumn<NumericSummary> {
    ByColumn(
        ds.numeric_columns()
            .into_iter()
            .map(|i| {
                let values: Vec<f64> = ds.column_values(i).filter_map(Value::as_f64).collect();
                (ds.columns()[i].clone(), summarize_numbers(&values))
            })
            .collect(),
    )
}

pub fn summarize_numbers(values: &[f64]) -> NumericSummary {
    if values.is_empty() {
        return NumericSummary { mean: None, median: None, std: None, min: None, max: None };
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;

    // sample standard deviation (n - 1)
    let std = if values.len() > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(var.sqrt())
    } else {
        None
    };

    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    sorted.sort();
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1].0 + sorted[mid].0) / 2.0
    } else {
        sorted[mid].0
    };

    NumericSummary {
        mean: Some(mean),
        median: Some(median),
        std,
        min: sorted.first().map(|v| v.0),
        max: sorted.last().map(|v| v.0),
    }
}

/// Frequency tables for text-like columns, most frequent first.
///
/// Ties keep first-appearance order.
pub fn categorical_stats(ds: &Dataset, top_n: usize) -> ByColumn<CategoricalSummary> {
    ByColumn(
        (0..ds.col_count())
            .filter(|&i| ds.column_kind(i) == ColumnKind::Text)
            .map(|i| (ds.columns()[i].clone(), value_counts(ds, i, top_n)))
            .collect(),
    )
}

fn value_counts(ds: &Dataset, idx: usize, top_n: usize) -> CategoricalSummary {
    let mut counts: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    for (order, v) in ds.column_values(idx).filter(|v| !v.is_empty()).enumerate() {
        let entry = counts.entry(v.to_string()).or_insert((0, order));
        entry.0 += 1;
    }

    let unique_values = counts.len();
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    CategoricalSummary {
        unique_values,
        top_categories: ByColumn(
            ranked
                .into_iter()
                .take(top_n)
                .map(|(k, (count, _))| (k, count))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(
            vec!["city".into(), "sales".into(), "units".into()],
            vec![
                vec!["Oslo".into(), Value::Float(10.0), Value::Int(1)],
                vec!["Bergen".into(), Value::Float(20.5), Value::Int(2)],
                vec!["Oslo".into(), Value::Null, Value::Int(3)],
                vec![Value::Null, Value::Float(30.0), Value::Int(4)],
            ],
        )
    }

    #[test]
    fn test_basic_stats() {
        let s = basic_stats(&sample());
        assert_eq!(s.rows, 4);
        assert_eq!(s.columns, 3);
        assert_eq!(s.missing_values.get("city"), Some(&1));
        assert_eq!(s.missing_values.get("units"), Some(&0));
        assert_eq!(s.data_types.get("sales").map(String::as_str), Some("float64"));
        assert_eq!(s.data_types.get("units").map(String::as_str), Some("int64"));
        assert_eq!(s.data_types.get("city").map(String::as_str), Some("object"));
    }

    #[test]
    fn test_summarize_numbers() {
        let s = summarize_numbers(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(s.mean, Some(2.5));
        assert_eq!(s.median, Some(2.5));
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(4.0));
        let std = s.std.unwrap();
        assert!((std - 1.2909944).abs() < 1e-6);

        let single = summarize_numbers(&[5.0]);
        assert_eq!(single.median, Some(5.0));
        assert_eq!(single.std, None);
        assert_eq!(summarize_numbers(&[]).mean, None);
    }

    #[test]
    fn test_numeric_stats_skips_missing() {
        let stats = numeric_stats(&sample());
        assert_eq!(stats.len(), 2);
        let sales = stats.get("sales").unwrap();
        assert_eq!(sales.median, Some(20.5));
        assert_eq!(sales.max, Some(30.0));
    }

    #[test]
    fn test_categorical_stats_ranked() {
        let stats = categorical_stats(&sample(), DEFAULT_TOP_CATEGORIES);
        let city = stats.get("city").unwrap();
        assert_eq!(city.unique_values, 2);
        assert_eq!(city.top_categories.0[0], ("Oslo".to_string(), 2));
        assert_eq!(city.top_categories.0[1], ("Bergen".to_string(), 1));
        assert!(stats.get("sales").is_none());
    }

    #[test]
    fn test_top_categories_limit_and_tie_order() {
        let rows = ["b", "a", "c", "a", "b"].iter().map(|s| vec![Value::from(*s)]).collect();
        let ds = Dataset::new(vec!["k".into()], rows);
        let stats = categorical_stats(&ds, 2);
        let top = &stats.get("k").unwrap().top_categories.0;
        assert_eq!(top, &vec![("b".to_string(), 2), ("a".to_string(), 2)]);
    }
}
