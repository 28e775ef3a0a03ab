//! The Lua surface chart code sees: `plt` (drawing into a [`FigureSink`]),
//! `stats` (small numeric helpers) and the `df`/`dataset` tables.
//!
//! Missing cells arrive in `df` as NaN in numeric columns and `""`
//! elsewhere, so every column is a proper sequence of `dataset.rows` values.

use std::collections::HashMap;

use mlua::{Lua, MultiValue, Result as LuaResult, Table, Value};
use sheetwise_engine::stats::summarize_numbers;
use sheetwise_engine::value::DATETIME_FORMAT;
use sheetwise_engine::{ColumnKind, Dataset, Value as CellValue};

use crate::figure::{FigureSink, Series, XValues};

pub const DEFAULT_HIST_BINS: usize = 10;
const MAX_HIST_BINS: usize = 200;

// ============================================================================
// Value conversion
// ============================================================================

/// Convert a Lua value to a display string.
pub fn lua_value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        Value::String(s) => s.to_string_lossy(),
        Value::Table(_) => "table".to_string(),
        Value::Function(_) => "function".to_string(),
        _ => "<unknown>".to_string(),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Integer(i) => *i as f64,
        Value::Number(n) => *n,
        Value::String(s) => s.to_string_lossy().trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn numbers(table: &Table) -> LuaResult<Vec<f64>> {
    table
        .sequence_values::<Value>()
        .map(|v| v.map(|v| to_number(&v)))
        .collect()
}

fn finite_numbers(table: &Table) -> LuaResult<Vec<f64>> {
    Ok(numbers(table)?.into_iter().filter(|n| n.is_finite()).collect())
}

fn strings(table: &Table) -> LuaResult<Vec<String>> {
    table
        .sequence_values::<Value>()
        .map(|v| v.map(|v| lua_value_to_string(&v)))
        .collect()
}

/// Numeric sequences become positions; anything else becomes labels.
fn x_values(table: &Table) -> LuaResult<XValues> {
    let raw: Vec<Value> = table.sequence_values::<Value>().collect::<LuaResult<_>>()?;
    if raw.iter().all(|v| matches!(v, Value::Integer(_) | Value::Number(_))) {
        Ok(XValues::Numbers(raw.iter().map(to_number).collect()))
    } else {
        Ok(XValues::Labels(raw.iter().map(lua_value_to_string).collect()))
    }
}

fn option_label(opts: Option<&Table>) -> LuaResult<Option<String>> {
    match opts {
        Some(t) => t.get::<Option<String>>("label"),
        None => Ok(None),
    }
}

fn length_mismatch(what: &str, a: usize, b: usize) -> mlua::Error {
    mlua::Error::external(format!("{}: lengths differ ({} vs {})", what, a, b))
}

fn cell_to_lua(lua: &Lua, value: &CellValue, numeric: bool) -> LuaResult<Value> {
    Ok(match value {
        v if v.is_empty() && numeric => Value::Number(f64::NAN),
        v if v.is_empty() => Value::String(lua.create_string("")?),
        CellValue::Int(i) => Value::Integer(*i),
        CellValue::Float(f) => Value::Number(*f),
        CellValue::Bool(b) => Value::Boolean(*b),
        CellValue::Text(s) => Value::String(lua.create_string(s)?),
        CellValue::DateTime(dt) => {
            Value::String(lua.create_string(dt.format(DATETIME_FORMAT).to_string())?)
        }
        CellValue::Null => Value::Nil,
    })
}

/// Build the `df` table: column name -> sequence of values.
pub fn build_df(lua: &Lua, dataset: &Dataset) -> LuaResult<Table> {
    let df = lua.create_table()?;
    for (idx, name) in dataset.columns().iter().enumerate() {
        let numeric = dataset.column_kind(idx).is_numeric();
        let values = dataset
            .column_values(idx)
            .map(|v| cell_to_lua(lua, v, numeric))
            .collect::<LuaResult<Vec<Value>>>()?;
        df.set(name.as_str(), lua.create_sequence_from(values)?)?;
    }
    Ok(df)
}

/// Build the `dataset` table describing the shape of `df`.
pub fn build_dataset_info(lua: &Lua, dataset: &Dataset) -> LuaResult<Table> {
    let info = lua.create_table()?;
    let columns = dataset.columns();
    let numeric: Vec<&str> = dataset
        .numeric_columns()
        .into_iter()
        .map(|i| columns[i].as_str())
        .collect();
    let categorical: Vec<&str> = (0..dataset.col_count())
        .filter(|&i| dataset.column_kind(i) == ColumnKind::Text)
        .map(|i| columns[i].as_str())
        .collect();

    info.set("rows", dataset.row_count())?;
    info.set("columns", lua.create_sequence_from(columns.iter().map(String::as_str))?)?;
    info.set("numeric", lua.create_sequence_from(numeric)?)?;
    info.set("categorical", lua.create_sequence_from(categorical)?)?;
    Ok(info)
}

// ============================================================================
// plt
// ============================================================================

/// Register the `plt` table. Every call records into `figure`.
pub fn register_plt(lua: &Lua, figure: FigureSink) -> LuaResult<()> {
    let plt = lua.create_table()?;

    for (name, slot) in [("title", 0u8), ("xlabel", 1), ("ylabel", 2)] {
        let figure = figure.clone();
        let f = lua.create_function(move |_, text: Value| {
            let text = Some(lua_value_to_string(&text));
            let mut fig = figure.borrow_mut();
            match slot {
                0 => fig.title = text,
                1 => fig.xlabel = text,
                _ => fig.ylabel = text,
            }
            Ok(())
        })?;
        plt.set(name, f)?;
    }

    // bar(labels, values [, {label=...}])
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (labels, values, opts): (Table, Table, Option<Table>)| {
            let labels = strings(&labels)?;
            let values = numbers(&values)?;
            if labels.len() != values.len() {
                return Err(length_mismatch("bar", labels.len(), values.len()));
            }
            let label = option_label(opts.as_ref())?;
            figure.borrow_mut().series.push(Series::Bar { labels, values, label });
            Ok(())
        })?;
        plt.set("bar", f)?;
    }

    // plot(y) / plot(x, y [, {label=...}])
    {
        let figure = figure.clone();
        let f = lua.create_function(
            move |_, (first, second, third): (Table, Option<Table>, Option<Table>)| {
                let (x, y, opts) = match second {
                    Some(second) if second.raw_len() > 0 || first.raw_len() == 0 => {
                        (x_values(&first)?, numbers(&second)?, third)
                    }
                    other => {
                        let y = numbers(&first)?;
                        let x = XValues::Numbers((1..=y.len()).map(|i| i as f64).collect());
                        (x, y, other)
                    }
                };
                if x.len() != y.len() {
                    return Err(length_mismatch("plot", x.len(), y.len()));
                }
                let label = option_label(opts.as_ref())?;
                figure.borrow_mut().series.push(Series::Line { x, y, label });
                Ok(())
            },
        )?;
        plt.set("plot", f.clone())?;
        plt.set("line", f)?;
    }

    // scatter(x, y [, {label=...}])
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (x, y, opts): (Table, Table, Option<Table>)| {
            let x = x_values(&x)?;
            let y = numbers(&y)?;
            if x.len() != y.len() {
                return Err(length_mismatch("scatter", x.len(), y.len()));
            }
            let label = option_label(opts.as_ref())?;
            figure.borrow_mut().series.push(Series::Scatter { x, y, label });
            Ok(())
        })?;
        plt.set("scatter", f)?;
    }

    // hist(values [, bins | {bins=..., label=...}])
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (values, spec): (Table, Option<Value>)| {
            let values = finite_numbers(&values)?;
            let (bins, label) = match spec {
                Some(Value::Integer(n)) => (n.max(1) as usize, None),
                Some(Value::Number(n)) => (n.max(1.0) as usize, None),
                Some(Value::Table(t)) => (
                    t.get::<Option<usize>>("bins")?.unwrap_or(DEFAULT_HIST_BINS),
                    t.get::<Option<String>>("label")?,
                ),
                _ => (DEFAULT_HIST_BINS, None),
            };
            figure.borrow_mut().series.push(Series::Hist {
                values,
                bins: bins.clamp(1, MAX_HIST_BINS),
                label,
            });
            Ok(())
        })?;
        plt.set("hist", f)?;
    }

    // pie(values [, labels])
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (values, labels): (Table, Option<Table>)| {
            let values = numbers(&values)?;
            let labels = match labels {
                Some(t) => strings(&t)?,
                None => (1..=values.len()).map(|i| i.to_string()).collect(),
            };
            if labels.len() != values.len() {
                return Err(length_mismatch("pie", values.len(), labels.len()));
            }
            figure.borrow_mut().series.push(Series::Pie { labels, values });
            Ok(())
        })?;
        plt.set("pie", f)?;
    }

    // boxplot(values | {values, values, ...} [, labels])
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (data, labels): (Table, Option<Table>)| {
            let nested = matches!(data.raw_get::<Value>(1)?, Value::Table(_));
            let groups = if nested {
                data.sequence_values::<Table>()
                    .map(|t| t.and_then(|t| finite_numbers(&t)))
                    .collect::<LuaResult<Vec<_>>>()?
            } else {
                vec![finite_numbers(&data)?]
            };
            let labels = match labels {
                Some(t) => strings(&t)?,
                None => (1..=groups.len()).map(|i| i.to_string()).collect(),
            };
            if labels.len() != groups.len() {
                return Err(length_mismatch("boxplot", groups.len(), labels.len()));
            }
            figure.borrow_mut().series.push(Series::Box { labels, groups });
            Ok(())
        })?;
        plt.set("boxplot", f)?;
    }

    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, _: MultiValue| {
            figure.borrow_mut().legend = true;
            Ok(())
        })?;
        plt.set("legend", f)?;
    }

    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, on: Option<bool>| {
            figure.borrow_mut().grid = on.unwrap_or(true);
            Ok(())
        })?;
        plt.set("grid", f)?;
    }

    // rc(key, value): only font family and minus-sign handling matter here
    {
        let figure = figure.clone();
        let f = lua.create_function(move |_, (key, value): (String, Value)| {
            let mut fig = figure.borrow_mut();
            match (key.as_str(), value) {
                ("font.sans-serif", Value::Table(t)) => fig.rc.sans_serif = strings(&t)?,
                ("font.sans-serif", Value::String(s)) => {
                    fig.rc.sans_serif = vec![s.to_string_lossy()]
                }
                ("axes.unicode_minus", Value::Boolean(b)) => fig.rc.unicode_minus = b,
                (other, _) => log::debug!("ignoring plt.rc({:?})", other),
            }
            Ok(())
        })?;
        plt.set("rc", f)?;
    }

    // Layout calls that have no effect on a single fixed-size figure
    for name in ["figure", "tight_layout", "show", "close", "xticks", "yticks"] {
        plt.set(name, lua.create_function(|_, _: MultiValue| Ok(()))?)?;
    }

    lua.globals().set("plt", plt)?;
    Ok(())
}

// ============================================================================
// stats
// ============================================================================

fn opt_number(value: Option<f64>) -> Value {
    value.map(Value::Number).unwrap_or(Value::Nil)
}

/// Value counts, most frequent first; ties keep first-seen order.
fn value_counts(values: Vec<String>) -> Vec<(String, usize)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for v in values {
        if v.is_empty() || v == "nan" {
            continue;
        }
        match index.get(&v) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(v.clone(), counts.len());
                counts.push((v, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// Group `values` by `keys` in first-seen key order, skipping NaN values.
fn grouped(keys: Vec<String>, values: Vec<f64>) -> Vec<(String, Vec<f64>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for (k, v) in keys.into_iter().zip(values) {
        if k.is_empty() || !v.is_finite() {
            continue;
        }
        let i = *index.entry(k.clone()).or_insert_with(|| {
            groups.push((k, Vec::new()));
            groups.len() - 1
        });
        groups[i].1.push(v);
    }
    groups
}

pub fn register_stats(lua: &Lua) -> LuaResult<()> {
    let stats = lua.create_table()?;

    stats.set(
        "numbers",
        lua.create_function(|lua, t: Table| lua.create_sequence_from(finite_numbers(&t)?))?,
    )?;

    stats.set(
        "sum",
        lua.create_function(|_, t: Table| Ok(finite_numbers(&t)?.iter().sum::<f64>()))?,
    )?;

    for name in ["mean", "median", "std", "min", "max"] {
        let f = lua.create_function(move |_, t: Table| {
            let summary = summarize_numbers(&finite_numbers(&t)?);
            Ok(opt_number(match name {
                "mean" => summary.mean,
                "median" => summary.median,
                "std" => summary.std,
                "min" => summary.min,
                _ => summary.max,
            }))
        })?;
        stats.set(name, f)?;
    }

    // counts(values [, top_n]) -> labels, counts
    stats.set(
        "counts",
        lua.create_function(|lua, (t, top_n): (Table, Option<usize>)| {
            let mut counts = value_counts(strings(&t)?);
            if let Some(n) = top_n {
                counts.truncate(n);
            }
            let labels = lua.create_sequence_from(counts.iter().map(|(k, _)| k.as_str()))?;
            let values = lua.create_sequence_from(counts.iter().map(|(_, c)| *c))?;
            Ok((labels, values))
        })?,
    )?;

    stats.set(
        "unique",
        lua.create_function(|lua, t: Table| {
            let mut seen: Vec<String> = Vec::new();
            for v in strings(&t)? {
                if !seen.contains(&v) {
                    seen.push(v);
                }
            }
            lua.create_sequence_from(seen)
        })?,
    )?;

    // group_sum / group_mean(keys, values) -> labels, aggregates
    for (name, mean) in [("group_sum", false), ("group_mean", true)] {
        let f = lua.create_function(move |lua, (keys, values): (Table, Table)| {
            let keys = strings(&keys)?;
            let values = numbers(&values)?;
            if keys.len() != values.len() {
                return Err(length_mismatch(name, keys.len(), values.len()));
            }
            let groups = grouped(keys, values);
            let labels = lua.create_sequence_from(groups.iter().map(|(k, _)| k.as_str()))?;
            let aggregates = lua.create_sequence_from(groups.iter().map(|(_, vs)| {
                let sum: f64 = vs.iter().sum();
                if mean {
                    sum / vs.len() as f64
                } else {
                    sum
                }
            }))?;
            Ok((labels, aggregates))
        })?;
        stats.set(name, f)?;
    }

    lua.globals().set("stats", stats)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figure::new_sink;

    fn lua_with_api() -> (Lua, FigureSink) {
        let lua = Lua::new();
        let sink = new_sink();
        register_plt(&lua, sink.clone()).unwrap();
        register_stats(&lua).unwrap();
        (lua, sink)
    }

    #[test]
    fn test_value_counts_order() {
        let counts = value_counts(
            ["b", "a", "b", "", "c", "a", "b"].iter().map(|s| s.to_string()).collect(),
        );
        assert_eq!(
            counts,
            vec![("b".to_string(), 3), ("a".to_string(), 2), ("c".to_string(), 1)]
        );
    }

    #[test]
    fn test_plt_records_series() {
        let (lua, sink) = lua_with_api();
        lua.load(
            r#"
            plt.title("Sales")
            plt.bar({"a", "b"}, {1, 2.5}, {label = "2024"})
            plt.plot({1, 2, 3})
            plt.hist({1, 2, 3, 0/0}, 4)
            plt.legend()
            "#,
        )
        .exec()
        .unwrap();

        let fig = sink.borrow();
        assert_eq!(fig.title.as_deref(), Some("Sales"));
        assert!(fig.legend);
        assert_eq!(fig.series.len(), 3);
        assert_eq!(
            fig.series[0],
            Series::Bar {
                labels: vec!["a".into(), "b".into()],
                values: vec![1.0, 2.5],
                label: Some("2024".into()),
            }
        );
        match &fig.series[1] {
            Series::Line { x, y, .. } => {
                assert_eq!(x, &XValues::Numbers(vec![1.0, 2.0, 3.0]));
                assert_eq!(y, &vec![1.0, 2.0, 3.0]);
            }
            other => panic!("expected line, got {:?}", other),
        }
        match &fig.series[2] {
            Series::Hist { values, bins, .. } => {
                assert_eq!(values.len(), 3);
                assert_eq!(*bins, 4);
            }
            other => panic!("expected hist, got {:?}", other),
        }
    }

    #[test]
    fn test_plt_length_mismatch_errors() {
        let (lua, _sink) = lua_with_api();
        let err = lua.load(r#"plt.bar({"a"}, {1, 2})"#).exec().unwrap_err();
        assert!(err.to_string().contains("lengths differ"));
    }

    #[test]
    fn test_plt_rc_shim() {
        let (lua, sink) = lua_with_api();
        lua.load(r#"plt.rc("font.sans-serif", {"SimHei"}) plt.rc("axes.unicode_minus", false)"#)
            .exec()
            .unwrap();
        let fig = sink.borrow();
        assert_eq!(fig.rc.sans_serif, vec!["SimHei".to_string()]);
        assert!(!fig.rc.unicode_minus);
    }

    #[test]
    fn test_stats_helpers() {
        let (lua, _sink) = lua_with_api();
        let (mean, n, top): (f64, i64, String) = lua
            .load(
                r#"
                local labels, counts = stats.counts({"x", "y", "y"})
                local cleaned = stats.numbers({1, 0/0, 3})
                return stats.mean(cleaned), #cleaned, labels[1]
                "#,
            )
            .eval()
            .unwrap();
        assert_eq!(mean, 2.0);
        assert_eq!(n, 2);
        assert_eq!(top, "y");

        let (label, total): (String, f64) = lua
            .load(r#"local k, v = stats.group_sum({"a", "b", "a"}, {1, 2, 3}) return k[1], v[1]"#)
            .eval()
            .unwrap();
        assert_eq!(label, "a");
        assert_eq!(total, 4.0);
    }

    #[test]
    fn test_build_df_missing_values() {
        let lua = Lua::new();
        let ds = Dataset::new(
            vec!["qty".into(), "name".into()],
            vec![
                vec![CellValue::Int(1), CellValue::Text("a".into())],
                vec![CellValue::Null, CellValue::Null],
            ],
        );
        lua.globals().set("df", build_df(&lua, &ds).unwrap()).unwrap();
        lua.globals().set("dataset", build_dataset_info(&lua, &ds).unwrap()).unwrap();
        let (len, is_nan, blank, rows, numeric): (i64, bool, String, i64, String) = lua
            .load(
                r#"local q = df["qty"][2]
                return #df["qty"], q ~= q, df["name"][2], dataset.rows, dataset.numeric[1]"#,
            )
            .eval()
            .unwrap();
        assert_eq!(len, 2);
        assert!(is_nan);
        assert_eq!(blank, "");
        assert_eq!(rows, 2);
        assert_eq!(numeric, "qty");
    }
}
