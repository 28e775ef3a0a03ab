// Tabular dataset: named columns over rectangular rows.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::value::Value;

/// A rectangular table. Every row holds exactly one value per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

/// Column-oriented preview: `{columns, index, data}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub columns: Vec<String>,
    pub index: Vec<usize>,
    pub data: Vec<Vec<Value>>,
}

/// Inferred storage kind of a column, used for statistics and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    DateTime,
    Text,
}

impl ColumnKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }

    /// Dtype label reported to users and prompts.
    pub fn dtype(self) -> &'static str {
        match self {
            ColumnKind::Integer => "int64",
            ColumnKind::Float => "float64",
            ColumnKind::Boolean => "bool",
            ColumnKind::DateTime => "datetime64[ns]",
            ColumnKind::Text => "object",
        }
    }
}

impl Dataset {
    /// Build a dataset, padding short rows with nulls and cutting long ones.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Build from JSON records. Columns follow first appearance across records.
    pub fn from_records(records: &[serde_json::Map<String, serde_json::Value>]) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).map(Value::from_json).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Self { columns, rows }
    }

    /// Parse a split-oriented preview (`{columns, data}`), as sent back by clients.
    pub fn from_split_json(json: &serde_json::Value) -> Option<Self> {
        let columns: Vec<String> = json
            .get("columns")?
            .as_array()?
            .iter()
            .map(|c| match c {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let rows = json
            .get("data")?
            .as_array()?
            .iter()
            .map(|row| {
                row.as_array()
                    .map(|cells| cells.iter().map(Value::from_json).collect())
                    .unwrap_or_default()
            })
            .collect();
        Some(Self::new(columns, rows))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    /// Infer a column's kind from its non-empty values.
    ///
    /// Integers with gaps widen to floats; all-empty columns are floats.
    pub fn column_kind(&self, idx: usize) -> ColumnKind {
        let mut ints = 0usize;
        let mut floats = 0usize;
        let mut bools = 0usize;
        let mut dates = 0usize;
        let mut others = 0usize;
        let mut empties = 0usize;

        for v in self.column_values(idx) {
            match v {
                v if v.is_empty() => empties += 1,
                Value::Int(_) => ints += 1,
                Value::Float(_) => floats += 1,
                Value::Bool(_) => bools += 1,
                Value::DateTime(_) => dates += 1,
                _ => others += 1,
            }
        }

        let present = ints + floats + bools + dates + others;
        if present == 0 {
            ColumnKind::Float
        } else if ints == present {
            if empties > 0 { ColumnKind::Float } else { ColumnKind::Integer }
        } else if ints + floats == present {
            ColumnKind::Float
        } else if bools == present && empties == 0 {
            ColumnKind::Boolean
        } else if dates == present {
            ColumnKind::DateTime
        } else {
            ColumnKind::Text
        }
    }

    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.col_count())
            .filter(|&i| self.column_kind(i).is_numeric())
            .collect()
    }

    /// First `n` rows as a new dataset.
    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Drop rows empty across every column. Returns how many were removed.
    pub fn drop_empty_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.iter().all(Value::is_empty));
        before - self.rows.len()
    }

    pub fn truncate(&mut self, max_rows: usize) {
        self.rows.truncate(max_rows);
    }

    /// Split-oriented preview of the first `n` rows, index renumbered from 0.
    pub fn preview(&self, n: usize) -> Preview {
        let data: Vec<Vec<Value>> = self.rows.iter().take(n).cloned().collect();
        Preview {
            columns: self.columns.clone(),
            index: (0..data.len()).collect(),
            data,
        }
    }

    pub fn to_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect()
            })
            .collect()
    }
}

/// Per-column values serialized as an ordered JSON object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ByColumn<T>(pub Vec<(String, T)>);

impl<T> ByColumn<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Serialize> Serialize for ByColumn<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}
