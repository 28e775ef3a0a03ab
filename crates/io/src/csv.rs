// CSV/TSV import

use std::io::Read;
use std::path::Path;

use sheetwise_engine::normalize::composite_names;
use sheetwise_engine::{Dataset, Grid, Value};

/// Read a delimited file into a raw grid, sniffing the delimiter.
pub fn read_grid(path: &Path) -> Result<Grid, String> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    grid_from_string(&content, delimiter)
}

/// Read a delimited file as a table whose first row holds the column names.
pub fn read_dataset(path: &Path) -> Result<Dataset, String> {
    let rows = read_grid(path)?.into_rows();
    let Some((header, data)) = rows.split_first() else {
        return Ok(Dataset::default());
    };
    let columns = composite_names(std::slice::from_ref(header), header.len());
    let mut dataset = Dataset::new(columns, data.to_vec());
    dataset.drop_empty_rows();
    Ok(dataset)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // More consistent lines and more columns both raise the score
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s.trim_start_matches('\u{feff}').to_string()),
        Err(e) => {
            let bytes = e.into_bytes();
            // Excel-exported CSVs are usually Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn grid_from_string(content: &str, delimiter: u8) -> Result<Grid, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut grid = Grid::default();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| e.to_string())?;
        for (col_idx, field) in record.iter().enumerate() {
            let value = parse_field(field);
            if !value.is_empty() {
                grid.set(row_idx, col_idx, value);
            }
        }
    }

    Ok(grid)
}

/// Infer a scalar from CSV text: integers, then floats, then booleans.
fn parse_field(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        if f.is_finite() {
            return Value::Float(f);
        }
    }
    match trimmed {
        "True" | "TRUE" | "true" => Value::Bool(true),
        "False" | "FALSE" | "false" => Value::Bool(false),
        _ => Value::Text(field.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Age,City\nAlice,30,Paris\nBob,25,London\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAge\tCity\nAlice\t30\tParis\nBob\t25\tLondon\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Address;City\n\"Doe, Jane\";\"123 Main St, Apt 4\";Paris\nBob;\"456 Elm\";London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(parse_field("42"), Value::Int(42));
        assert_eq!(parse_field("4.5"), Value::Float(4.5));
        assert_eq!(parse_field("TRUE"), Value::Bool(true));
        assert_eq!(parse_field(" "), Value::Null);
        assert_eq!(parse_field("nan"), Value::Text("nan".into()));
        assert_eq!(parse_field("Paris"), Value::Text("Paris".into()));
    }

    #[test]
    fn test_semicolon_csv_dataset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.csv");
        fs::write(&path, "Name;Age;City\nAlice;30;Paris\n;;\nBob;25;London\n").unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.columns(), &["Name", "Age", "City"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows()[1], vec!["Bob".into(), Value::Int(25), "London".into()]);
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Café" with 0xE9
        fs::write(&path, b"Name,Qty\nCaf\xe9,1\n").unwrap();

        let ds = read_dataset(&path).unwrap();
        assert_eq!(ds.rows()[0][0], Value::Text("Café".into()));
    }
}
