// Excel workbook reading (xlsx, xls via calamine) and writing (xlsx via
// rust_xlsxwriter).
//
// Reading yields a raw Grid anchored at A1 so merge ranges line up with cell
// positions. Writing produces plain value workbooks: no styles beyond a bold
// header row and a date format for date/time cells.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};
use sheetwise_engine::normalize::composite_names;
use sheetwise_engine::{Dataset, Grid, Value};

use crate::error::IoError;
use crate::xlsx_layout;

/// Excel's row limit
pub const MAX_ROWS: usize = 1_048_576;
/// Excel's column limit
pub const MAX_COLS: usize = 16_384;
/// Longest string a cell can hold
const MAX_CELL_CHARS: usize = 32_767;

const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

// ============================================================================
// Reading
// ============================================================================

/// Read the sheet a workbook opens on, merge ranges included.
///
/// For .xlsx the active tab is used and merges come from the sheet XML.
/// Other formats use their first sheet and report no merges.
pub fn read_grid(path: &Path) -> Result<Grid, IoError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| IoError::Parse(format!("Failed to open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names();
    if sheet_names.is_empty() {
        return Err(IoError::Parse("Workbook contains no sheets".to_string()));
    }

    let (sheet_name, merges) = if is_xlsx(path) {
        let layout = xlsx_layout::read_active_sheet_layout(path).map_err(IoError::Parse)?;
        let name = if sheet_names.contains(&layout.name) {
            layout.name
        } else {
            sheet_names[0].clone()
        };
        (name, layout.merges)
    } else {
        (sheet_names[0].clone(), Vec::new())
    };

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IoError::Parse(format!("Failed to read sheet '{}': {}", sheet_name, e)))?;

    let mut grid = Grid::default();

    // Range start offset (data may not begin at A1)
    let (data_start_row, data_start_col) = range.start().unwrap_or((0, 0));
    for (row_idx, row) in range.rows().enumerate() {
        let target_row = data_start_row as usize + row_idx;
        if target_row >= MAX_ROWS {
            log::warn!("sheet '{}' truncated at {} rows", sheet_name, MAX_ROWS);
            break;
        }
        for (col_idx, cell) in row.iter().enumerate() {
            let target_col = data_start_col as usize + col_idx;
            if target_col >= MAX_COLS {
                break;
            }
            let value = cell_to_value(cell);
            if !value.is_empty() {
                grid.set(target_row, target_col, value);
            }
        }
    }

    log::debug!(
        "read sheet '{}' from {}: {}x{}, {} merge ranges",
        sheet_name,
        path.display(),
        grid.height(),
        grid.width(),
        merges.len()
    );

    Ok(grid.with_merges(merges))
}

/// Read the first sheet as a table whose first row holds the column names.
pub fn read_dataset(path: &Path) -> Result<Dataset, IoError> {
    let grid = read_grid(path)?;
    let rows = grid.into_rows();
    let Some((header, data)) = rows.split_first() else {
        return Ok(Dataset::default());
    };
    let columns = composite_names(std::slice::from_ref(header), header.len());
    let mut dataset = Dataset::new(columns, data.to_vec());
    dataset.drop_empty_rows();
    Ok(dataset)
}

fn is_xlsx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "xlsx" | "xlsm"))
        .unwrap_or(false)
}

/// Convert a calamine cell into an engine value.
pub fn cell_to_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Float(n) => Value::from_float(*n),
        Data::Int(n) => Value::Int(*n),
        Data::Bool(b) => Value::Bool(*b),
        Data::Error(e) => Value::Text(e.to_string()),
        Data::DateTime(dt) => {
            // 1900 date system assumed; calamine doesn't expose the 1904 flag
            let serial = dt.as_f64();
            if serial < 1.0 {
                Value::Text(format_time_of_day(serial))
            } else {
                excel_serial_to_datetime(serial)
                    .map(Value::DateTime)
                    .unwrap_or(Value::Float(serial))
            }
        }
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(Value::DateTime)
            .unwrap_or_else(|| Value::Text(s.clone())),
        Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Excel serial (1900 system) to a date/time, rounded to the second.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_466.0 {
        return None;
    }
    let secs = (serial * 86_400.0).round() as i64;
    excel_epoch().checked_add_signed(Duration::seconds(secs))
}

pub fn datetime_to_excel_serial(dt: &NaiveDateTime) -> f64 {
    let delta = *dt - excel_epoch();
    delta.num_seconds() as f64 / 86_400.0
}

fn format_time_of_day(fraction: f64) -> String {
    let secs = (fraction * 86_400.0).round() as u32 % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.with_nanosecond(0).unwrap_or(dt))
}

// ============================================================================
// Writing
// ============================================================================

/// Write a raw grid (no header interpretation, no merges) to a new .xlsx.
pub fn write_grid(grid: &Grid, path: &Path) -> Result<(), IoError> {
    let mut workbook = XlsxWorkbook::new();
    let date_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);
    let worksheet = workbook.add_worksheet();

    for (r, row) in grid.rows().iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            write_value(worksheet, r as u32, c as u16, value, &date_format)?;
        }
    }

    workbook
        .save(path)
        .map_err(|e| IoError::Io(format!("Failed to save XLSX file: {}", e)))
}

/// Write a dataset with a header row, like a table export without an index.
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<(), IoError> {
    write_sheets(&[("Sheet1", dataset)], path)
}

/// Write several named datasets into one workbook, one sheet each.
pub fn write_sheets(sheets: &[(&str, &Dataset)], path: &Path) -> Result<(), IoError> {
    let mut workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    for (name, dataset) in sheets {
        let worksheet = workbook
            .add_worksheet()
            .set_name(*name)
            .map_err(|e| IoError::Io(format!("Failed to create sheet '{}': {}", name, e)))?;

        for (c, column) in dataset.columns().iter().enumerate() {
            worksheet
                .write_string_with_format(0, c as u16, clip(column), &header_format)
                .map_err(|e| IoError::Io(format!("Failed to write header: {}", e)))?;
        }
        for (r, row) in dataset.rows().iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                write_value(worksheet, r as u32 + 1, c as u16, value, &date_format)?;
            }
        }
    }

    workbook
        .save(path)
        .map_err(|e| IoError::Io(format!("Failed to save XLSX file: {}", e)))
}

fn write_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &Value,
    date_format: &Format,
) -> Result<(), IoError> {
    let result = match value {
        Value::Null => return Ok(()),
        Value::Float(f) if !f.is_finite() => return Ok(()),
        Value::Bool(b) => worksheet.write_boolean(row, col, *b).map(|_| ()),
        Value::Int(i) => worksheet.write_number(row, col, *i as f64).map(|_| ()),
        Value::Float(f) => worksheet.write_number(row, col, *f).map(|_| ()),
        Value::Text(s) => worksheet.write_string(row, col, clip(s)).map(|_| ()),
        Value::DateTime(dt) => worksheet
            .write_number_with_format(row, col, datetime_to_excel_serial(dt), date_format)
            .map(|_| ()),
    };
    result.map_err(|e| IoError::Io(format!("Failed to write cell ({}, {}): {}", row, col, e)))
}

/// Cut text to what a cell can hold.
fn clip(s: &str) -> &str {
    match s.char_indices().nth(MAX_CELL_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetwise_engine::MergeRange;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, s).unwrap()
    }

    #[test]
    fn test_excel_serial_conversion() {
        assert_eq!(excel_serial_to_datetime(45292.0), Some(dt(2024, 1, 1, 0, 0, 0)));
        assert_eq!(excel_serial_to_datetime(45292.5), Some(dt(2024, 1, 1, 12, 0, 0)));
        assert_eq!(datetime_to_excel_serial(&dt(2024, 1, 1, 12, 0, 0)), 45292.5);
        assert_eq!(excel_serial_to_datetime(-1.0), None);
    }

    #[test]
    fn test_cell_to_value() {
        assert_eq!(cell_to_value(&Data::Float(3.0)), Value::Int(3));
        assert_eq!(cell_to_value(&Data::Float(3.25)), Value::Float(3.25));
        assert_eq!(cell_to_value(&Data::String(String::new())), Value::Null);
        assert_eq!(
            cell_to_value(&Data::DateTimeIso("2024-02-03T04:05:06".into())),
            Value::DateTime(dt(2024, 2, 3, 4, 5, 6))
        );
        assert_eq!(format_time_of_day(0.5), "12:00:00");
    }

    #[test]
    fn test_clip_long_text() {
        let long = "x".repeat(MAX_CELL_CHARS + 10);
        assert_eq!(clip(&long).len(), MAX_CELL_CHARS);
        assert_eq!(clip("short"), "short");
    }

    #[test]
    fn test_write_and_read_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.xlsx");
        let grid = Grid::new(vec![
            vec!["Region".into(), "Region".into(), Value::Null],
            vec![Value::Int(1), Value::Float(2.5), Value::DateTime(dt(2023, 5, 6, 7, 8, 9))],
        ]);
        write_grid(&grid, &path).unwrap();

        let back = read_grid(&path).unwrap();
        assert!(back.merges().is_empty());
        assert_eq!(back.get(0, 1), &Value::Text("Region".into()));
        assert_eq!(back.get(1, 0), &Value::Int(1));
        assert_eq!(back.get(1, 1), &Value::Float(2.5));
        assert_eq!(back.get(1, 2), &Value::DateTime(dt(2023, 5, 6, 7, 8, 9)));
    }

    #[test]
    fn test_read_grid_reports_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.xlsx");

        let mut workbook = XlsxWorkbook::new();
        let sheet = workbook.add_worksheet();
        sheet.merge_range(0, 0, 0, 2, "Region", &Format::new()).unwrap();
        sheet.write_number(1, 0, 10.0).unwrap();
        workbook.save(&path).unwrap();

        let grid = read_grid(&path).unwrap();
        assert_eq!(grid.merges(), &[MergeRange::new(0, 0, 0, 2)]);
        assert_eq!(grid.get(0, 0), &Value::Text("Region".into()));
        assert!(grid.get(0, 1).is_empty());
    }

    #[test]
    fn test_write_and_read_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed.xlsx");
        let ds = Dataset::new(
            vec!["name".into(), "qty".into()],
            vec![vec!["a".into(), Value::Int(1)], vec!["b".into(), Value::Null]],
        );
        write_dataset(&ds, &path).unwrap();

        let back = read_dataset(&path).unwrap();
        assert_eq!(back.columns(), ds.columns());
        assert_eq!(back.rows(), ds.rows());
    }

    #[test]
    fn test_write_sheets_named() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis.xlsx");
        let a = Dataset::new(vec!["x".into()], vec![vec![Value::Int(1)]]);
        let b = Dataset::new(vec!["report".into()], vec![vec!["text".into()]]);
        write_sheets(&[("Preview", &a), ("Report", &b)], &path).unwrap();

        let workbook = open_workbook_auto(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Preview".to_string(), "Report".to_string()]);
    }
}
