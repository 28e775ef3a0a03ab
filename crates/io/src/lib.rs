// File I/O operations

pub mod csv;
pub mod error;
pub mod normalize;
pub mod report;
pub mod store;
pub mod temp;
pub mod xlsx;
pub mod xlsx_layout;

use std::path::Path;

use sheetwise_engine::Dataset;

pub use error::IoError;
pub use normalize::{normalize_workbook, NormalizeOutput};
pub use store::Storage;
pub use temp::TempArtifacts;

/// Load a header-row table from .xlsx, .xls or .csv, chosen by extension.
pub fn load_table(path: &Path) -> Result<Dataset, IoError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xls" => xlsx::read_dataset(path),
        "csv" | "tsv" | "txt" => csv::read_dataset(path).map_err(IoError::Parse),
        other => Err(IoError::Unsupported(format!(".{}", other))),
    }
}
