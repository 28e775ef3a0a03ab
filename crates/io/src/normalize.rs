// Workbook normalization pipeline.
//
// upload -> read active sheet -> fill merges -> save intermediate workbook ->
// reload -> header detection -> processed_<uuid>.xlsx
//
// The upload and the intermediate workbook are removed on every exit path.

use std::fs;
use std::path::{Path, PathBuf};

use sheetwise_engine::normalize::{tabulate, NormalizeOptions, NormalizeSummary};
use sheetwise_engine::Dataset;

use crate::error::IoError;
use crate::temp::TempArtifacts;
use crate::xlsx;

#[derive(Debug, Clone)]
pub struct NormalizeOutput {
    pub dataset: Dataset,
    pub summary: NormalizeSummary,
    /// Name of the processed workbook inside the processed directory
    pub download_filename: String,
    pub output_path: PathBuf,
}

/// Name of the intermediate workbook that holds the merge-filled grid.
pub fn intermediate_path(upload: &Path) -> PathBuf {
    let stem = upload
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    upload.with_file_name(format!("unmerged_{}.xlsx", stem))
}

/// Normalize an uploaded workbook and write the result to `processed_dir`.
///
/// Consumes the upload: it is deleted whether or not normalization succeeds.
pub fn normalize_workbook(
    upload: &Path,
    processed_dir: &Path,
    opts: &NormalizeOptions,
) -> Result<NormalizeOutput, IoError> {
    let mut temps = TempArtifacts::new();
    temps.track(upload);
    let intermediate = temps.track(intermediate_path(upload));

    let mut grid = xlsx::read_grid(upload)?;
    let merge_ranges = grid.merges().len();
    let unmerged_cells = grid.resolve_merges();
    log::debug!(
        "filled {} merge ranges ({} cells) in {}",
        merge_ranges,
        unmerged_cells,
        upload.display()
    );

    xlsx::write_grid(&grid, &intermediate).map_err(|e| match e {
        IoError::Io(msg) => IoError::Io(format!("Failed to save unmerged workbook: {}", msg)),
        other => other,
    })?;
    let reloaded = xlsx::read_grid(&intermediate)?;

    let (dataset, header_rows_detected) = tabulate(&reloaded, opts);
    if dataset.col_count() == 0 {
        return Err(IoError::Parse("Sheet contains no data".to_string()));
    }

    fs::create_dir_all(processed_dir)?;
    let download_filename = format!("processed_{}.xlsx", uuid::Uuid::new_v4());
    let output_path = processed_dir.join(&download_filename);
    xlsx::write_dataset(&dataset, &output_path)?;

    let summary = NormalizeSummary {
        unmerged_cells,
        header_rows_detected,
        total_rows: dataset.row_count(),
        total_cols: dataset.col_count(),
    };
    log::info!(
        "normalized {}: {} merged cells, header depth {}, {}x{}",
        upload.display(),
        summary.unmerged_cells,
        summary.header_rows_detected,
        summary.total_rows,
        summary.total_cols
    );

    Ok(NormalizeOutput {
        dataset,
        summary,
        download_filename,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::{Format, Workbook};
    use sheetwise_engine::Value;

    fn write_report_workbook(path: &Path) {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        let plain = Format::new();
        // Two-row header: "Region" spans three columns, "Total" spans two rows
        sheet.merge_range(0, 0, 0, 2, "Region", &plain).unwrap();
        sheet.merge_range(0, 3, 1, 3, "Total", &plain).unwrap();
        sheet.write_string(1, 0, "North").unwrap();
        sheet.write_string(1, 1, "South").unwrap();
        sheet.write_string(1, 2, "East").unwrap();
        for r in 2..5u32 {
            for c in 0..4u16 {
                sheet.write_number(r, c, (r * 10 + c as u32) as f64).unwrap();
            }
        }
        workbook.save(path).unwrap();
    }

    #[test]
    fn test_intermediate_path() {
        assert_eq!(
            intermediate_path(Path::new("/tmp/up/report.xls")),
            PathBuf::from("/tmp/up/unmerged_report.xlsx")
        );
    }

    #[test]
    fn test_normalize_workbook_fills_merges() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("report.xlsx");
        let processed = dir.path().join("processed");
        write_report_workbook(&upload);

        let out = normalize_workbook(&upload, &processed, &NormalizeOptions::default()).unwrap();

        // A1:C1 and D1:D2
        assert_eq!(out.summary.unmerged_cells, 5);
        assert_eq!(out.summary.header_rows_detected, 0);
        assert_eq!(out.summary.total_rows, 4);
        assert_eq!(out.summary.total_cols, 4);
        // Merge fill makes the first row dense, so it alone becomes the header
        assert_eq!(out.dataset.columns(), &["Region", "Region.1", "Region.2", "Total"]);
        assert_eq!(out.dataset.rows()[0][3], Value::Text("Total".into()));
        assert!(out.download_filename.starts_with("processed_"));
        assert!(out.output_path.exists());

        // Upload and intermediate are gone
        assert!(!upload.exists());
        assert!(!intermediate_path(&upload).exists());
    }

    #[test]
    fn test_normalize_workbook_removes_upload_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("broken.xlsx");
        fs::write(&upload, b"not a zip").unwrap();

        let result = normalize_workbook(&upload, dir.path(), &NormalizeOptions::default());
        assert!(result.is_err());
        assert!(!upload.exists());
    }

    #[test]
    fn test_normalize_workbook_intermediate_save_failure() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("report.xlsx");
        write_report_workbook(&upload);
        // A directory in the way of the intermediate workbook
        fs::create_dir(intermediate_path(&upload)).unwrap();

        let err = normalize_workbook(&upload, &dir.path().join("processed"), &NormalizeOptions::default())
            .unwrap_err();
        match err {
            IoError::Io(msg) => {
                assert!(msg.starts_with("Failed to save unmerged workbook: "), "{}", msg);
                assert!(!msg.contains("I/O error: Failed"), "{}", msg);
            }
            other => panic!("expected an I/O error, got {:?}", other),
        }
        assert!(!upload.exists());
        assert!(!dir.path().join("processed").exists());
    }
}
