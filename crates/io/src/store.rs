// On-disk storage layout: uploads, processed datasets, analysis artifacts.
//
// Every name that arrives from a caller goes through `secure_filename` or is
// checked by `checked_name` before it touches the filesystem.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IoError;

/// Upload types accepted for normalization and transforms
pub const WORKBOOK_EXTENSIONS: &[&str] = &["xls", "xlsx"];
/// Upload types accepted for analysis
pub const ANALYSIS_EXTENSIONS: &[&str] = &["xls", "xlsx", "csv"];

#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    processed_dir: PathBuf,
    analysis_dir: PathBuf,
    max_upload_bytes: u64,
}

impl Storage {
    pub fn new(
        upload_dir: impl Into<PathBuf>,
        processed_dir: impl Into<PathBuf>,
        analysis_dir: impl Into<PathBuf>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
            analysis_dir: analysis_dir.into(),
            max_upload_bytes,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    pub fn analysis_dir(&self) -> &Path {
        &self.analysis_dir
    }

    pub fn ensure_dirs(&self) -> Result<(), IoError> {
        for dir in [&self.upload_dir, &self.processed_dir, &self.analysis_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| IoError::Io(format!("Failed to create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    /// Copy a caller's file into the upload directory after checking its
    /// extension and size. The returned path is owned by the pipeline.
    pub fn accept_upload(&self, source: &Path, allowed: &[&str]) -> Result<PathBuf, IoError> {
        let original = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if original.is_empty() {
            return Err(IoError::Unsupported("no file selected".to_string()));
        }
        if !has_allowed_extension(&original, allowed) {
            return Err(IoError::Unsupported(format!(
                "{} (accepted: {})",
                original,
                allowed.join(", ")
            )));
        }

        let size = fs::metadata(source)
            .map_err(|e| IoError::Io(format!("Failed to read {}: {}", source.display(), e)))?
            .len();
        if size > self.max_upload_bytes {
            return Err(IoError::TooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        fs::create_dir_all(&self.upload_dir)?;
        let dest = self.upload_dir.join(format!(
            "{}_{}",
            uuid::Uuid::new_v4().simple(),
            secure_filename(&original)
        ));
        fs::copy(source, &dest)
            .map_err(|e| IoError::Io(format!("Failed to store upload: {}", e)))?;
        log::debug!("accepted upload {} -> {}", source.display(), dest.display());
        Ok(dest)
    }

    pub fn processed_path(&self, filename: &str) -> Result<PathBuf, IoError> {
        Ok(self.processed_dir.join(checked_name(filename)?))
    }

    pub fn analysis_path(&self, filename: &str) -> Result<PathBuf, IoError> {
        Ok(self.analysis_dir.join(checked_name(filename)?))
    }

    pub fn analysis_workbook_path(&self, analysis_id: &str) -> Result<PathBuf, IoError> {
        self.analysis_path(&format!("analysis_{}.xlsx", checked_name(analysis_id)?))
    }

    pub fn report_path(&self, analysis_id: &str) -> Result<PathBuf, IoError> {
        self.analysis_path(&format!("report_{}.html", checked_name(analysis_id)?))
    }

    pub fn images_dir(&self, analysis_id: &str) -> Result<PathBuf, IoError> {
        self.analysis_path(&format!("images_{}", checked_name(analysis_id)?))
    }

    pub fn image_path(&self, analysis_id: &str, image_name: &str) -> Result<PathBuf, IoError> {
        Ok(self.images_dir(analysis_id)?.join(checked_name(image_name)?))
    }
}

pub fn has_allowed_extension(filename: &str, allowed: &[&str]) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Reject names that could escape the directory they are joined onto.
pub fn checked_name(name: &str) -> Result<&str, IoError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        Err(IoError::Unsupported(format!("invalid file name {:?}", name)))
    } else {
        Ok(name)
    }
}

/// ASCII-only file name: separators become `_`, other characters are dropped,
/// leading dots are stripped. Keeps the extension when it survives.
pub fn secure_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => Some(c),
            ' ' | '/' | '\\' => Some('_'),
            _ => None,
        })
        .collect();
    let trimmed = cleaned.trim_start_matches(['.', '_']);
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));

    // A name whose stem was entirely non-ASCII still keeps its extension
    let stem_survived = match ext {
        Some(ext) => trimmed.len() > ext.len() + 1 && trimmed.ends_with(&format!(".{}", ext)),
        None => !trimmed.is_empty(),
    };
    match (stem_survived, ext) {
        (true, _) => trimmed.to_string(),
        (false, Some(ext)) => format!("upload.{}", ext.to_ascii_lowercase()),
        (false, None) => "upload".to_string(),
    }
}
