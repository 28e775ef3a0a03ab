// Request-scoped temporary files.
//
// Every path registered with a TempArtifacts guard is removed when the guard
// drops, whichever way the enclosing function exits.

use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct TempArtifacts {
    paths: Vec<PathBuf>,
}

impl TempArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for removal. The file need not exist yet.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Remove every tracked file now. Returns how many existed.
    pub fn cleanup(&mut self) -> usize {
        let mut removed = 0;
        for path in self.paths.drain(..) {
            if remove_if_exists(&path) {
                removed += 1;
            }
        }
        removed
    }
}

impl Drop for TempArtifacts {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn remove_if_exists(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("failed to remove temporary file {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.xlsx");
        let b = dir.path().join("b.xlsx");
        std::fs::write(&a, b"x").unwrap();
        {
            let mut guard = TempArtifacts::new();
            guard.track(&a);
            guard.track(&b); // never created
            assert_eq!(guard.paths().len(), 2);
        }
        assert!(!a.exists());
        assert!(!b.exists());
    }

    #[test]
    fn test_drop_on_error_path() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("upload.xlsx");

        fn failing_step(guard: &mut TempArtifacts, path: &Path) -> Result<(), String> {
            std::fs::write(guard.track(path), b"data").map_err(|e| e.to_string())?;
            Err("boom".to_string())
        }

        let result = {
            let mut guard = TempArtifacts::new();
            failing_step(&mut guard, &upload)
        };
        assert!(result.is_err());
        assert!(!upload.exists());
    }

    #[test]
    fn test_cleanup_counts_existing() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        std::fs::write(&a, b"x").unwrap();
        let mut guard = TempArtifacts::new();
        guard.track(&a);
        guard.track(dir.path().join("missing"));
        assert_eq!(guard.cleanup(), 1);
        assert!(guard.paths().is_empty());
    }
}
