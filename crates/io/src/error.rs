// Error type for file-level operations.

use std::fmt;

#[derive(Debug)]
pub enum IoError {
    /// Saving, reading or removing a file failed
    Io(String),
    /// The file exists but its contents could not be understood
    Parse(String),
    /// The file type is not accepted for this operation
    Unsupported(String),
    /// The file exceeds the configured upload limit
    TooLarge { size: u64, limit: u64 },
}

impl IoError {
    /// Short machine-readable kind, used in logs and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            IoError::Io(_) => "io",
            IoError::Parse(_) => "parse",
            IoError::Unsupported(_) => "unsupported",
            IoError::TooLarge { .. } => "too_large",
        }
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::Io(msg) => write!(f, "I/O error: {}", msg),
            IoError::Parse(msg) => write!(f, "parse error: {}", msg),
            IoError::Unsupported(msg) => write!(f, "unsupported file type: {}", msg),
            IoError::TooLarge { size, limit } => {
                write!(f, "file is {} bytes, limit is {} bytes", size, limit)
            }
        }
    }
}

impl std::error::Error for IoError {}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Io(e.to_string())
    }
}
