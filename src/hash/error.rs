// Centralized error handling module
// Error types with context for digesting, registry loading and scanning

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Main error type for the scanner
/// Carries the path and operation involved so messages are actionable
#[derive(Debug)]
pub enum ScanError {
    /// File system errors with context
    FileNotFound { path: PathBuf },
    DirectoryNotFound { path: PathBuf },
    NotADirectory { path: PathBuf },
    NotARegularFile { path: PathBuf },
    PermissionDenied { path: PathBuf, operation: String },
    IoError { path: Option<PathBuf>, operation: String, source: io::Error },

    /// Signature registry errors
    InvalidRegistry { reason: String, path: Option<PathBuf> },
    RegistryParseError { path: PathBuf, line: usize, reason: String },
    DuplicateSignature { digest: String, path: Option<PathBuf> },

    /// Configuration errors
    InvalidConfig { path: PathBuf, reason: String },
    InvalidArguments { message: String },

    /// The scan was cancelled before this operation finished
    Cancelled,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            // File system errors
            ScanError::FileNotFound { path } => {
                write!(f, "File not found: {}\n", path.display())?;
                write!(f, "Suggestion: The file may have been removed while the scan was running")
            }
            ScanError::DirectoryNotFound { path } => {
                write!(f, "Directory not found: {}\n", path.display())?;
                write!(f, "Suggestion: Check that the directory path is correct and the directory exists")
            }
            ScanError::NotADirectory { path } => {
                write!(f, "Not a directory: {}\n", path.display())?;
                write!(f, "Suggestion: Pass the folder that contains the files to scan")
            }
            ScanError::NotARegularFile { path } => {
                write!(f, "Not a regular file: {}\n", path.display())?;
                write!(f, "Suggestion: Only regular files can be digested")
            }
            ScanError::PermissionDenied { path, operation } => {
                write!(f, "Permission denied while {} {}\n", operation, path.display())?;
                write!(f, "Suggestion: Check file permissions or run with appropriate privileges")
            }
            ScanError::IoError { path, operation, source } => {
                if let Some(p) = path {
                    write!(f, "I/O error while {} {}: {}\n", operation, p.display(), source)?;
                } else {
                    write!(f, "I/O error while {}: {}\n", operation, source)?;
                }
                write!(f, "Suggestion: Check that the storage device is healthy and readable")
            }

            // Registry errors
            ScanError::InvalidRegistry { reason, path } => {
                match path {
                    Some(path) => write!(f, "Invalid signature registry {}: {}\n", path.display(), reason)?,
                    None => write!(f, "Invalid signature registry: {}\n", reason)?,
                }
                write!(f, "Suggestion: Registry keys must be MD5, SHA-1 or SHA-256 hex digests")
            }
            ScanError::RegistryParseError { path, line, reason } => {
                write!(f, "Error parsing registry {} at line {}: {}\n", path.display(), line, reason)?;
                write!(f, "Suggestion: Each line must read `<digest>  <label>`")
            }
            ScanError::DuplicateSignature { digest, path } => {
                match path {
                    Some(path) => write!(f, "Duplicate signature in registry {}: {}\n", path.display(), digest)?,
                    None => write!(f, "Duplicate signature in registry: {}\n", digest)?,
                }
                write!(f, "Suggestion: Remove the repeated entry so each digest maps to one label")
            }

            ScanError::InvalidConfig { path, reason } => {
                write!(f, "Invalid configuration {}: {}\n", path.display(), reason)?;
                write!(f, "Suggestion: Check the TOML syntax and field names")
            }
            ScanError::InvalidArguments { message } => {
                write!(f, "Invalid arguments: {}\n", message)?;
                write!(f, "Suggestion: Run with --help to see usage information")
            }

            ScanError::Cancelled => write!(f, "Scan cancelled"),
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::IoError { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ScanError {
    /// Create an error with context about the operation and optional path
    pub fn from_io_error(err: io::Error, operation: &str, path: Option<PathBuf>) -> Self {
        match (err.kind(), path) {
            (io::ErrorKind::NotFound, Some(p)) => {
                if operation.contains("directory") {
                    ScanError::DirectoryNotFound { path: p }
                } else {
                    ScanError::FileNotFound { path: p }
                }
            }
            (io::ErrorKind::PermissionDenied, Some(p)) => ScanError::PermissionDenied {
                path: p,
                operation: operation.to_string(),
            },
            (_, path) => ScanError::IoError {
                path,
                operation: operation.to_string(),
                source: err,
            },
        }
    }

    /// Whether this error belongs to a single file rather than the whole scan
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            ScanError::FileNotFound { .. }
                | ScanError::NotARegularFile { .. }
                | ScanError::PermissionDenied { .. }
                | ScanError::IoError { .. }
        )
    }
}

impl From<io::Error> for ScanError {
    fn from(err: io::Error) -> Self {
        ScanError::from_io_error(err, "unknown operation", None)
    }
}
