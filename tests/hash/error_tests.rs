// Tests for error module

use std::error::Error;
use std::io;
use std::path::PathBuf;

use sigscan::hash::ScanError;

#[test]
fn test_directory_not_found_display() {
    let error = ScanError::DirectoryNotFound {
        path: PathBuf::from("/path/to/dir"),
    };
    let message = format!("{}", error);
    assert!(message.contains("Directory not found"));
    assert!(message.contains("/path/to/dir"));
    assert!(message.contains("Suggestion"));
}

#[test]
fn test_registry_parse_error_display() {
    let error = ScanError::RegistryParseError {
        path: PathBuf::from("sigs.txt"),
        line: 42,
        reason: "expected `<digest>  <label>`".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("sigs.txt"));
    assert!(message.contains("42"));
    assert!(message.contains("<digest>"));
}

#[test]
fn test_duplicate_signature_display() {
    let error = ScanError::DuplicateSignature {
        digest: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        path: None,
    };
    assert!(error.to_string().contains("d41d8cd98f00b204e9800998ecf8427e"));

    let error = ScanError::DuplicateSignature {
        digest: "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        path: Some(PathBuf::from("sigs.json")),
    };
    assert!(error.to_string().contains("sigs.json"));
}

#[test]
fn test_from_io_error_not_found_file() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
    let error = ScanError::from_io_error(io_err, "opening", Some(PathBuf::from("a.bin")));

    match error {
        ScanError::FileNotFound { path } => assert_eq!(path, PathBuf::from("a.bin")),
        other => panic!("Expected FileNotFound, got {:?}", other),
    }
}

#[test]
fn test_from_io_error_not_found_directory() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
    let error = ScanError::from_io_error(io_err, "scanning directory", Some(PathBuf::from("/scan")));

    assert!(matches!(error, ScanError::DirectoryNotFound { .. }));
}

#[test]
fn test_from_io_error_permission_denied() {
    let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
    let error = ScanError::from_io_error(io_err, "reading", Some(PathBuf::from("locked.bin")));

    match error {
        ScanError::PermissionDenied { path, operation } => {
            assert_eq!(path, PathBuf::from("locked.bin"));
            assert_eq!(operation, "reading");
        }
        other => panic!("Expected PermissionDenied, got {:?}", other),
    }
    assert!(ScanError::from_io_error(
        io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        "reading",
        Some(PathBuf::from("x")),
    )
    .is_per_file());
}

#[test]
fn test_from_io_error_without_path() {
    let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
    let error = ScanError::from_io_error(io_err, "reading", None);

    assert!(matches!(error, ScanError::IoError { path: None, .. }));
    assert!(error.source().is_some());
}

#[test]
fn test_error_source_none() {
    let error = ScanError::Cancelled;
    assert!(error.source().is_none());
    assert!(!error.is_per_file());
}
