//! Test utilities for plughost crates.

mod scripted;

pub use scripted::{data_response, Reply, ScriptedBackend};

use std::path::PathBuf;
use tempfile::TempDir;

/// Creates a temporary directory that is cleaned up on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Creates a temporary file with given content.
pub fn temp_file(content: &str) -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let path = dir.path().join("test_file");
    std::fs::write(&path, content).expect("Failed to write temp file");
    (dir, path)
}

/// Creates an executable `/bin/sh` script standing in for a plugin binary.
#[cfg(unix)]
pub fn temp_script(body: &str) -> (TempDir, PathBuf) {
    use std::os::unix::fs::PermissionsExt;

    let dir = temp_dir();
    let path = dir.path().join("fake-plugin");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Failed to mark script executable");
    (dir, path)
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_temp_file_creation() {
        let (_dir, path) = temp_file("test content");
        assert!(path.is_file());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "test content");
    }

    #[cfg(unix)]
    #[test]
    fn test_temp_script_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let (_dir, path) = temp_script("echo hi");
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("#!/bin/sh\n"));
    }

    #[test]
    fn test_assert_macros() {
        let ok: Result<u8, String> = Ok(3);
        assert_eq!(assert_ok!(ok), 3);
        let err: Result<u8, String> = Err("nope".into());
        assert_eq!(assert_err!(err), "nope");
    }

    proptest! {
        #[test]
        fn test_temp_file_content_roundtrip(content in "\\PC*") {
            let (_dir, path) = temp_file(&content);
            let read_content = std::fs::read_to_string(&path).unwrap();
            prop_assert_eq!(content, read_content);
        }
    }
}
