// Test module entry point for scanner tests

mod classify_tests;
mod config_tests;
mod error_tests;

use std::fs;
use std::path::Path;

/// Write `contents` to `dir/name`
pub fn write_file(dir: &Path, name: &str, contents: &[u8]) {
    fs::write(dir.join(name), contents).unwrap();
}

pub const EMPTY_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";
pub const EMPTY_SHA1: &str = "da39a3ee5e6b4b0d3255bfef95601890afd80709";
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";
pub const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
pub const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";
