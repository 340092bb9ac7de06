// Digest computation module
// Streams a file once through MD5, SHA-1 and SHA-256 accumulators

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::digest::OutputSizeUser;
use sha2::{Digest, Sha256};
use tracing::trace;

use super::error::ScanError;
use super::scan::CancelToken;

/// Default read size for streaming files through the accumulators
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest chunk size accepted; smaller values are clamped up
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// The digest algorithms computed for every file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl DigestAlgorithm {
    /// All algorithms, in the order their accumulators are fed
    pub const ALL: [DigestAlgorithm; 3] =
        [DigestAlgorithm::Md5, DigestAlgorithm::Sha1, DigestAlgorithm::Sha256];

    /// Raw digest length in bytes
    pub fn output_size(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => <Md5 as OutputSizeUser>::output_size(),
            DigestAlgorithm::Sha1 => <Sha1 as OutputSizeUser>::output_size(),
            DigestAlgorithm::Sha256 => <Sha256 as OutputSizeUser>::output_size(),
        }
    }

    /// Width of the lowercase hex encoding
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha1 => 40,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    /// Infer the algorithm from the length of a hex digest
    pub fn from_hex_len(len: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.hex_len() == len)
    }

    pub fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "md5",
            DigestAlgorithm::Sha1 => "sha1",
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The full set of digests for one input
///
/// Only ever built from finalized accumulators, so either every field is
/// present or the computation returned an error instead.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DigestSet {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
}

impl DigestSet {
    /// Get the hex digest for one algorithm
    pub fn get(&self, algorithm: DigestAlgorithm) -> &str {
        match algorithm {
            DigestAlgorithm::Md5 => &self.md5,
            DigestAlgorithm::Sha1 => &self.sha1,
            DigestAlgorithm::Sha256 => &self.sha256,
        }
    }

    /// Iterate over (algorithm, digest) pairs in the given order
    pub fn iter_in<'a>(
        &'a self,
        order: &'a [DigestAlgorithm],
    ) -> impl Iterator<Item = (DigestAlgorithm, &'a str)> + 'a {
        order.iter().map(move |alg| (*alg, self.get(*alg)))
    }
}

/// Running accumulators for all three algorithms
struct Accumulators {
    md5: Md5,
    sha1: Sha1,
    sha256: Sha256,
}

impl Accumulators {
    fn new() -> Self {
        Self {
            md5: Md5::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    fn finalize(self) -> DigestSet {
        DigestSet {
            md5: hex::encode(self.md5.finalize()),
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
        }
    }
}

/// Digest engine with streaming I/O
#[derive(Debug, Clone)]
pub struct DigestEngine {
    chunk_size: usize,
}

impl DigestEngine {
    /// Create a new DigestEngine with the default chunk size (64KB)
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a new DigestEngine with a custom chunk size
    /// Values below 4KB are raised to 4KB
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(MIN_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Compute all digests of an in-memory buffer
    pub fn compute_digests_bytes(&self, data: &[u8]) -> DigestSet {
        let mut acc = Accumulators::new();
        acc.update(data);
        acc.finalize()
    }

    /// Compute all digests of a file, reading it exactly once
    pub fn compute_digests(&self, path: &Path) -> Result<DigestSet, ScanError> {
        self.compute_digests_cancellable(path, &CancelToken::new())
    }

    /// Compute all digests of a file, giving up between chunks once `cancel` is set
    ///
    /// The file handle is owned by this call and released on every return path.
    pub fn compute_digests_cancellable(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<DigestSet, ScanError> {
        self.compute_digests_sized(path, cancel).map(|(digests, _)| digests)
    }

    /// Same as `compute_digests_cancellable`, also returning the bytes read
    pub(crate) fn compute_digests_sized(
        &self,
        path: &Path,
        cancel: &CancelToken,
    ) -> Result<(DigestSet, u64), ScanError> {
        let mut file = File::open(path).map_err(|e| {
            ScanError::from_io_error(e, "opening", Some(path.to_path_buf()))
        })?;

        let metadata = file.metadata().map_err(|e| {
            ScanError::from_io_error(e, "reading metadata of", Some(path.to_path_buf()))
        })?;
        if !metadata.is_file() {
            return Err(ScanError::NotARegularFile {
                path: path.to_path_buf(),
            });
        }

        let mut acc = Accumulators::new();
        let mut buffer = vec![0u8; self.chunk_size];
        let mut total = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(ScanError::Cancelled);
            }
            let bytes_read = match file.read(&mut buffer) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ScanError::from_io_error(e, "reading", Some(path.to_path_buf())));
                }
            };
            if bytes_read == 0 {
                break;
            }
            acc.update(&buffer[..bytes_read]);
            total += bytes_read as u64;
        }

        trace!(path = %path.display(), bytes = total, "digested file");
        Ok((acc.finalize(), total))
    }
}

impl Default for DigestEngine {
    fn default() -> Self {
        Self::new()
    }
}
