// Scanner core
// Digesting, signature lookup, classification and directory scanning

pub mod classify;
pub mod config;
pub mod digest;
pub mod error;
pub mod logging;
pub mod registry;
pub mod scan;

// Re-export commonly used types for convenience
pub use classify::{Classifier, Precedence};
pub use config::ScanConfig;
pub use digest::{DigestAlgorithm, DigestEngine, DigestSet};
pub use error::ScanError;
pub use registry::{Label, RegistryFormat, RegistryLoader, SignatureLookup, SignatureRegistry};
pub use scan::{
    CancelToken, ScanEngine, ScanEvent, ScanProgress, ScanReport, ScanResult, ScanRun, ScanState,
    ScanStats,
};
