// Scanner configuration
// Loaded from TOML; every field has a default so an empty file is valid

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::classify::{Classifier, Precedence};
use super::digest::{DigestEngine, DEFAULT_CHUNK_SIZE};
use super::error::ScanError;
use super::registry::{RegistryLoader, SignatureRegistry};
use super::scan::ScanEngine;

const CONFIG_DIR_NAME: &str = "sigscan";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    /// Files digested at once
    pub concurrency: usize,
    /// Read size in bytes
    pub chunk_size: usize,
    pub precedence: Precedence,
    /// Registry file; the builtin table is used when unset
    pub registry: Option<PathBuf>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            precedence: Precedence::default(),
            registry: None,
        }
    }
}

impl ScanConfig {
    /// `<config dir>/sigscan/config.toml`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn from_toml(raw: &str, path: &Path) -> Result<Self, ScanError> {
        toml::from_str(raw).map_err(|e| ScanError::InvalidConfig {
            path: path.to_path_buf(),
            reason: e.message().to_string(),
        })
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ScanError::from_io_error(e, "reading config", Some(path.to_path_buf()))
        })?;
        let config = Self::from_toml(&raw, path)?;
        debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ScanError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load the configured registry, or the builtin table
    /// Fails on any malformed entry so no scan starts with a partial registry
    pub fn load_registry(&self) -> Result<SignatureRegistry, ScanError> {
        match &self.registry {
            Some(path) => RegistryLoader::load(path),
            None => Ok(SignatureRegistry::builtin()),
        }
    }

    /// Build an engine from this config around an already-loaded registry
    pub fn build_engine(&self, registry: SignatureRegistry) -> ScanEngine {
        let classifier = Classifier::new(Arc::new(registry)).with_precedence(self.precedence);
        ScanEngine::new(classifier)
            .with_concurrency(self.concurrency)
            .with_digest_engine(DigestEngine::with_chunk_size(self.chunk_size))
    }
}
