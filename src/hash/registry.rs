// Signature registry module
// Maps known digests to malware family labels and loads registry files

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;
use xz2::read::XzDecoder;

use super::digest::DigestAlgorithm;
use super::error::ScanError;

/// Classification label assigned to a scanned file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// No registry entry matched
    Safe,
    Ransomware,
    Trojan,
    Virus,
    Spyware,
    Adware,
    Worm,
    /// Any other malware family name
    Other(String),
}

impl Label {
    pub fn as_str(&self) -> &str {
        match self {
            Label::Safe => "Safe",
            Label::Ransomware => "Ransomware",
            Label::Trojan => "Trojan",
            Label::Virus => "Virus",
            Label::Spyware => "Spyware",
            Label::Adware => "Adware",
            Label::Worm => "Worm",
            Label::Other(name) => name,
        }
    }

    pub fn is_malicious(&self) -> bool {
        !matches!(self, Label::Safe)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let label = match trimmed.to_ascii_lowercase().as_str() {
            "" => {
                return Err(ScanError::InvalidRegistry {
                    reason: "empty label".to_string(),
                    path: None,
                })
            }
            "safe" | "clean" => Label::Safe,
            "ransomware" => Label::Ransomware,
            "trojan" => Label::Trojan,
            "virus" => Label::Virus,
            "spyware" => Label::Spyware,
            "adware" => Label::Adware,
            "worm" => Label::Worm,
            _ => Label::Other(trimmed.to_string()),
        };
        Ok(label)
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Lookup capability used by the classifier
///
/// Implement this to back classification with a source other than an
/// in-memory table.
pub trait SignatureLookup: Send + Sync {
    /// Get the label registered for a lowercase hex digest
    fn lookup(&self, digest: &str) -> Option<Label>;
}

/// Immutable table of known digests
#[derive(Debug, Clone, Default)]
pub struct SignatureRegistry {
    entries: HashMap<String, Label>,
}

/// Table shipped with the scanner when no registry file is configured
const BUILTIN_SIGNATURES: &[(&str, Label)] = &[
    ("5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8", Label::Ransomware),
    ("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855", Label::Trojan),
    ("8754c2a98e3b9c86aa49d4a35b8835e5fc6d5e6f53d6bce44a7f8db9c524de7a", Label::Virus),
    ("3dc3c3f1bce75e029b1c7a8db9a20dfb2c6f68c925b1898db0d49f7a1d0520a6", Label::Spyware),
    ("d301f9c47a8dd8331c4597feefcb056d08e3a3b4c4f4d03f9c1436a1a5f5b6b5", Label::Adware),
    ("1e8a9f5127d527fb9c97d7fd8be2b883cc7f75e20e437d7b19db69b42c42220c", Label::Worm),
];

impl SignatureRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from (digest, label) pairs
    ///
    /// Digests are lowercased, then must be hex of MD5, SHA-1 or SHA-256
    /// width. Duplicate digests and `Safe` labels are rejected.
    pub fn from_entries<I, K>(entries: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = (K, Label)>,
        K: AsRef<str>,
    {
        let mut registry = Self::new();
        for (digest, label) in entries {
            registry.insert(digest.as_ref(), label)?;
        }
        Ok(registry)
    }

    /// Six known digests shipped with the scanner
    pub fn builtin() -> Self {
        let entries = BUILTIN_SIGNATURES
            .iter()
            .map(|(digest, label)| (digest.to_string(), label.clone()))
            .collect();
        Self { entries }
    }

    fn insert(&mut self, digest: &str, label: Label) -> Result<(), ScanError> {
        let key = normalize_digest(digest)?;
        if label == Label::Safe {
            return Err(ScanError::InvalidRegistry {
                reason: format!("digest {} is mapped to the default label", key),
                path: None,
            });
        }
        if self.entries.contains_key(&key) {
            return Err(ScanError::DuplicateSignature { digest: key, path: None });
        }
        self.entries.insert(key, label);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries sorted by digest
    pub fn entries_sorted(&self) -> Vec<(&str, &Label)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl SignatureLookup for SignatureRegistry {
    fn lookup(&self, digest: &str) -> Option<Label> {
        self.entries.get(digest).cloned()
    }
}

/// Name the registry file in an entry error raised while loading it
fn with_registry_path(err: ScanError, file: &Path) -> ScanError {
    match err {
        ScanError::InvalidRegistry { reason, path: None } => ScanError::InvalidRegistry {
            reason,
            path: Some(file.to_path_buf()),
        },
        ScanError::DuplicateSignature { digest, path: None } => ScanError::DuplicateSignature {
            digest,
            path: Some(file.to_path_buf()),
        },
        other => other,
    }
}

/// Validate a registry key and return its lowercase form
pub fn normalize_digest(digest: &str) -> Result<String, ScanError> {
    let key = digest.trim().to_ascii_lowercase();
    if DigestAlgorithm::from_hex_len(key.len()).is_none() {
        return Err(ScanError::InvalidRegistry {
            reason: format!(
                "digest `{}` has length {}, expected 32, 40 or 64 hex characters",
                key,
                key.len()
            ),
            path: None,
        });
    }
    if !key.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ScanError::InvalidRegistry {
            reason: format!("digest `{}` is not hexadecimal", key),
            path: None,
        });
    }
    Ok(key)
}

/// Registry file format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegistryFormat {
    /// One `<digest>  <label>` pair per line, `#` comments allowed
    Text,
    /// A JSON object mapping digests to labels
    Json,
}

/// Reads and writes signature registry files
pub struct RegistryLoader;

impl RegistryLoader {
    /// Check if a path has .xz extension (compressed registry)
    pub fn is_compressed(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("xz"))
            .unwrap_or(false)
    }

    /// Detect the format from the file name, looking through a trailing .xz
    pub fn detect_format(path: &Path) -> RegistryFormat {
        let inner = if Self::is_compressed(path) {
            path.file_stem().map(Path::new).unwrap_or(path)
        } else {
            path
        };
        match inner.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => RegistryFormat::Json,
            _ => RegistryFormat::Text,
        }
    }

    /// Open a registry file, decompressing on the fly if it has .xz extension
    pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, ScanError> {
        let file = File::open(path).map_err(|e| {
            ScanError::from_io_error(e, "opening registry", Some(path.to_path_buf()))
        })?;

        if Self::is_compressed(path) {
            Ok(Box::new(BufReader::new(XzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }

    /// Load and validate a registry file
    /// Any malformed entry aborts loading
    pub fn load(path: &Path) -> Result<SignatureRegistry, ScanError> {
        let reader = Self::open_reader(path)?;
        let registry = match Self::detect_format(path) {
            RegistryFormat::Text => Self::read_text(reader, path)?,
            RegistryFormat::Json => Self::read_json(reader, path)?,
        };
        debug!(path = %path.display(), entries = registry.len(), "loaded signature registry");
        Ok(registry)
    }

    /// Parse the text format
    pub fn read_text(reader: impl BufRead, path: &Path) -> Result<SignatureRegistry, ScanError> {
        let mut registry = SignatureRegistry::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| {
                ScanError::from_io_error(e, "reading registry", Some(path.to_path_buf()))
            })?;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (digest, label) = Self::parse_line(trimmed).ok_or_else(|| {
                ScanError::RegistryParseError {
                    path: path.to_path_buf(),
                    line: line_num + 1,
                    reason: "expected `<digest>  <label>`".to_string(),
                }
            })?;

            let label: Label = label.parse().map_err(|e: ScanError| ScanError::RegistryParseError {
                path: path.to_path_buf(),
                line: line_num + 1,
                reason: e.to_string(),
            })?;

            registry.insert(digest, label).map_err(|e| match e {
                ScanError::InvalidRegistry { reason, .. } => ScanError::RegistryParseError {
                    path: path.to_path_buf(),
                    line: line_num + 1,
                    reason,
                },
                other => with_registry_path(other, path),
            })?;
        }

        Ok(registry)
    }

    /// Split a text line into digest and label
    /// The label is everything after the first run of whitespace
    pub fn parse_line(line: &str) -> Option<(&str, &str)> {
        let (digest, rest) = line.trim().split_once(char::is_whitespace)?;
        let label = rest.trim();
        if digest.is_empty() || label.is_empty() {
            return None;
        }
        Some((digest, label))
    }

    /// Parse the JSON object format
    pub fn read_json(mut reader: impl Read, path: &Path) -> Result<SignatureRegistry, ScanError> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw).map_err(|e| {
            ScanError::from_io_error(e, "reading registry", Some(path.to_path_buf()))
        })?;

        // Pairs keep duplicate keys visible instead of letting a map collapse them
        let pairs: JsonPairs = serde_json::from_str(&raw).map_err(|e| ScanError::RegistryParseError {
            path: path.to_path_buf(),
            line: e.line(),
            reason: e.to_string(),
        })?;

        SignatureRegistry::from_entries(pairs.0).map_err(|e| with_registry_path(e, path))
    }

    /// Write a registry in the text format, sorted by digest
    pub fn write_text(writer: &mut impl Write, registry: &SignatureRegistry) -> io::Result<()> {
        writeln!(writer, "# digest  label")?;
        for (digest, label) in registry.entries_sorted() {
            writeln!(writer, "{}  {}", digest, label)?;
        }
        Ok(())
    }

    /// Write a registry to a file in the text format
    pub fn save(path: &Path, registry: &SignatureRegistry) -> Result<(), ScanError> {
        let file = File::create(path).map_err(|e| {
            ScanError::from_io_error(e, "creating registry", Some(path.to_path_buf()))
        })?;
        let mut writer = io::BufWriter::new(file);
        Self::write_text(&mut writer, registry)
            .and_then(|_| writer.flush())
            .map_err(|e| ScanError::from_io_error(e, "writing registry", Some(path.to_path_buf())))
    }
}

/// JSON object read as an ordered list of pairs
struct JsonPairs(Vec<(String, Label)>);

impl<'de> Deserialize<'de> for JsonPairs {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairsVisitor;

        impl<'de> serde::de::Visitor<'de> for PairsVisitor {
            type Value = JsonPairs;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object mapping digests to labels")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::new();
                while let Some((digest, label)) = map.next_entry::<String, Label>()? {
                    pairs.push((digest, label));
                }
                Ok(JsonPairs(pairs))
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
