// Classification module
// Resolves a digest set to a label through a signature lookup

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::digest::{DigestAlgorithm, DigestSet};
use super::error::ScanError;
use super::registry::{Label, SignatureLookup};

/// Order in which a file's digests are checked against the registry
///
/// When two digests of one file hit entries with different labels, the
/// digest checked first decides the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precedence {
    /// SHA-256, then SHA-1, then MD5
    #[default]
    StrongestFirst,
    /// MD5, then SHA-1, then SHA-256
    LegacyFirst,
}

impl Precedence {
    pub fn order(self) -> &'static [DigestAlgorithm] {
        match self {
            Precedence::StrongestFirst => &[
                DigestAlgorithm::Sha256,
                DigestAlgorithm::Sha1,
                DigestAlgorithm::Md5,
            ],
            Precedence::LegacyFirst => &[
                DigestAlgorithm::Md5,
                DigestAlgorithm::Sha1,
                DigestAlgorithm::Sha256,
            ],
        }
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Precedence::StrongestFirst => f.write_str("strongest-first"),
            Precedence::LegacyFirst => f.write_str("legacy-first"),
        }
    }
}

impl FromStr for Precedence {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strongest-first" | "strongest" => Ok(Precedence::StrongestFirst),
            "legacy-first" | "legacy" => Ok(Precedence::LegacyFirst),
            other => Err(ScanError::InvalidArguments {
                message: format!("unknown precedence `{}`, expected strongest-first or legacy-first", other),
            }),
        }
    }
}

/// Maps digest sets to labels
#[derive(Clone)]
pub struct Classifier {
    lookup: Arc<dyn SignatureLookup>,
    precedence: Precedence,
}

impl Classifier {
    pub fn new(lookup: Arc<dyn SignatureLookup>) -> Self {
        Self {
            lookup,
            precedence: Precedence::default(),
        }
    }

    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// First registry hit in precedence order, with the algorithm that matched
    pub fn first_match(&self, digests: &DigestSet) -> Option<(DigestAlgorithm, Label)> {
        digests
            .iter_in(self.precedence.order())
            .find_map(|(alg, digest)| self.lookup.lookup(digest).map(|label| (alg, label)))
    }

    /// Classify a digest set; a failed digest (`None`) is `Safe`
    pub fn classify(&self, digests: Option<&DigestSet>) -> Label {
        digests
            .and_then(|set| self.first_match(set))
            .map(|(_, label)| label)
            .unwrap_or(Label::Safe)
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("precedence", &self.precedence)
            .finish_non_exhaustive()
    }
}
