// Tests for digest classification

use std::collections::HashMap;
use std::sync::Arc;

use sigscan::hash::{
    Classifier, DigestAlgorithm, DigestEngine, Label, Precedence, SignatureLookup,
    SignatureRegistry,
};

use super::*;

fn classifier_for(entries: Vec<(&str, Label)>) -> Classifier {
    Classifier::new(Arc::new(SignatureRegistry::from_entries(entries).unwrap()))
}

#[test]
fn test_no_match_is_safe() {
    let classifier = classifier_for(vec![(HELLO_SHA256, Label::Virus)]);
    let digests = DigestEngine::new().compute_digests_bytes(b"");

    assert_eq!(classifier.classify(Some(&digests)), Label::Safe);
    assert_eq!(classifier.first_match(&digests), None);
}

#[test]
fn test_failed_digest_is_safe() {
    let classifier = Classifier::new(Arc::new(SignatureRegistry::builtin()));
    assert_eq!(classifier.classify(None), Label::Safe);
}

#[test]
fn test_match_on_any_digest_position() {
    let digests = DigestEngine::new().compute_digests_bytes(b"");

    for (key, label) in [
        (EMPTY_MD5, Label::Adware),
        (EMPTY_SHA1, Label::Spyware),
        (EMPTY_SHA256, Label::Trojan),
    ] {
        let classifier = classifier_for(vec![(key, label.clone())]);
        assert_eq!(classifier.classify(Some(&digests)), label);
    }
}

#[test]
fn test_strongest_first_tie_break() {
    let classifier = classifier_for(vec![
        (HELLO_MD5, Label::Virus),
        (HELLO_SHA1, Label::Worm),
        (HELLO_SHA256, Label::Ransomware),
    ]);
    let digests = DigestEngine::new().compute_digests_bytes(b"hello world");

    assert_eq!(classifier.precedence(), Precedence::StrongestFirst);
    assert_eq!(
        classifier.first_match(&digests),
        Some((DigestAlgorithm::Sha256, Label::Ransomware))
    );
}

#[test]
fn test_legacy_first_tie_break() {
    let classifier = classifier_for(vec![
        (HELLO_MD5, Label::Virus),
        (HELLO_SHA256, Label::Ransomware),
    ])
    .with_precedence(Precedence::LegacyFirst);
    let digests = DigestEngine::new().compute_digests_bytes(b"hello world");

    assert_eq!(classifier.classify(Some(&digests)), Label::Virus);
}

#[test]
fn test_sha1_beats_md5_under_strongest_first() {
    let classifier = classifier_for(vec![(HELLO_MD5, Label::Virus), (HELLO_SHA1, Label::Worm)]);
    let digests = DigestEngine::new().compute_digests_bytes(b"hello world");

    assert_eq!(
        classifier.first_match(&digests),
        Some((DigestAlgorithm::Sha1, Label::Worm))
    );
}

#[test]
fn test_precedence_parsing() {
    assert_eq!("strongest-first".parse::<Precedence>().unwrap(), Precedence::StrongestFirst);
    assert_eq!("Legacy-First".parse::<Precedence>().unwrap(), Precedence::LegacyFirst);
    assert!("random".parse::<Precedence>().is_err());
    assert_eq!(Precedence::LegacyFirst.to_string(), "legacy-first");
}

/// Lookup backed by something other than the registry type
struct MapLookup(HashMap<String, Label>);

impl SignatureLookup for MapLookup {
    fn lookup(&self, digest: &str) -> Option<Label> {
        self.0.get(digest).cloned()
    }
}

#[test]
fn test_custom_lookup_source() {
    let mut map = HashMap::new();
    map.insert(EMPTY_SHA1.to_string(), Label::Other("Dropper".to_string()));
    let classifier = Classifier::new(Arc::new(MapLookup(map)));
    let digests = DigestEngine::new().compute_digests_bytes(b"");

    assert_eq!(
        classifier.classify(Some(&digests)),
        Label::Other("Dropper".to_string())
    );
}

#[test]
fn test_classification_is_deterministic() {
    let classifier = Classifier::new(Arc::new(SignatureRegistry::builtin()));
    let digests = DigestEngine::new().compute_digests_bytes(b"password");

    let first = classifier.classify(Some(&digests));
    let second = classifier.classify(Some(&digests));
    assert_eq!(first, Label::Ransomware);
    assert_eq!(first, second);
}
