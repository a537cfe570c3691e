//! Cache keys and version digests.

use sha2::{Digest, Sha256};
use std::fmt;

use super::encoder::EncoderConfig;
use crate::error::{Error, Result};

/// Identifies a group of notes that share one instrument source.
///
/// Always lowercase hex, so it can be embedded in cache filenames.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(String);

impl GroupId {
    /// Fresh random group id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Stable group id derived from a name such as an instrument path.
    pub fn from_name(name: &str) -> Self {
        let digest = format!("{:x}", Sha256::digest(name.as_bytes()));
        Self(digest[..32].to_string())
    }

    /// Group id from an existing hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        let valid = !hex.is_empty()
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(Error::Config(format!("group id must be lowercase hex: {:?}", hex)));
        }
        Ok(Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// In-memory key of one cache entry: group plus MIDI note.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(group: &GroupId, note: u8) -> Self {
        Self(format!("{}_{}", group, note))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every input that influences the encoded result.
#[derive(Debug, Clone, Copy)]
pub struct VersionInputs<'a> {
    pub content_hash: &'a str,
    pub app_version: &'a str,
    pub note: u8,
    pub clip_start: usize,
    pub clip_end: usize,
    pub config: &'a EncoderConfig,
}

/// Hex digest over all inputs of an encode request.
///
/// Fields are length-prefixed so adjacent values cannot run into each other.
/// Config entries are hashed in key order.
pub fn version_digest(inputs: &VersionInputs<'_>) -> String {
    let mut hasher = Sha256::new();
    hash_str(&mut hasher, inputs.content_hash);
    hash_str(&mut hasher, inputs.app_version);
    hasher.update([inputs.note]);
    hasher.update((inputs.clip_start as u64).to_le_bytes());
    hasher.update((inputs.clip_end as u64).to_le_bytes());
    hasher.update((inputs.config.len() as u64).to_le_bytes());
    for (key, value) in inputs.config.entries() {
        hash_str(&mut hasher, key);
        hash_str(&mut hasher, value);
    }
    format!("{:x}", hasher.finalize())
}

/// Hex digest of a sample buffer, usable as a source content hash.
pub fn samples_content_hash(samples: &[f32]) -> String {
    let mut hasher = Sha256::new();
    for sample in samples {
        hasher.update(sample.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(config: &EncoderConfig) -> VersionInputs<'_> {
        VersionInputs {
            content_hash: "abc",
            app_version: "1.0",
            note: 60,
            clip_start: 0,
            clip_end: 100,
            config,
        }
    }

    #[test]
    fn test_group_id() {
        let a = GroupId::random();
        let b = GroupId::random();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(GroupId::from_hex(a.as_str()).is_ok());

        assert_eq!(GroupId::from_name("Trumpet"), GroupId::from_name("Trumpet"));
        assert_ne!(GroupId::from_name("Trumpet"), GroupId::from_name("Oboe"));

        assert!(GroupId::from_hex("").is_err());
        assert!(GroupId::from_hex("ABC").is_err());
        assert!(GroupId::from_hex("../x").is_err());
    }

    #[test]
    fn test_cache_key() {
        let group = GroupId::from_hex("00ff").unwrap();
        assert_eq!(CacheKey::new(&group, 64).as_str(), "00ff_64");
    }

    #[test]
    fn test_version_digest_stable() {
        let config = EncoderConfig::new().with("a", "1").with("b", "2");
        let d1 = version_digest(&inputs(&config));
        let d2 = version_digest(&inputs(&config));
        assert_eq!(d1, d2);
        assert_eq!(d1.len(), 64);
    }

    #[test]
    fn test_version_digest_config_order_independent() {
        let c1 = EncoderConfig::new().with("a", "1").with("b", "2");
        let c2 = EncoderConfig::new().with("b", "2").with("a", "1");
        assert_eq!(version_digest(&inputs(&c1)), version_digest(&inputs(&c2)));
    }

    #[test]
    fn test_version_digest_each_input_matters() {
        let config = EncoderConfig::new().with("a", "1");
        let other = EncoderConfig::new().with("a", "2");
        let base = version_digest(&inputs(&config));

        let variants = [
            VersionInputs { content_hash: "abd", ..inputs(&config) },
            VersionInputs { app_version: "1.1", ..inputs(&config) },
            VersionInputs { note: 61, ..inputs(&config) },
            VersionInputs { clip_start: 1, ..inputs(&config) },
            VersionInputs { clip_end: 99, ..inputs(&config) },
            inputs(&other),
        ];
        for v in &variants {
            assert_ne!(version_digest(v), base);
        }
    }

    #[test]
    fn test_version_digest_field_boundaries() {
        let c1 = EncoderConfig::new().with("ab", "c");
        let c2 = EncoderConfig::new().with("a", "bc");
        assert_ne!(version_digest(&inputs(&c1)), version_digest(&inputs(&c2)));
    }

    #[test]
    fn test_samples_content_hash() {
        assert_eq!(samples_content_hash(&[0.5, 1.0]), samples_content_hash(&[0.5, 1.0]));
        assert_ne!(samples_content_hash(&[0.5, 1.0]), samples_content_hash(&[1.0, 0.5]));
    }
}
