//! SHA-256 content addressing for artifact sources.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::domain::error::ArtifexError;

/// Length of the readable hash carried by artifacts and object keys.
pub const SHORT_HASH_LEN: usize = 16;

/// Length of the artifact id (a prefix of the short hash).
pub const ARTIFACT_ID_LEN: usize = 12;

/// SHA-256 digest used as a content address.
///
/// The inner field is private so the value is always 64 lowercase hex chars.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    /// Full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form used as the artifact hash and in object keys.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_HASH_LEN]
    }

    /// Artifact id: the first [`ARTIFACT_ID_LEN`] hex chars.
    pub fn artifact_id(&self) -> &str {
        &self.0[..ARTIFACT_ID_LEN]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}

impl FromStr for ContentDigest {
    type Err = ArtifexError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ArtifexError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = ArtifexError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ContentDigest> for String {
    fn from(d: ContentDigest) -> Self {
        d.0
    }
}

/// Short content hash of a source string.
pub fn short_hash(code: &str) -> String {
    ContentDigest::compute(code.as_bytes()).short().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_display_fromstr_roundtrip() {
        let d = ContentDigest::compute(b"hello world");
        let hex = d.to_string();
        assert_eq!(hex.len(), 64);
        let parsed: ContentDigest = hex.parse().unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn digest_fromstr_rejects_bad_input() {
        assert!("not-valid-hex".parse::<ContentDigest>().is_err());
        assert!("abcd".parse::<ContentDigest>().is_err());
    }

    #[test]
    fn digest_deterministic_and_prefixes_agree() {
        let a = ContentDigest::compute(b"test data");
        let b = ContentDigest::compute(b"test data");
        assert_eq!(a, b);
        assert_eq!(a.short().len(), SHORT_HASH_LEN);
        assert!(a.short().starts_with(a.artifact_id()));
    }

    #[test]
    fn digest_different_data_different_hash() {
        assert_ne!(short_hash("data a"), short_hash("data b"));
    }
}
