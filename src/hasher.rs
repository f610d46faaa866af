//! Content fingerprinting for change detection.
//!
//! Digests are fixed-width (32 bytes) and computed in a streaming fashion so artifacts larger
//! than memory never have to be materialised in full.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

/// Width of every digest in bytes
pub const DIGEST_LEN: usize = 32;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Hash function used to fingerprint artifacts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Blake3 => write!(f, "blake3"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
        }
    }
}

/// A fixed-width content fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines and tables
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(12);
        hex
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentDigest({})", self.short())
    }
}

impl FromStr for ContentDigest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| Error::InvalidDigest {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher over either supported algorithm
pub enum StreamHasher {
    Blake3(Box<blake3::Hasher>),
    Sha256(Sha256),
}

impl StreamHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Blake3 => StreamHasher::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => StreamHasher::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            StreamHasher::Blake3(hasher) => {
                hasher.update(data);
            }
            StreamHasher::Sha256(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> ContentDigest {
        match self {
            StreamHasher::Blake3(hasher) => ContentDigest(*hasher.finalize().as_bytes()),
            StreamHasher::Sha256(hasher) => ContentDigest(hasher.finalize().into()),
        }
    }
}

/// Hash everything a reader yields, one buffer at a time
pub fn hash_reader<R: Read>(algorithm: HashAlgorithm, mut reader: R) -> io::Result<ContentDigest> {
    let mut hasher = StreamHasher::new(algorithm);
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

/// Compute the digest of a file in streaming fashion
pub fn hash_file<P: AsRef<Path>>(algorithm: HashAlgorithm, file_path: P) -> Result<ContentDigest> {
    let file = File::open(file_path)?;
    Ok(hash_reader(algorithm, file)?)
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> ContentDigest {
    let mut hasher = StreamHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hash_bytes(HashAlgorithm::Blake3, b"hello world").to_hex(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
        assert_eq!(
            hash_bytes(HashAlgorithm::Sha256, b"hello world").to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_deterministic_and_sensitive_to_single_byte() {
        let a = hash_bytes(HashAlgorithm::Blake3, b"backup payload 0");
        let b = hash_bytes(HashAlgorithm::Blake3, b"backup payload 0");
        let c = hash_bytes(HashAlgorithm::Blake3, b"backup payload 1");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_streaming_matches_one_shot() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("large.bin");

        // Spans several read buffers so the chunked path is exercised.
        let data: Vec<u8> = (0..(READ_BUFFER_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut file = File::create(&path)?;
        file.write_all(&data)?;
        drop(file);

        for algorithm in [HashAlgorithm::Blake3, HashAlgorithm::Sha256] {
            assert_eq!(hash_file(algorithm, &path)?, hash_bytes(algorithm, &data));
        }
        Ok(())
    }

    #[test]
    fn test_digest_hex_round_trip() -> Result<()> {
        let digest = hash_bytes(HashAlgorithm::Blake3, b"X");
        let parsed: ContentDigest = digest.to_hex().parse()?;
        assert_eq!(parsed, digest);
        assert_eq!(digest.short().len(), 12);
        assert!("not-hex".parse::<ContentDigest>().is_err());
        Ok(())
    }
}
