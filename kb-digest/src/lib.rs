//! Streaming digests over a fixed set of algorithms, plus hex and
//! hierarchical-path encodings of the result.
//!
//! Grounded on the original `Digest`/`Digest::result` design: a reusable
//! hasher that can be `reset`, fed via `update`, and drained via
//! `finalize`, and a small value type wrapping the raw digest bytes.

use std::fmt;

use openssl::hash::{Hasher, MessageDigest};

pub const SHA1_LEN: usize = 20;
pub const SHA256_LEN: usize = 32;
pub const MD5_LEN: usize = 16;
const MAX_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("openssl error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),
    #[error("digest result too long (len={len} > max={MAX_LEN})")]
    TooLong { len: usize },
    #[error("digest result must have even length (len={len})")]
    OddLength { len: usize },
    #[error("failed to parse digest hex '{hex}'")]
    InvalidHex { hex: String },
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Md5,
}

impl Algorithm {
    fn message_digest(self) -> MessageDigest {
        match self {
            Algorithm::Sha1 => MessageDigest::sha1(),
            Algorithm::Sha256 => MessageDigest::sha256(),
            Algorithm::Md5 => MessageDigest::md5(),
        }
    }

    pub fn len(self) -> usize {
        match self {
            Algorithm::Sha1 => SHA1_LEN,
            Algorithm::Sha256 => SHA256_LEN,
            Algorithm::Md5 => MD5_LEN,
        }
    }
}

/// A reusable streaming hasher for one algorithm.
pub struct Digest {
    algorithm: Algorithm,
    hasher: Hasher,
}

impl Digest {
    pub fn new(algorithm: Algorithm) -> Result<Self, DigestError> {
        let hasher = Hasher::new(algorithm.message_digest())?;
        Ok(Digest { algorithm, hasher })
    }

    pub fn sha1() -> Result<Self, DigestError> {
        Self::new(Algorithm::Sha1)
    }

    pub fn sha256() -> Result<Self, DigestError> {
        Self::new(Algorithm::Sha256)
    }

    pub fn md5() -> Result<Self, DigestError> {
        Self::new(Algorithm::Md5)
    }

    pub fn reset(&mut self) -> Result<(), DigestError> {
        self.hasher.reset()?;
        Ok(())
    }

    pub fn update(&mut self, data: &[u8]) -> Result<(), DigestError> {
        self.hasher.update(data)?;
        Ok(())
    }

    /// Consumes the accumulated input and resets the hasher for the next round.
    pub fn finalize(&mut self) -> Result<DigestResult, DigestError> {
        let md = self.hasher.finish()?;
        Ok(DigestResult {
            bytes: md.to_vec(),
        })
    }

    /// A result of the algorithm's length with every byte zero.
    pub fn zero(&self) -> DigestResult {
        DigestResult {
            bytes: vec![0u8; self.algorithm.len()],
        }
    }
}

/// A digest result: an opaque byte vector tagged with its length.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DigestResult {
    bytes: Vec<u8>,
}

pub const SHA1_ZERO: fn() -> DigestResult = || DigestResult::zero_of_len(SHA1_LEN);
pub const SHA256_ZERO: fn() -> DigestResult = || DigestResult::zero_of_len(SHA256_LEN);
pub const MD5_ZERO: fn() -> DigestResult = || DigestResult::zero_of_len(MD5_LEN);

impl DigestResult {
    fn zero_of_len(len: usize) -> Self {
        DigestResult {
            bytes: vec![0u8; len],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        DigestResult { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Hierarchical path form: `dirs` leading two-hex-char directory
    /// components, then the remaining hex as the filename.
    pub fn path(&self, dirs: u8) -> std::path::PathBuf {
        let hex = self.hex();
        let dirs = dirs as usize;
        let mut out = std::path::PathBuf::new();
        let mut chars = hex.chars();
        for _ in 0..dirs.min(self.bytes.len()) {
            let component: String = (&mut chars).take(2).collect();
            out.push(component);
        }
        let rest: String = chars.collect();
        out.push(rest);
        out
    }

    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    pub fn parse(hex_str: &str) -> Result<Self, DigestError> {
        if hex_str.len() > 2 * MAX_LEN {
            return Err(DigestError::TooLong {
                len: hex_str.len(),
            });
        }
        if hex_str.len() % 2 != 0 {
            return Err(DigestError::OddLength {
                len: hex_str.len(),
            });
        }
        let bytes = hex::decode(hex_str).map_err(|_| DigestError::InvalidHex {
            hex: hex_str.to_string(),
        })?;
        Ok(DigestResult { bytes })
    }
}

impl fmt::Display for DigestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

fn sum(algorithm: Algorithm, s: &str) -> Result<String, DigestError> {
    let mut digest = Digest::new(algorithm)?;
    digest.update(s.as_bytes())?;
    Ok(digest.finalize()?.hex())
}

pub fn sha1_sum(s: &str) -> Result<String, DigestError> {
    sum(Algorithm::Sha1, s)
}

pub fn sha256_sum(s: &str) -> Result<String, DigestError> {
    sum(Algorithm::Sha256, s)
}

pub fn md5_sum(s: &str) -> Result<String, DigestError> {
    sum(Algorithm::Md5, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha1_vector() {
        assert_eq!(
            sha1_sum("Hello OpenSSL krico-backup world").unwrap(),
            "da8eab09d9a8dd6b450cb2184b9d1135cc5260c9"
        );
    }

    #[test]
    fn md5_vector() {
        assert_eq!(
            md5_sum("Hello OpenSSL krico-backup world").unwrap(),
            "956c693dd8533233810472f64715964c"
        );
    }

    #[test]
    fn zero_values_are_length_distinct() {
        assert!(SHA1_ZERO().is_zero());
        assert!(SHA256_ZERO().is_zero());
        assert!(MD5_ZERO().is_zero());
        assert_ne!(SHA1_ZERO(), SHA256_ZERO());
        assert_ne!(SHA1_ZERO(), MD5_ZERO());
        assert_ne!(SHA256_ZERO(), MD5_ZERO());
    }

    #[test]
    fn reset_then_update_is_stable() {
        let mut d = Digest::sha256().unwrap();
        d.update(b"abc").unwrap();
        let first = d.finalize().unwrap();
        d.reset().unwrap();
        d.update(b"abc").unwrap();
        let second = d.finalize().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn path_shape() {
        let d = DigestResult::parse(&"ab".repeat(20)).unwrap();
        let p = d.path(1);
        assert_eq!(p, std::path::PathBuf::from("ab").join("ab".repeat(19)));
        let p2 = d.path(2);
        assert_eq!(
            p2,
            std::path::PathBuf::from("ab").join("ab").join("ab".repeat(18))
        );
    }

    #[test]
    fn parse_rejects_odd_length() {
        assert!(matches!(
            DigestResult::parse("abc"),
            Err(DigestError::OddLength { .. })
        ));
    }
}
