//! SHA-256 hashing.
//!
//! Sigsum wires SHA-256 in directly: there is no hash-agility story to
//! support, unlike the generic `Digest`-parameterized hash type this crate's
//! ancestor used for a pluggable hash algorithm.

use std::fmt;
use std::io::{self, Read};
use std::str::FromStr;

use digest::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Number of bytes in a sigsum hash.
pub const HASH_LEN: usize = 32;

/// A 32-byte SHA-256 output.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_LEN]);

/// Error returned when a byte slice is the wrong length to be a [`Hash`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("expected {HASH_LEN} bytes, got {0}")]
pub struct IncorrectLengthError(pub usize);

/// Error returned when a hex string cannot be parsed as a [`Hash`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashParseError {
    /// The string was not valid lower-case hex.
    #[error("invalid hex encoding")]
    Hex(#[from] hex::FromHexError),
    /// The decoded bytes were not the expected length.
    #[error(transparent)]
    Length(#[from] IncorrectLengthError),
    /// The string contained upper-case hex digits, which sigsum's wire
    /// format never emits and never accepts.
    #[error("hex encoding must be lower-case")]
    NotLowerCase,
}

impl Hash {
    /// Hash a single byte slice.
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash the contents of a reader, streaming rather than buffering the
    /// whole input in memory.
    pub fn sha256_reader(mut reader: impl Read) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// The hash of the empty byte string, `SHA256("")`. This is also the
    /// root hash of a tree with zero leaves.
    pub fn empty() -> Self {
        Self::sha256(&[])
    }

    /// The raw bytes of this hash.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Lower-case hex encoding of this hash.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash from a lower-case hex string. Rejects upper-case hex,
    /// since sigsum's wire grammar (spec.md §6) never produces it.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(HashParseError::NotLowerCase);
        }
        let bytes = hex::decode(s)?;
        Self::try_from(bytes.as_slice()).map_err(HashParseError::from)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; HASH_LEN] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = IncorrectLengthError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| IncorrectLengthError(bytes.len()))?;
        Ok(Self(array))
    }
}

impl TryFrom<Vec<u8>> for Hash {
    type Error = IncorrectLengthError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::try_from(bytes.as_slice())
    }
}

impl FromStr for Hash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_hash_matches_sha256_of_empty_string() {
        assert_eq!(Hash::empty(), Hash::sha256(b""));
        assert_eq!(
            Hash::empty().to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash::sha256(b"leaf");
        let s = h.to_hex();
        assert_eq!(Hash::from_hex(&s).unwrap(), h);
    }

    #[test]
    fn rejects_upper_case_hex() {
        let h = Hash::sha256(b"leaf");
        let s = h.to_hex().to_uppercase();
        assert!(matches!(
            Hash::from_hex(&s),
            Err(HashParseError::NotLowerCase)
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Hash::try_from([0u8; 31].as_slice()).is_err());
        assert!(Hash::try_from([0u8; 33].as_slice()).is_err());
    }

    #[test]
    fn streaming_hash_matches_in_memory_hash() {
        let data = vec![7u8; 100_000];
        let streamed = Hash::sha256_reader(data.as_slice()).unwrap();
        let direct = Hash::sha256(&data);
        assert_eq!(streamed, direct);
    }
}
