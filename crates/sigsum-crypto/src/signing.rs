//! Ed25519 signing and verification.
//!
//! Sigsum fixes the signature scheme to Ed25519: there is no algorithm tag
//! or negotiation, unlike the teacher's `SignatureAlgorithm` enum wrapping
//! P-256 ECDSA.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

/// Length in bytes of an Ed25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;
/// Length in bytes of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Error parsing a [`PublicKey`] from bytes or hex.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublicKeyError {
    #[error("invalid hex encoding")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {PUBLIC_KEY_LEN} bytes, got {0}")]
    Length(usize),
    #[error("bytes do not encode a valid Ed25519 point")]
    InvalidPoint,
}

/// Error parsing a [`Signature`] from bytes or hex.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid hex encoding")]
    Hex(#[from] hex::FromHexError),
    #[error("expected {SIGNATURE_LEN} bytes, got {0}")]
    Length(usize),
}

/// Error verifying a signature against a message and public key.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signature verification failed")]
pub struct VerificationError;

/// An Ed25519 public (verification) key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

/// An Ed25519 signing (private) key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl PublicKey {
    /// Construct a public key from its raw 32-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublicKeyError> {
        let array: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| PublicKeyError::Length(bytes.len()))?;
        let key = VerifyingKey::from_bytes(&array).map_err(|_| PublicKeyError::InvalidPoint)?;
        Ok(Self(key))
    }

    /// Parse a public key from lower-case hex.
    pub fn from_hex(s: &str) -> Result<Self, PublicKeyError> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// The raw 32-byte encoding of this key.
    pub fn as_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }

    /// Lower-case hex encoding of this key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), VerificationError> {
        self.0
            .verify(message, &signature.0)
            .map_err(|_| VerificationError)
    }

    /// The key identifier used to match witnesses and logs against a
    /// policy, and to derive a log's origin string: `SHA256(public key
    /// bytes)`.
    pub fn key_hash(&self) -> crate::hash::Hash {
        crate::hash::Hash::sha256(&self.as_bytes())
    }
}

impl Signature {
    /// Construct a signature from its raw 64-byte encoding.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        let array: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| SignatureError::Length(bytes.len()))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&array)))
    }

    /// Parse a signature from lower-case hex.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// The raw 64-byte encoding of this signature.
    pub fn as_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Lower-case hex encoding of this signature.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }
}

impl PrivateKey {
    /// Generate a new signing key using the given random source.
    pub fn generate(rng: &mut (impl CryptoRng + RngCore)) -> Self {
        Self(SigningKey::generate(rng))
    }

    /// Construct a signing key from its raw 32-byte seed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PublicKeyError> {
        let array: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| PublicKeyError::Length(bytes.len()))?;
        Ok(Self(SigningKey::from_bytes(&array)))
    }

    /// The public key corresponding to this signing key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.0.sign(message))
    }
}

/// Anything capable of producing a signature over raw bytes and reporting
/// the public key that verifies it. Implemented directly by [`PrivateKey`];
/// lets `sigsum-witness` and `sigsum-submit` accept either a bare key or
/// (in a future remote-signing build) a different signer without
/// depending on `ed25519_dalek` themselves.
pub trait Signer {
    fn sign(&self, message: &[u8]) -> Signature;
    fn public_key(&self) -> PublicKey;
}

impl Signer for PrivateKey {
    fn sign(&self, message: &[u8]) -> Signature {
        PrivateKey::sign(self, message)
    }

    fn public_key(&self) -> PublicKey {
        PrivateKey::public_key(self)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

// PrivateKey is intentionally not Debug/Display: it must never end up in a
// log line or error message.

impl FromStr for PublicKey {
    type Err = PublicKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl FromStr for Signature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
