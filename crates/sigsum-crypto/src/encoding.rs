//! Signed-bytes plumbing shared by every wire type that gets signed.
//!
//! Grounded on the teacher's `Signable` trait (`crates/warg-crypto/src/
//! encoding.rs`): there, a type supplies a fixed `PREFIX` and an `Encode`
//! impl, and the trait glues prefix + encoded bytes together before
//! signing/verifying. Sigsum's wire layouts (spec.md §4.2/§4.3) are each a
//! fixed, bespoke byte or ASCII-line layout rather than a generic
//! leb128-prefixed encoding, so this trait keeps only the `sign`/`verify`
//! plumbing and leaves `signed_bytes` to be implemented per type.

use base64::engine::general_purpose::STANDARD as BASE64_STD;
use base64::Engine as _;
use thiserror::Error;

use crate::signing::{PrivateKey, PublicKey, Signature, Signer, VerificationError};

/// Error decoding a standard-alphabet base64 string into fixed-size bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base64Error {
    #[error("invalid base64 encoding")]
    Decode(#[from] base64::DecodeError),
    #[error("expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// Encode `bytes` using the standard base64 alphabet with padding
/// (`base64_std` in the checkpoint grammar).
pub fn base64_encode(bytes: &[u8]) -> String {
    BASE64_STD.encode(bytes)
}

/// Decode a standard-alphabet, padded base64 string into exactly `N` bytes.
pub fn base64_decode_exact<const N: usize>(s: &str) -> Result<[u8; N], Base64Error> {
    let bytes = BASE64_STD.decode(s)?;
    bytes.try_into().map_err(|v: Vec<u8>| Base64Error::Length {
        expected: N,
        actual: v.len(),
    })
}

/// A type with a canonical, uniquely-decodable byte representation that
/// gets signed directly (no further hashing or framing by the signer).
pub trait Signable {
    /// The exact bytes that are signed over.
    fn signed_bytes(&self) -> Vec<u8>;

    /// Sign this value with `signer`.
    fn sign(&self, signer: &impl Signer) -> Signature {
        signer.sign(&self.signed_bytes())
    }

    /// Verify `signature` over this value's canonical bytes.
    fn verify(&self, key: &PublicKey, signature: &Signature) -> Result<(), VerificationError> {
        key.verify(&self.signed_bytes(), signature)
    }
}

/// Convenience: sign `value`'s canonical bytes directly with a raw key,
/// for call sites that don't want to route through the `Signer` trait.
pub fn sign<T: Signable>(value: &T, key: &PrivateKey) -> Signature {
    key.sign(&value.signed_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::OsRng;

    #[test]
    fn base64_roundtrip() {
        let bytes = [7u8; 32];
        let s = base64_encode(&bytes);
        let decoded: [u8; 32] = base64_decode_exact(&s).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn base64_rejects_wrong_length() {
        let s = base64_encode(&[1u8; 31]);
        assert!(matches!(
            base64_decode_exact::<32>(&s),
            Err(Base64Error::Length {
                expected: 32,
                actual: 31
            })
        ));
    }

    struct Message(Vec<u8>);

    impl Signable for Message {
        fn signed_bytes(&self) -> Vec<u8> {
            self.0.clone()
        }
    }

    #[test]
    fn sign_and_verify_via_signable() {
        let key = PrivateKey::generate(&mut OsRng);
        let msg = Message(b"hello sigsum".to_vec());
        let sig = msg.sign(&key);
        msg.verify(&key.public_key(), &sig).unwrap();
    }
}
