//! Cryptographic primitives for the sigsum transparency log: SHA-256
//! hashing and Ed25519 signing, with no algorithm agility in either
//! direction.

pub mod encoding;
pub mod hash;
pub mod signing;

pub use encoding::{base64_decode_exact, base64_encode, Base64Error, Signable};
pub use hash::{Hash, HashParseError, IncorrectLengthError, HASH_LEN};
pub use signing::{
    PrivateKey, PublicKey, PublicKeyError, Signature, SignatureError, Signer, VerificationError,
    PUBLIC_KEY_LEN, SIGNATURE_LEN,
};
