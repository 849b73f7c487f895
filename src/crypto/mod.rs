//! Pluggable cryptographic capabilities.
//!
//! Protocol code never calls a curve library directly: every key pair,
//! signature, agreement and derivation goes through a [`CryptoProvider`],
//! which in turn draws its randomness from a [`RandomSource`]. Swapping
//! either lets the managers and X3DH run against fakes in tests.

mod curve25519;
pub use curve25519::Curve25519Provider;

mod random;
pub use random::*;

mod xeddsa;
pub use xeddsa::SIGNATURE_SIZE;

use zeroize::Zeroizing;

use crate::{Error, KeyPair};

/// Key generation, signatures, agreement and key derivation for one curve.
pub trait CryptoProvider: Send + Sync {
    /// Returns `len` bytes from the provider's secure random source.
    fn random_bytes(&self, len: usize) -> Result<Zeroizing<Vec<u8>>, Error>;

    /// Generates a fresh key pair usable for both agreement and signing.
    fn generate_key_pair(&self) -> Result<KeyPair, Error>;

    /// Signs `message` with `private_key`.
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error>;

    /// Checks `signature` over `message` against `public_key`.
    ///
    /// Any mismatch or malformed input yields [`Error::SignatureVerification`].
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), Error>;

    /// Computes the Diffie-Hellman agreement between our private key and
    /// their public key.
    fn diffie_hellman(
        &self,
        private_key: &[u8],
        public_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error>;

    /// Checks that `public_key` is a well-formed public key of this provider.
    ///
    /// Malformed keys yield [`Error::InvalidKey`].
    fn validate_public_key(&self, public_key: &[u8]) -> Result<(), Error>;

    /// Checks that both halves of `key_pair` are well formed and that the
    /// public half belongs to the private half.
    fn validate_key_pair(&self, key_pair: &KeyPair) -> Result<(), Error>;

    /// Derives `output_len` bytes from `input_key_material` bound to `info`.
    fn derive_key(
        &self,
        input_key_material: &[u8],
        info: &[u8],
        output_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, Error>;
}
