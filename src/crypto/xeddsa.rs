//! XEdDSA signatures: Ed25519-compatible signatures made directly with
//! X25519 key pairs, so one key serves both agreement and signing.
//!
//! <https://signal.org/docs/specifications/xeddsa/>

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::{Scalar, clamp_integer};
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::crypto::RandomSource;
use crate::{Error, X25519PublicKey, X25519Secret};

/// 512-bit signature.
pub const SIGNATURE_SIZE: usize = 64;

/// hash1 domain separator: 0xFE followed by 31 bytes of 0xFF.
const HASH_1_PREFIX: [u8; 32] = {
    let mut prefix = [0xFFu8; 32];
    prefix[0] = 0xFE;
    prefix
};

fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 64];
    out.copy_from_slice(&digest);
    out
}

/// Signs `message` with an X25519 secret key.
pub(crate) fn sign(
    message: &[u8],
    secret_key: &X25519Secret,
    random: &dyn RandomSource,
) -> Result<[u8; SIGNATURE_SIZE], Error> {
    // Z = 64 bytes of fresh randomness
    let mut cap_z = [0u8; 64];
    random.fill_bytes(&mut cap_z)?;

    // calculate_key_pair(k): E = kB, A = E with the sign bit cleared
    let mut k = Scalar::from_bytes_mod_order(clamp_integer(*secret_key.as_bytes()));
    let cap_e = &k * ED25519_BASEPOINT_TABLE;
    let mut cap_a = cap_e.compress();
    let sign_bit = cap_a.0[31] >> 7;
    cap_a.0[31] &= 0b0111_1111;
    let mut a = if sign_bit == 1 { -k } else { k };

    // r = hash1(a || M || Z) (mod q)
    let mut r =
        Scalar::from_bytes_mod_order_wide(&sha512(&[&HASH_1_PREFIX, a.as_bytes(), message, &cap_z]));

    // R = rB
    let cap_r = (&r * ED25519_BASEPOINT_TABLE).compress();

    // h = hash(R || A || M) (mod q)
    let h = Scalar::from_bytes_mod_order_wide(&sha512(&[
        cap_r.as_bytes(),
        cap_a.as_bytes(),
        message,
    ]));

    // s = r + ha (mod q)
    let s = r + h * a;

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(cap_r.as_bytes());
    signature[32..].copy_from_slice(s.as_bytes());

    k.zeroize();
    a.zeroize();
    r.zeroize();
    cap_z.zeroize();

    Ok(signature)
}

/// Verifies an XEdDSA signature against the signer's X25519 public key.
///
/// The Montgomery key is mapped to its Edwards form with a zero sign bit,
/// after which the signature is an ordinary Ed25519 signature and is checked
/// with strict verification (canonical `s`, no small-order points).
pub(crate) fn verify(
    message: &[u8],
    public_key: &X25519PublicKey,
    signature: &[u8; SIGNATURE_SIZE],
) -> Result<(), Error> {
    let edwards = MontgomeryPoint(public_key.to_bytes())
        .to_edwards(0)
        .ok_or(Error::SignatureVerification)?;
    let verifying_key = VerifyingKey::from_bytes(edwards.compress().as_bytes())
        .map_err(|_| Error::SignatureVerification)?;

    verifying_key
        .verify_strict(message, &Signature::from_bytes(signature))
        .map_err(|_| Error::SignatureVerification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SeededRandom;

    fn secret(random: &SeededRandom) -> X25519Secret {
        let mut bytes = Box::new([0u8; 32]);
        random.fill_bytes(bytes.as_mut_slice()).unwrap();
        X25519Secret::from(bytes)
    }

    #[test]
    fn test_sign_and_verify() {
        let random = SeededRandom::from_seed([1; 32]);
        let secret_key = secret(&random);
        let public_key = secret_key.public_key();

        let signature = sign(b"Hello, Bob!", &secret_key, &random).unwrap();
        assert!(verify(b"Hello, Bob!", &public_key, &signature).is_ok());
    }

    #[test]
    fn test_failed_verify() {
        let random = SeededRandom::from_seed([2; 32]);
        let secret_key = secret(&random);
        let public_key = secret_key.public_key();
        let signature = sign(b"Hello, Bob!", &secret_key, &random).unwrap();

        let other_key = secret(&random);
        let other_signature = sign(b"Hello, Bob!", &other_key, &random).unwrap();

        assert_eq!(
            verify(b"Hello, Eve!", &public_key, &signature),
            Err(Error::SignatureVerification)
        );
        assert!(verify(b"Hello, Bob!", &other_key.public_key(), &signature).is_err());
        assert!(verify(b"Hello, Bob!", &public_key, &other_signature).is_err());
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let random = SeededRandom::from_seed([3; 32]);
        let secret_key = secret(&random);
        let public_key = secret_key.public_key();
        let signature = sign(b"pre-key", &secret_key, &random).unwrap();

        for bit in 0..SIGNATURE_SIZE * 8 {
            let mut tampered = signature;
            tampered[bit / 8] ^= 1 << (bit % 8);
            assert!(
                verify(b"pre-key", &public_key, &tampered).is_err(),
                "flipping bit {bit} was accepted"
            );
        }
    }

    #[test]
    fn test_signatures_are_randomized() {
        let random = SeededRandom::from_seed([4; 32]);
        let secret_key = secret(&random);

        let first = sign(b"same message", &secret_key, &random).unwrap();
        let second = sign(b"same message", &secret_key, &random).unwrap();
        assert_ne!(first, second);
    }
}
