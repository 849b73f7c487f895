use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, OsRandom, RandomSource, SIGNATURE_SIZE, xeddsa};
use crate::types::X25519_KEY_SIZE;
use crate::{Error, KeyPair, X25519PublicKey, X25519Secret};

/// Curve25519 provider: X25519 agreement, XEdDSA signatures over the same
/// keys and HKDF-SHA256 derivation.
pub struct Curve25519Provider {
    random: Box<dyn RandomSource>,
}

impl Curve25519Provider {
    /// Creates a provider backed by the operating system's random source.
    pub fn new() -> Self {
        Self::with_random_source(OsRandom)
    }

    pub fn with_random_source(random: impl RandomSource + 'static) -> Self {
        Self {
            random: Box::new(random),
        }
    }
}

impl Default for Curve25519Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for Curve25519Provider {
    fn random_bytes(&self, len: usize) -> Result<Zeroizing<Vec<u8>>, Error> {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        self.random.fill_bytes(bytes.as_mut_slice())?;
        Ok(bytes)
    }

    fn generate_key_pair(&self) -> Result<KeyPair, Error> {
        let mut seed = Box::new([0u8; X25519_KEY_SIZE]);
        self.random.fill_bytes(seed.as_mut_slice())?;
        let secret = X25519Secret::from(seed);

        Ok(KeyPair::new(
            secret.public_key().to_bytes().to_vec(),
            secret.as_bytes().to_vec(),
        ))
    }

    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
        let secret = X25519Secret::try_from(private_key)?;
        let signature = xeddsa::sign(message, &secret, self.random.as_ref())?;
        Ok(signature.to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), Error> {
        let public_key =
            X25519PublicKey::try_from(public_key).map_err(|_| Error::SignatureVerification)?;
        let signature: &[u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| Error::SignatureVerification)?;
        xeddsa::verify(message, &public_key, signature)
    }

    fn diffie_hellman(
        &self,
        private_key: &[u8],
        public_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let secret = X25519Secret::try_from(private_key)?;
        let public_key = X25519PublicKey::try_from(public_key)?;

        let shared = secret.dh(&public_key);
        if !shared.was_contributory() {
            return Err(Error::Crypto(
                "Diffie-Hellman with a low-order public key".to_string(),
            ));
        }

        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }

    fn validate_public_key(&self, public_key: &[u8]) -> Result<(), Error> {
        X25519PublicKey::try_from(public_key).map(|_| ())
    }

    fn validate_key_pair(&self, key_pair: &KeyPair) -> Result<(), Error> {
        let public_key = X25519PublicKey::try_from(key_pair.public_key())?;
        let secret = X25519Secret::try_from(key_pair.private_key())?;
        if secret.public_key() != public_key {
            return Err(Error::InvalidKey(
                "public key does not match private key".to_string(),
            ));
        }
        Ok(())
    }

    fn derive_key(
        &self,
        input_key_material: &[u8],
        info: &[u8],
        output_len: usize,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let hkdf = Hkdf::<Sha256>::new(None, input_key_material);

        let mut output = Zeroizing::new(vec![0u8; output_len]);
        hkdf.expand(info, output.as_mut_slice())
            .map_err(|_| Error::Crypto("HKDF expansion failed".to_string()))?;

        Ok(output)
    }
}
