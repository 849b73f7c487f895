use x25519_dalek::{PublicKey, SharedSecret, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

/// Size of an X25519 public or secret key in bytes.
pub const X25519_KEY_SIZE: usize = 32;

/// Public Curve25519 key in Montgomery form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct X25519PublicKey(PublicKey);

impl X25519PublicKey {
    pub fn as_bytes(&self) -> &[u8; X25519_KEY_SIZE] {
        self.0.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; X25519_KEY_SIZE] {
        self.0.to_bytes()
    }
}

impl From<[u8; X25519_KEY_SIZE]> for X25519PublicKey {
    fn from(bytes: [u8; X25519_KEY_SIZE]) -> Self {
        Self(PublicKey::from(bytes))
    }
}

impl TryFrom<&[u8]> for X25519PublicKey {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; X25519_KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "public key must be {X25519_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from(bytes))
    }
}

impl AsRef<PublicKey> for X25519PublicKey {
    fn as_ref(&self) -> &PublicKey {
        &self.0
    }
}

/// Secret Curve25519 scalar, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct X25519Secret(Box<StaticSecret>);

impl X25519Secret {
    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> SharedSecret {
        self.0.diffie_hellman(public_key.as_ref())
    }

    pub(crate) fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey(PublicKey::from(self.0.as_ref()))
    }

    pub(crate) fn as_bytes(&self) -> &[u8; X25519_KEY_SIZE] {
        self.0.as_bytes()
    }
}

impl From<Box<[u8; X25519_KEY_SIZE]>> for X25519Secret {
    fn from(mut bytes: Box<[u8; X25519_KEY_SIZE]>) -> Self {
        let secret = StaticSecret::from(*bytes);
        bytes.zeroize();
        Self(Box::new(secret))
    }
}

impl TryFrom<&[u8]> for X25519Secret {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != X25519_KEY_SIZE {
            return Err(Error::InvalidKey(format!(
                "private key must be {X25519_KEY_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut owned = Box::new([0u8; X25519_KEY_SIZE]);
        owned.copy_from_slice(bytes);
        Ok(Self::from(owned))
    }
}
