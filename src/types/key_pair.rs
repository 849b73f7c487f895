use std::fmt;
use std::ops::Deref;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::Error;

/// Asymmetric key pair as raw bytes, independent of the curve in use.
///
/// The private half never leaves the local device: it is only written to the
/// secure key store and is wiped from memory when the pair is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    public_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl KeyPair {
    pub fn new(public_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &crate::codec::encode(&self.public_key))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// The long-term identity key pair of this installation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityKeyPair(KeyPair);

impl IdentityKeyPair {
    pub fn new(key_pair: KeyPair) -> Self {
        Self(key_pair)
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.0
    }
}

impl Deref for IdentityKeyPair {
    type Target = KeyPair;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Identifier of a signed or one-time pre-key, limited to 24 bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(u32);

impl KeyId {
    /// Largest id representable in 24 bits.
    pub const MAX: u32 = 0x00FF_FFFF;

    /// Smallest valid id. Zero is reserved for "no key".
    pub const MIN: u32 = 1;

    pub fn new(value: u32) -> Result<Self, Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidKeyId(value))
        }
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Returns the following id, wrapping from [`KeyId::MAX`] back to [`KeyId::MIN`].
    pub fn next(self) -> Self {
        if self.0 >= Self::MAX {
            Self(Self::MIN)
        } else {
            Self(self.0 + 1)
        }
    }
}

impl TryFrom<u32> for KeyId {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of the remote party a session is bound to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteAddress {
    name: String,
    device_id: u32,
}

impl RemoteAddress {
    pub fn new(name: impl Into<String>, device_id: u32) -> Self {
        Self {
            name: name.into(),
            device_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_range() {
        assert!(KeyId::new(0).is_err());
        assert!(KeyId::new(1).is_ok());
        assert!(KeyId::new(KeyId::MAX).is_ok());
        assert_eq!(
            KeyId::new(KeyId::MAX + 1),
            Err(Error::InvalidKeyId(KeyId::MAX + 1))
        );
    }

    #[test]
    fn test_key_id_wraps() {
        let last = KeyId::new(KeyId::MAX).unwrap();
        assert_eq!(last.next().value(), KeyId::MIN);
        assert_eq!(KeyId::new(41).unwrap().next().value(), 42);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = KeyPair::new(vec![1, 2, 3], vec![0xAB; 32]);
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains(&crate::codec::encode(&[0xAB; 32])));
    }

    #[test]
    fn test_remote_address_display() {
        assert_eq!(RemoteAddress::new("bob", 1).to_string(), "bob.1");
    }
}
