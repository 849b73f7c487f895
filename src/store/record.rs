use std::fmt;
use std::str::FromStr;

use zeroize::{Zeroize, Zeroizing};

use crate::proto::{
    KIND_IDENTITY_KEY_PAIR, KIND_KEY_ID, KIND_ONE_TIME_PRE_KEY, KIND_SIGNED_PRE_KEY,
    KeyRecordProto, SCHEMA_VERSION,
};
use crate::{Error, IdentityKeyPair, KeyId, KeyPair, OneTimePreKey, SignedPreKey};

const IDENTITY_KEY_PAIR: &str = "identity_key_pair";
const SIGNED_PRE_KEY_PREFIX: &str = "signed_pre_key_";
const ONE_TIME_PRE_KEY_PREFIX: &str = "pre_key_";
const NEXT_SIGNED_PRE_KEY_ID: &str = "next_signed_pre_key_id";
const NEXT_ONE_TIME_PRE_KEY_ID: &str = "next_pre_key_id";
const CURRENT_SIGNED_PRE_KEY: &str = "current_signed_pre_key";

/// Kinds of pre-key that are stored under a [`KeyId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    SignedPreKey,
    OneTimePreKey,
}

/// Name of a record in the key store.
///
/// Renders as `identity_key_pair`, `signed_pre_key_42`, `pre_key_7`,
/// `next_signed_pre_key_id`, `next_pre_key_id` or `current_signed_pre_key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordName {
    IdentityKeyPair,
    SignedPreKey(KeyId),
    OneTimePreKey(KeyId),
    /// Allocation counter for signed pre-key ids.
    NextSignedPreKeyId,
    /// Allocation counter for one-time pre-key ids.
    NextOneTimePreKeyId,
    /// Id of the signed pre-key currently published.
    CurrentSignedPreKey,
}

impl RecordName {
    /// Returns the pre-key id this name is bound to, if any.
    pub fn key_id(&self, kind: RecordKind) -> Option<KeyId> {
        match (self, kind) {
            (Self::SignedPreKey(id), RecordKind::SignedPreKey)
            | (Self::OneTimePreKey(id), RecordKind::OneTimePreKey) => Some(*id),
            _ => None,
        }
    }

    /// Whether `record` may be stored under this name.
    pub(crate) fn admits(&self, record: &KeyRecord) -> bool {
        match (self, record) {
            (Self::IdentityKeyPair, KeyRecord::IdentityKeyPair(_)) => true,
            (Self::SignedPreKey(id), KeyRecord::SignedPreKey(key)) => key.key_id() == *id,
            (Self::OneTimePreKey(id), KeyRecord::OneTimePreKey(key)) => key.key_id() == *id,
            (
                Self::NextSignedPreKeyId | Self::NextOneTimePreKeyId | Self::CurrentSignedPreKey,
                KeyRecord::KeyId(_),
            ) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IdentityKeyPair => f.write_str(IDENTITY_KEY_PAIR),
            Self::SignedPreKey(id) => write!(f, "{SIGNED_PRE_KEY_PREFIX}{id}"),
            Self::OneTimePreKey(id) => write!(f, "{ONE_TIME_PRE_KEY_PREFIX}{id}"),
            Self::NextSignedPreKeyId => f.write_str(NEXT_SIGNED_PRE_KEY_ID),
            Self::NextOneTimePreKeyId => f.write_str(NEXT_ONE_TIME_PRE_KEY_ID),
            Self::CurrentSignedPreKey => f.write_str(CURRENT_SIGNED_PRE_KEY),
        }
    }
}

impl FromStr for RecordName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_id = |digits: &str| -> Result<KeyId, Error> {
            let value = digits
                .parse::<u32>()
                .map_err(|_| Error::Serde(format!("Unknown record name: {s}")))?;
            KeyId::new(value)
        };

        match s {
            IDENTITY_KEY_PAIR => Ok(Self::IdentityKeyPair),
            NEXT_SIGNED_PRE_KEY_ID => Ok(Self::NextSignedPreKeyId),
            NEXT_ONE_TIME_PRE_KEY_ID => Ok(Self::NextOneTimePreKeyId),
            CURRENT_SIGNED_PRE_KEY => Ok(Self::CurrentSignedPreKey),
            _ => {
                if let Some(digits) = s.strip_prefix(SIGNED_PRE_KEY_PREFIX) {
                    Ok(Self::SignedPreKey(parse_id(digits)?))
                } else if let Some(digits) = s.strip_prefix(ONE_TIME_PRE_KEY_PREFIX) {
                    Ok(Self::OneTimePreKey(parse_id(digits)?))
                } else {
                    Err(Error::Serde(format!("Unknown record name: {s}")))
                }
            }
        }
    }
}

/// A decoded record of the key store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyRecord {
    IdentityKeyPair(IdentityKeyPair),
    SignedPreKey(SignedPreKey),
    OneTimePreKey(OneTimePreKey),
    /// Counter or pointer records.
    KeyId(KeyId),
}

impl KeyRecord {
    /// Serializes the record. The returned buffer holds private key bytes and
    /// is wiped on drop.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        let mut proto = KeyRecordProto {
            version: SCHEMA_VERSION,
            ..Default::default()
        };

        match self {
            Self::IdentityKeyPair(identity) => {
                proto.kind = KIND_IDENTITY_KEY_PAIR;
                proto.public_key = identity.public_key().to_vec();
                proto.private_key = identity.private_key().to_vec();
            }
            Self::SignedPreKey(key) => {
                proto.kind = KIND_SIGNED_PRE_KEY;
                proto.key_id = key.key_id().value();
                proto.public_key = key.public_key().to_vec();
                proto.private_key = key.key_pair().private_key().to_vec();
                proto.signature = key.signature().to_vec();
                proto.created_at = key.created_at();
            }
            Self::OneTimePreKey(key) => {
                proto.kind = KIND_ONE_TIME_PRE_KEY;
                proto.key_id = key.key_id().value();
                proto.public_key = key.public_key().to_vec();
                proto.private_key = key.key_pair().private_key().to_vec();
            }
            Self::KeyId(id) => {
                proto.kind = KIND_KEY_ID;
                proto.key_id = id.value();
            }
        }

        let bytes = proto.to_bytes();
        proto.private_key.zeroize();
        bytes
    }

    /// Decodes and validates a record.
    ///
    /// Only the layout is checked here. Whether the key material is valid
    /// for a given curve is up to the crypto provider.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut proto = KeyRecordProto::from_bytes(bytes)?;
        let record = Self::from_proto(&proto);
        proto.private_key.zeroize();

        let record = record?;
        record.validate()?;
        Ok(record)
    }

    /// Layout checks shared by the store's write and read paths: key
    /// material and signatures must be present.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::IdentityKeyPair(identity) => require_key_pair(identity.key_pair()),
            Self::SignedPreKey(key) => {
                require_key_pair(key.key_pair())?;
                if key.signature().is_empty() {
                    return Err(Error::Serde("Missing signature".to_string()));
                }
                Ok(())
            }
            Self::OneTimePreKey(key) => require_key_pair(key.key_pair()),
            Self::KeyId(_) => Ok(()),
        }
    }

    fn from_proto(proto: &KeyRecordProto) -> Result<Self, Error> {
        let key_pair = || KeyPair::new(proto.public_key.clone(), proto.private_key.clone());

        match proto.kind {
            KIND_IDENTITY_KEY_PAIR => Ok(Self::IdentityKeyPair(IdentityKeyPair::new(key_pair()))),
            KIND_SIGNED_PRE_KEY => Ok(Self::SignedPreKey(SignedPreKey::new(
                KeyId::new(proto.key_id)?,
                key_pair(),
                proto.signature.clone(),
                proto.created_at,
            ))),
            KIND_ONE_TIME_PRE_KEY => Ok(Self::OneTimePreKey(OneTimePreKey::new(
                KeyId::new(proto.key_id)?,
                key_pair(),
            ))),
            KIND_KEY_ID => Ok(Self::KeyId(KeyId::new(proto.key_id)?)),
            kind => Err(Error::Serde(format!("Unknown record kind: {kind}"))),
        }
    }
}

fn require_key_pair(key_pair: &KeyPair) -> Result<(), Error> {
    if key_pair.public_key().is_empty() {
        return Err(Error::Serde("Missing public key".to_string()));
    }
    if key_pair.private_key().is_empty() {
        return Err(Error::Serde("Missing private key".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CryptoProvider, Curve25519Provider, SIGNATURE_SIZE};

    fn key_id(value: u32) -> KeyId {
        KeyId::new(value).unwrap()
    }

    #[test]
    fn test_record_names() {
        let names = [
            (RecordName::IdentityKeyPair, "identity_key_pair"),
            (RecordName::SignedPreKey(key_id(42)), "signed_pre_key_42"),
            (RecordName::OneTimePreKey(key_id(7)), "pre_key_7"),
            (RecordName::NextSignedPreKeyId, "next_signed_pre_key_id"),
            (RecordName::NextOneTimePreKeyId, "next_pre_key_id"),
            (RecordName::CurrentSignedPreKey, "current_signed_pre_key"),
        ];

        for (name, text) in names {
            assert_eq!(name.to_string(), text);
            assert_eq!(text.parse::<RecordName>().unwrap(), name);
        }

        assert!("pre_key_0".parse::<RecordName>().is_err());
        assert!("pre_key_x".parse::<RecordName>().is_err());
        assert!("session_bob".parse::<RecordName>().is_err());
    }

    #[test]
    fn test_signed_pre_key_record() {
        let provider = Curve25519Provider::new();
        let key = SignedPreKey::new(
            key_id(3),
            provider.generate_key_pair().unwrap(),
            vec![0x55; SIGNATURE_SIZE],
            1_700_000_000,
        );
        let record = KeyRecord::SignedPreKey(key);

        let decoded = KeyRecord::from_bytes(&record.to_bytes()).unwrap();
        assert_eq!(decoded, record);
        assert!(RecordName::SignedPreKey(key_id(3)).admits(&decoded));
        assert!(!RecordName::SignedPreKey(key_id(4)).admits(&decoded));
        assert!(!RecordName::OneTimePreKey(key_id(3)).admits(&decoded));
    }

    #[test]
    fn test_missing_key_material_is_rejected() {
        let provider = Curve25519Provider::new();
        let key_pair = provider.generate_key_pair().unwrap();

        let proto = KeyRecordProto {
            version: SCHEMA_VERSION,
            kind: KIND_IDENTITY_KEY_PAIR,
            public_key: key_pair.public_key().to_vec(),
            ..Default::default()
        };
        assert!(matches!(
            KeyRecord::from_bytes(&proto.to_bytes()),
            Err(Error::Serde(_))
        ));

        let unsigned = KeyRecord::SignedPreKey(SignedPreKey::new(key_id(2), key_pair, Vec::new(), 0));
        assert!(matches!(unsigned.validate(), Err(Error::Serde(_))));
        assert!(matches!(
            KeyRecord::from_bytes(&unsigned.to_bytes()),
            Err(Error::Serde(_))
        ));
    }

    #[test]
    fn test_key_encoding_is_left_to_the_provider() {
        // 33-byte public keys with a type prefix decode unchanged
        let mut public_key = vec![0x05];
        public_key.extend_from_slice(&[9; 32]);
        let record = KeyRecord::OneTimePreKey(OneTimePreKey::new(
            key_id(5),
            KeyPair::new(public_key, vec![3; 32]),
        ));

        assert_eq!(KeyRecord::from_bytes(&record.to_bytes()).unwrap(), record);
    }

    #[test]
    fn test_counter_record_rejects_zero() {
        let proto = KeyRecordProto {
            version: SCHEMA_VERSION,
            kind: KIND_KEY_ID,
            key_id: 0,
            ..Default::default()
        };

        assert_eq!(
            KeyRecord::from_bytes(&proto.to_bytes()),
            Err(Error::InvalidKeyId(0))
        );
    }
}
