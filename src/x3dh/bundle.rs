use prost::Message;

use crate::proto::{KeyBundleProto, PreKeyProto, SCHEMA_VERSION, SignedPreKeyProto};
use crate::{Error, IdentityKeyPair, KeyId, OneTimePreKey, SignedPreKey, codec};

/// Public half of a signed pre-key as published in a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPreKeyPublic {
    pub key_id: KeyId,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Public half of a one-time pre-key as published in a bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeyPublic {
    pub key_id: KeyId,
    pub public_key: Vec<u8>,
}

/// The public keys another party needs to start a session with us.
///
/// A bundle never carries private key bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBundle {
    pub identity_key: Vec<u8>,
    pub signed_pre_key: SignedPreKeyPublic,
    pub pre_key: Option<PreKeyPublic>,
}

/// Builds the publishable bundle from local keys, copying only public fields
/// and the signed pre-key signature.
pub fn assemble_bundle(
    identity: &IdentityKeyPair,
    signed_pre_key: &SignedPreKey,
    one_time_pre_key: Option<&OneTimePreKey>,
) -> Result<KeyBundle, Error> {
    require(identity.public_key(), "identity key")?;
    require(signed_pre_key.public_key(), "signed pre-key public key")?;
    require(signed_pre_key.signature(), "signed pre-key signature")?;

    let pre_key = match one_time_pre_key {
        Some(pre_key) => {
            require(pre_key.public_key(), "one-time pre-key public key")?;
            Some(PreKeyPublic {
                key_id: pre_key.key_id(),
                public_key: pre_key.public_key().to_vec(),
            })
        }
        None => None,
    };

    Ok(KeyBundle {
        identity_key: identity.public_key().to_vec(),
        signed_pre_key: SignedPreKeyPublic {
            key_id: signed_pre_key.key_id(),
            public_key: signed_pre_key.public_key().to_vec(),
            signature: signed_pre_key.signature().to_vec(),
        },
        pre_key,
    })
}

fn require(field: &[u8], what: &str) -> Result<(), Error> {
    if field.is_empty() {
        return Err(Error::InvalidBundleInput(format!("{what} is empty")));
    }
    Ok(())
}

impl KeyBundle {
    /// Checks that every key and the signature is present. Key encodings are
    /// checked by the crypto provider when the bundle is used.
    pub fn validate(&self) -> Result<(), Error> {
        require(&self.identity_key, "identity key")?;
        require(&self.signed_pre_key.public_key, "signed pre-key public key")?;
        require(&self.signed_pre_key.signature, "signed pre-key signature")?;
        if let Some(pre_key) = &self.pre_key {
            require(&pre_key.public_key, "one-time pre-key public key")?;
        }
        Ok(())
    }

    /// Protocol Buffers wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        KeyBundleProto {
            version: SCHEMA_VERSION,
            identity_key: self.identity_key.clone(),
            signed_pre_key: Some(SignedPreKeyProto {
                key_id: self.signed_pre_key.key_id.value(),
                public_key: self.signed_pre_key.public_key.clone(),
                signature: self.signed_pre_key.signature.clone(),
            }),
            pre_key: self.pre_key.as_ref().map(|pre_key| PreKeyProto {
                key_id: pre_key.key_id.value(),
                public_key: pre_key.public_key.clone(),
            }),
        }
        .encode_to_vec()
    }

    /// Decodes and validates an untrusted wire-form bundle.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let proto = KeyBundleProto::from_bytes(bytes)
            .map_err(|err| Error::InvalidBundleInput(err.to_string()))?;

        let signed_pre_key = proto
            .signed_pre_key
            .ok_or_else(|| Error::InvalidBundleInput("missing signed pre-key".to_string()))?;

        let bundle = Self {
            identity_key: proto.identity_key,
            signed_pre_key: SignedPreKeyPublic {
                key_id: bundle_key_id(signed_pre_key.key_id)?,
                public_key: signed_pre_key.public_key,
                signature: signed_pre_key.signature,
            },
            pre_key: match proto.pre_key {
                Some(pre_key) => Some(PreKeyPublic {
                    key_id: bundle_key_id(pre_key.key_id)?,
                    public_key: pre_key.public_key,
                }),
                None => None,
            },
        };

        bundle.validate()?;
        Ok(bundle)
    }

    /// Text form for transports that only carry strings.
    pub fn encode(&self) -> String {
        codec::encode(&self.to_bytes())
    }

    pub fn decode(text: &str) -> Result<Self, Error> {
        Self::from_bytes(&codec::decode(text)?)
    }
}

fn bundle_key_id(value: u32) -> Result<KeyId, Error> {
    KeyId::new(value).map_err(|err| Error::InvalidBundleInput(err.to_string()))
}
