//! Protocol Buffers messages for stored key records and published bundles.

use prost::Message;
use zeroize::Zeroizing;

use crate::Error;

/// Current schema version of every message in this module.
pub(crate) const SCHEMA_VERSION: u32 = 1;

pub(crate) const KIND_IDENTITY_KEY_PAIR: u32 = 1;
pub(crate) const KIND_SIGNED_PRE_KEY: u32 = 2;
pub(crate) const KIND_ONE_TIME_PRE_KEY: u32 = 3;
pub(crate) const KIND_KEY_ID: u32 = 4;

#[derive(Clone, PartialEq, Message)]
pub(crate) struct KeyRecordProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(uint32, tag = "3")]
    pub key_id: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub private_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "6")]
    pub signature: Vec<u8>,
    #[prost(uint64, tag = "7")]
    pub created_at: u64,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct SignedPreKeyProto {
    #[prost(uint32, tag = "1")]
    pub key_id: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub signature: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct PreKeyProto {
    #[prost(uint32, tag = "1")]
    pub key_id: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub public_key: Vec<u8>,
}

#[derive(Clone, PartialEq, Message)]
pub(crate) struct KeyBundleProto {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub identity_key: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub signed_pre_key: Option<SignedPreKeyProto>,
    #[prost(message, optional, tag = "4")]
    pub pre_key: Option<PreKeyProto>,
}

impl KeyRecordProto {
    /// Encodes the record into a buffer that is wiped once dropped.
    pub(crate) fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.encode_to_vec())
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let record = Self::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode key record: {err:?}")))?;
        check_version(record.version)?;
        Ok(record)
    }
}

impl KeyBundleProto {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let bundle = Self::decode(bytes)
            .map_err(|err| Error::Serde(format!("Failed to decode key bundle: {err:?}")))?;
        check_version(bundle.version)?;
        Ok(bundle)
    }
}

fn check_version(version: u32) -> Result<(), Error> {
    if version != SCHEMA_VERSION {
        return Err(Error::Serde(format!(
            "Unsupported schema version: {version}"
        )));
    }
    Ok(())
}
