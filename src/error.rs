use crate::KeyId;

/// Errors that can occur while generating, storing or agreeing on keys.
#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    /// The random source or a key-generation algorithm failed.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// A record could not be durably written or removed.
    #[error("Storage write failed: {0}")]
    StorageWrite(String),

    /// A record could not be read from the storage backend.
    #[error("Storage read failed: {0}")]
    StorageRead(String),

    /// A stored record exists but could not be decoded.
    #[error("Stored record {name} is corrupt: {reason}")]
    StorageCorrupt { name: String, reason: String },

    /// The one-time pre-key is absent or was already consumed.
    #[error("One-time pre-key {0} not found")]
    PreKeyNotFound(KeyId),

    /// The signed pre-key is not in the store.
    #[error("Signed pre-key {0} not found")]
    SignedPreKeyNotFound(KeyId),

    /// No identity key pair has been generated yet.
    #[error("Identity key pair not found")]
    IdentityNotFound,

    /// A key of the same kind already uses this id.
    #[error("Key id {0} is already in use")]
    DuplicateKeyId(KeyId),

    /// Every 24-bit key id of a kind is taken.
    #[error("No free key id left")]
    KeyIdExhausted,

    /// The value does not fit the 24-bit key id range.
    #[error("Invalid key id: {0}")]
    InvalidKeyId(u32),

    /// The signed pre-key signature does not match the identity key.
    #[error("Signed pre-key signature verification failed")]
    SignatureVerification,

    /// Text could not be decoded into bytes.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A bundle is missing a required public field or is malformed.
    #[error("Invalid bundle input: {0}")]
    InvalidBundleInput(String),

    /// Key material has the wrong length or is not a valid point.
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// A cryptographic operation failed.
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization/deserialization failed: {0}")]
    Serde(String),
}
