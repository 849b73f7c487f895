//! Key-bundle generation, secure key persistence and X3DH initial key
//! agreement for end-to-end encrypted messaging.
//!
//! A [`Keyring`] owns one installation's keys: it bootstraps the identity
//! key pair, the signed pre-key and a pool of one-time pre-keys into a
//! [`SecureKeyStore`], publishes them as a [`KeyBundle`] and runs X3DH
//! against remote bundles to produce a [`SessionSeed`] for the ratchet layer.

pub mod codec;

pub mod crypto;

mod error;
pub use error::Error;

mod keyring;
pub use keyring::*;

mod proto;

pub mod store;
pub use store::SecureKeyStore;

mod types;
pub use types::*;

mod x3dh;
pub use x3dh::*;
