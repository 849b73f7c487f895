mod config;
pub use config::*;

use std::sync::Arc;

use tracing::info;

use crate::crypto::{CryptoProvider, Curve25519Provider};
use crate::{
    Error, IdentityKeyManager, IdentityKeyPair, InitiationMessage, KeyBundle, OneTimePreKey,
    PreKeyBatch, PreKeyManager, RemoteAddress, SecureKeyStore, SessionSeed, SignedPreKey, X3DH,
    assemble_bundle,
};

/// Keys created or found by [`Keyring::bootstrap`].
#[derive(Debug)]
pub struct Bootstrap {
    pub identity: IdentityKeyPair,
    pub signed_pre_key: SignedPreKey,
    /// One-time pre-keys generated by this call. Empty when the pool was
    /// already populated.
    pub one_time_pre_keys: PreKeyBatch,
}

/// Changes made by [`Keyring::maintain`].
#[derive(Debug)]
pub struct Maintenance {
    pub rotated_signed_pre_key: Option<SignedPreKey>,
    pub replenished: PreKeyBatch,
}

/// Key material of one installation and the operations built on it.
///
/// Ties the identity and pre-key managers and the X3DH agreement to a single
/// store and crypto provider.
pub struct Keyring {
    identity: IdentityKeyManager,
    pre_keys: PreKeyManager,
    x3dh: X3DH,
    config: KeyringConfig,
}

impl Keyring {
    /// Creates a keyring over `store` using the default Curve25519 provider.
    ///
    /// If no configuration is provided, default values are used.
    pub fn new(store: Arc<SecureKeyStore>, config: Option<KeyringConfig>) -> Self {
        Self::with_provider(store, Arc::new(Curve25519Provider::new()), config)
    }

    pub fn with_provider(
        store: Arc<SecureKeyStore>,
        provider: Arc<dyn CryptoProvider>,
        config: Option<KeyringConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();

        Self {
            identity: IdentityKeyManager::new(Arc::clone(&store), Arc::clone(&provider)),
            pre_keys: PreKeyManager::new(store, Arc::clone(&provider)),
            x3dh: X3DH::new(&config.protocol_info, provider),
            config,
        }
    }

    pub fn config(&self) -> &KeyringConfig {
        &self.config
    }

    pub fn identity_keys(&self) -> &IdentityKeyManager {
        &self.identity
    }

    pub fn pre_keys(&self) -> &PreKeyManager {
        &self.pre_keys
    }

    /// Makes sure the installation has an identity, a current signed pre-key
    /// and a pool of one-time pre-keys. Safe to call on every start: only
    /// what is missing gets generated.
    pub async fn bootstrap(&self) -> Result<Bootstrap, Error> {
        let identity = self.identity.ensure_identity_key_pair().await?;

        let signed_pre_key = match self.pre_keys.current_signed_pre_key().await? {
            Some(signed_pre_key) => signed_pre_key,
            None => self.pre_keys.rotate_signed_pre_key(&identity).await?,
        };

        let one_time_pre_keys = if self.pre_keys.one_time_pre_key_count().await? == 0 {
            self.pre_keys
                .generate_one_time_pre_keys(self.config.max_one_time_pre_keys)
                .await?
        } else {
            PreKeyBatch::empty()
        };

        info!(
            signed_pre_key_id = %signed_pre_key.key_id(),
            new_one_time_pre_keys = one_time_pre_keys.len(),
            "keyring bootstrapped"
        );

        Ok(Bootstrap {
            identity,
            signed_pre_key,
            one_time_pre_keys,
        })
    }

    /// The bundle to publish: identity key, current signed pre-key and one
    /// available one-time pre-key, or none when the pool is empty.
    pub async fn publish_bundle(&self) -> Result<KeyBundle, Error> {
        let identity = self
            .identity
            .get_identity_key_pair()
            .await?
            .ok_or(Error::IdentityNotFound)?;
        let signed_pre_key = self.current_signed_pre_key().await?;
        let one_time_pre_key = self.pre_keys.available_one_time_pre_key().await?;

        assemble_bundle(&identity, &signed_pre_key, one_time_pre_key.as_ref())
    }

    /// Runs X3DH as initiator against `remote_bundle`.
    pub async fn initiate_session(
        &self,
        remote_bundle: &KeyBundle,
        remote_address: RemoteAddress,
    ) -> Result<SessionSeed, Error> {
        let identity = self
            .identity
            .get_identity_key_pair()
            .await?
            .ok_or(Error::IdentityNotFound)?;

        self.x3dh
            .initiate_session(&identity, remote_bundle, remote_address)
    }

    /// Runs X3DH as responder and consumes the one-time pre-key the
    /// initiation named. A replayed initiation fails with
    /// [`Error::PreKeyNotFound`].
    pub async fn accept_session(
        &self,
        initiation: &InitiationMessage,
        remote_address: RemoteAddress,
    ) -> Result<SessionSeed, Error> {
        let identity = self
            .identity
            .get_identity_key_pair()
            .await?
            .ok_or(Error::IdentityNotFound)?;
        let signed_pre_key = self
            .pre_keys
            .signed_pre_key(initiation.signed_pre_key_id)
            .await?;

        let one_time_pre_key = match initiation.pre_key_id {
            Some(key_id) => Some(OneTimePreKey::new(
                key_id,
                self.pre_keys.consume_one_time_pre_key(key_id).await?,
            )),
            None => None,
        };

        self.x3dh.accept_session(
            &identity,
            &signed_pre_key,
            one_time_pre_key.as_ref(),
            initiation,
            remote_address,
        )
    }

    /// Rotates the signed pre-key when it is due and refills the one-time
    /// pre-key pool when it has run low.
    pub async fn maintain(&self) -> Result<Maintenance, Error> {
        let identity = self
            .identity
            .get_identity_key_pair()
            .await?
            .ok_or(Error::IdentityNotFound)?;

        let rotated_signed_pre_key = self
            .pre_keys
            .rotate_signed_pre_key_if_due(
                &identity,
                self.config.signed_pre_key_rotation_interval,
                self.config.max_signed_pre_keys,
            )
            .await?;
        let replenished = self
            .pre_keys
            .replenish_one_time_pre_keys(
                self.config.min_one_time_pre_keys,
                self.config.max_one_time_pre_keys,
            )
            .await?;

        Ok(Maintenance {
            rotated_signed_pre_key,
            replenished,
        })
    }

    async fn current_signed_pre_key(&self) -> Result<SignedPreKey, Error> {
        self.pre_keys.current_signed_pre_key().await?.ok_or_else(|| {
            Error::InvalidBundleInput("no signed pre-key has been generated".to_string())
        })
    }
}
