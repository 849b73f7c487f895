use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::crypto::CryptoProvider;
use crate::store::{KeyRecord, RecordKind, RecordName, SecureKeyStore};
use crate::{Error, IdentityKeyPair, KeyId, KeyPair};

/// A medium-term signed pre-key as defined in Signal's X3DH protocol.
///
/// The signature is made with the identity private key over the public half,
/// proving the pre-key belongs to the owner of the identity key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedPreKey {
    key_id: KeyId,
    key_pair: KeyPair,
    signature: Vec<u8>,
    created_at: u64,
}

impl SignedPreKey {
    pub fn new(key_id: KeyId, key_pair: KeyPair, signature: Vec<u8>, created_at: u64) -> Self {
        Self {
            key_id,
            key_pair,
            signature,
            created_at,
        }
    }

    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key()
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Creation time in seconds since the UNIX epoch.
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Whether the key was created at least `max_age` before `now`.
    pub fn is_older_than(&self, max_age: Duration, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= max_age.as_secs()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Generates, persists and hands out signed and one-time pre-keys.
///
/// Every check-then-write and read-then-delete on the store runs under one
/// async mutex, so concurrent callers never allocate the same id or consume
/// the same one-time pre-key twice.
pub struct PreKeyManager {
    pub(super) store: Arc<SecureKeyStore>,
    pub(super) provider: Arc<dyn CryptoProvider>,
    pub(super) lock: Mutex<()>,
}

impl PreKeyManager {
    pub fn new(store: Arc<SecureKeyStore>, provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            store,
            provider,
            lock: Mutex::new(()),
        }
    }

    /// Generates a signed pre-key under `key_id`, persists it and marks it as
    /// the current one.
    pub async fn generate_signed_pre_key(
        &self,
        identity: &IdentityKeyPair,
        key_id: KeyId,
    ) -> Result<SignedPreKey, Error> {
        let _guard = self.lock.lock().await;
        self.generate_signed_pre_key_locked(identity, key_id).await
    }

    async fn generate_signed_pre_key_locked(
        &self,
        identity: &IdentityKeyPair,
        key_id: KeyId,
    ) -> Result<SignedPreKey, Error> {
        let name = RecordName::SignedPreKey(key_id);
        if self.store.contains(name).await? {
            warn!(key_id = %key_id, "signed pre-key id already in use");
            return Err(Error::DuplicateKeyId(key_id));
        }

        let key_pair = self.provider.generate_key_pair()?;
        let signature = self
            .provider
            .sign(identity.private_key(), key_pair.public_key())?;
        let signed_pre_key = SignedPreKey::new(key_id, key_pair, signature, unix_now());

        self.store
            .put(name, &KeyRecord::SignedPreKey(signed_pre_key.clone()))
            .await?;
        self.store
            .put(RecordName::CurrentSignedPreKey, &KeyRecord::KeyId(key_id))
            .await?;

        info!(key_id = %key_id, "generated signed pre-key");
        Ok(signed_pre_key)
    }

    /// Allocates the next unused signed pre-key id.
    pub async fn next_signed_pre_key_id(&self) -> Result<KeyId, Error> {
        let _guard = self.lock.lock().await;
        let mut ids = self.allocate_ids(RecordKind::SignedPreKey, 1).await?;
        ids.pop().ok_or(Error::KeyIdExhausted)
    }

    /// Generates a new signed pre-key under a freshly allocated id and makes
    /// it current. Older signed pre-keys stay in the store.
    pub async fn rotate_signed_pre_key(
        &self,
        identity: &IdentityKeyPair,
    ) -> Result<SignedPreKey, Error> {
        let _guard = self.lock.lock().await;
        self.rotate_locked(identity).await
    }

    async fn rotate_locked(&self, identity: &IdentityKeyPair) -> Result<SignedPreKey, Error> {
        let mut ids = self.allocate_ids(RecordKind::SignedPreKey, 1).await?;
        let key_id = ids.pop().ok_or(Error::KeyIdExhausted)?;
        self.generate_signed_pre_key_locked(identity, key_id).await
    }

    /// Rotates the signed pre-key when there is none or the current one is
    /// older than `max_age`, then prunes the oldest signed pre-keys so at most
    /// `retain` remain. The current key is never pruned.
    ///
    /// Returns the new key when a rotation took place.
    pub async fn rotate_signed_pre_key_if_due(
        &self,
        identity: &IdentityKeyPair,
        max_age: Duration,
        retain: usize,
    ) -> Result<Option<SignedPreKey>, Error> {
        let _guard = self.lock.lock().await;

        let rotated = match self.current_signed_pre_key_locked().await? {
            Some(current) if !current.is_older_than(max_age, unix_now()) => None,
            _ => Some(self.rotate_locked(identity).await?),
        };

        self.prune_signed_pre_keys(retain.max(1)).await?;
        Ok(rotated)
    }

    async fn prune_signed_pre_keys(&self, retain: usize) -> Result<(), Error> {
        let current = self.current_signed_pre_key_id().await?;

        let mut candidates = Vec::new();
        for key_id in self.store.list(RecordKind::SignedPreKey).await? {
            if Some(key_id) == current {
                continue;
            }
            let created_at = match self.store.get(RecordName::SignedPreKey(key_id)).await? {
                Some(KeyRecord::SignedPreKey(key)) => key.created_at(),
                _ => 0,
            };
            candidates.push((created_at, key_id));
        }

        let keep = retain.saturating_sub(usize::from(current.is_some()));
        if candidates.len() <= keep {
            return Ok(());
        }

        candidates.sort_unstable();
        let excess = candidates.len() - keep;
        for (_, key_id) in candidates.into_iter().take(excess) {
            self.store.delete(RecordName::SignedPreKey(key_id)).await?;
            info!(key_id = %key_id, "pruned signed pre-key");
        }

        Ok(())
    }

    /// Looks up a stored signed pre-key.
    pub async fn signed_pre_key(&self, key_id: KeyId) -> Result<SignedPreKey, Error> {
        let name = RecordName::SignedPreKey(key_id);
        match self.store.get(name).await? {
            Some(KeyRecord::SignedPreKey(key)) if self.is_usable(name, key.key_pair()) => Ok(key),
            _ => Err(Error::SignedPreKeyNotFound(key_id)),
        }
    }

    /// Returns the signed pre-key currently published, if one was generated.
    pub async fn current_signed_pre_key(&self) -> Result<Option<SignedPreKey>, Error> {
        let _guard = self.lock.lock().await;
        self.current_signed_pre_key_locked().await
    }

    async fn current_signed_pre_key_locked(&self) -> Result<Option<SignedPreKey>, Error> {
        let Some(key_id) = self.current_signed_pre_key_id().await? else {
            return Ok(None);
        };

        let name = RecordName::SignedPreKey(key_id);
        match self.store.get(name).await? {
            Some(KeyRecord::SignedPreKey(key)) if self.is_usable(name, key.key_pair()) => {
                Ok(Some(key))
            }
            _ => Ok(None),
        }
    }

    async fn current_signed_pre_key_id(&self) -> Result<Option<KeyId>, Error> {
        match self.store.get(RecordName::CurrentSignedPreKey).await? {
            Some(KeyRecord::KeyId(key_id)) => Ok(Some(key_id)),
            _ => Ok(None),
        }
    }

    /// Whether the provider accepts a stored key pair. A rejected pair is
    /// reported to the store's fault log and treated as absent.
    pub(super) fn is_usable(&self, name: RecordName, key_pair: &KeyPair) -> bool {
        match self.provider.validate_key_pair(key_pair) {
            Ok(()) => true,
            Err(err) => {
                self.store.report_fault(name, err.to_string());
                false
            }
        }
    }

    /// Allocates `count` ids of `kind` from the persisted counter, skipping
    /// ids that are still present in the store. The advanced counter is
    /// persisted before the ids are returned. Callers hold `self.lock`.
    pub(super) async fn allocate_ids(
        &self,
        kind: RecordKind,
        count: usize,
    ) -> Result<Vec<KeyId>, Error> {
        let counter = match kind {
            RecordKind::SignedPreKey => RecordName::NextSignedPreKeyId,
            RecordKind::OneTimePreKey => RecordName::NextOneTimePreKeyId,
        };

        let mut next = match self.store.load(counter).await? {
            Some(KeyRecord::KeyId(key_id)) => key_id,
            _ => KeyId::new(KeyId::MIN)?,
        };
        let taken: HashSet<KeyId> = self.store.list(kind).await?.into_iter().collect();
        if taken.len().saturating_add(count) > KeyId::MAX as usize {
            return Err(Error::KeyIdExhausted);
        }

        let mut ids = Vec::with_capacity(count);
        while ids.len() < count {
            if !taken.contains(&next) {
                ids.push(next);
            }
            next = next.next();
        }

        self.store.put(counter, &KeyRecord::KeyId(next)).await?;
        debug!(counter = %counter, next = %next, count, "allocated key ids");

        Ok(ids)
    }
}
