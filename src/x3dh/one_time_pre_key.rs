use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::PreKeyManager;
use crate::store::{KeyRecord, RecordKind, RecordName};
use crate::{Error, KeyId, KeyPair};

/// A single-use pre-key. Once consumed by an incoming session it is removed
/// from the store for good.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneTimePreKey {
    key_id: KeyId,
    key_pair: KeyPair,
}

impl OneTimePreKey {
    pub fn new(key_id: KeyId, key_pair: KeyPair) -> Self {
        Self { key_id, key_pair }
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
}

/// Outcome of a bulk one-time pre-key generation, one entry per allocated id
/// in ascending id order.
///
/// Each entry holds either the stored key or the error that prevented it
/// from being stored. The batch is consumed by iterating it.
#[derive(Debug)]
pub struct PreKeyBatch {
    outcomes: std::vec::IntoIter<(KeyId, Result<OneTimePreKey, Error>)>,
}

impl PreKeyBatch {
    pub(crate) fn empty() -> Self {
        Self {
            outcomes: Vec::new().into_iter(),
        }
    }

    /// Collects the stored keys, failing with the first error in id order.
    pub fn into_result(self) -> Result<Vec<OneTimePreKey>, Error> {
        self.map(|(_, outcome)| outcome).collect()
    }
}

impl Iterator for PreKeyBatch {
    type Item = (KeyId, Result<OneTimePreKey, Error>);

    fn next(&mut self) -> Option<Self::Item> {
        self.outcomes.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.outcomes.size_hint()
    }
}

impl ExactSizeIterator for PreKeyBatch {}

impl PreKeyManager {
    /// Generates `count` one-time pre-keys under freshly allocated ids.
    ///
    /// Key pairs are generated in parallel on blocking worker threads and
    /// then persisted one at a time in id order. A failure for one id does
    /// not stop the others; every outcome is reported in the batch.
    pub async fn generate_one_time_pre_keys(&self, count: usize) -> Result<PreKeyBatch, Error> {
        let _guard = self.lock.lock().await;
        self.generate_one_time_pre_keys_locked(count).await
    }

    async fn generate_one_time_pre_keys_locked(&self, count: usize) -> Result<PreKeyBatch, Error> {
        if count == 0 {
            return Ok(PreKeyBatch::empty());
        }

        let ids = self.allocate_ids(RecordKind::OneTimePreKey, count).await?;

        let mut tasks = JoinSet::new();
        for &key_id in &ids {
            let provider = Arc::clone(&self.provider);
            tasks.spawn_blocking(move || (key_id, provider.generate_key_pair()));
        }

        let mut generated = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key_id, key_pair)) => {
                    generated.insert(key_id, key_pair);
                }
                Err(err) => error!(error = %err, "one-time pre-key worker failed"),
            }
        }

        let mut outcomes = Vec::with_capacity(ids.len());
        let mut stored = 0usize;
        for key_id in ids {
            let outcome = match generated.remove(&key_id) {
                Some(Ok(key_pair)) => {
                    let pre_key = OneTimePreKey::new(key_id, key_pair);
                    self.store
                        .put(
                            RecordName::OneTimePreKey(key_id),
                            &KeyRecord::OneTimePreKey(pre_key.clone()),
                        )
                        .await
                        .map(|()| pre_key)
                }
                Some(Err(err)) => Err(err),
                None => Err(Error::KeyGeneration(
                    "worker exited without a key pair".to_string(),
                )),
            };

            match &outcome {
                Ok(_) => stored += 1,
                Err(err) => warn!(key_id = %key_id, error = %err, "one-time pre-key not stored"),
            }
            outcomes.push((key_id, outcome));
        }

        info!(requested = count, stored, "generated one-time pre-keys");
        Ok(PreKeyBatch {
            outcomes: outcomes.into_iter(),
        })
    }

    /// Generates a single one-time pre-key under an explicit id.
    pub async fn generate_one_time_pre_key(&self, key_id: KeyId) -> Result<OneTimePreKey, Error> {
        let _guard = self.lock.lock().await;

        let name = RecordName::OneTimePreKey(key_id);
        if self.store.contains(name).await? {
            warn!(key_id = %key_id, "one-time pre-key id already in use");
            return Err(Error::DuplicateKeyId(key_id));
        }

        let pre_key = OneTimePreKey::new(key_id, self.provider.generate_key_pair()?);
        self.store
            .put(name, &KeyRecord::OneTimePreKey(pre_key.clone()))
            .await?;

        info!(key_id = %key_id, "generated one-time pre-key");
        Ok(pre_key)
    }

    /// Removes and returns the one-time pre-key `key_id`.
    ///
    /// Lookup and removal are atomic with respect to other callers: of two
    /// concurrent consumers, exactly one gets the key and the other
    /// [`Error::PreKeyNotFound`].
    pub async fn consume_one_time_pre_key(&self, key_id: KeyId) -> Result<KeyPair, Error> {
        let _guard = self.lock.lock().await;

        let name = RecordName::OneTimePreKey(key_id);
        let pre_key = match self.store.get(name).await? {
            Some(KeyRecord::OneTimePreKey(pre_key)) if self.is_usable(name, pre_key.key_pair()) => {
                pre_key
            }
            _ => {
                warn!(key_id = %key_id, "one-time pre-key missing or already consumed");
                return Err(Error::PreKeyNotFound(key_id));
            }
        };

        if !self.store.delete(name).await? {
            warn!(key_id = %key_id, "one-time pre-key vanished during consumption");
            return Err(Error::PreKeyNotFound(key_id));
        }

        info!(key_id = %key_id, "consumed one-time pre-key");
        Ok(pre_key.key_pair().clone())
    }

    /// Looks up a one-time pre-key without consuming it.
    pub async fn one_time_pre_key(&self, key_id: KeyId) -> Result<Option<OneTimePreKey>, Error> {
        let name = RecordName::OneTimePreKey(key_id);
        match self.store.get(name).await? {
            Some(KeyRecord::OneTimePreKey(pre_key)) if self.is_usable(name, pre_key.key_pair()) => {
                Ok(Some(pre_key))
            }
            _ => Ok(None),
        }
    }

    /// The readable one-time pre-key with the lowest id, if any remain.
    pub async fn available_one_time_pre_key(&self) -> Result<Option<OneTimePreKey>, Error> {
        for key_id in self.store.list(RecordKind::OneTimePreKey).await? {
            if let Some(pre_key) = self.one_time_pre_key(key_id).await? {
                return Ok(Some(pre_key));
            }
        }
        Ok(None)
    }

    /// Number of one-time pre-keys in the store.
    pub async fn one_time_pre_key_count(&self) -> Result<usize, Error> {
        Ok(self.store.list(RecordKind::OneTimePreKey).await?.len())
    }

    /// Refills the pool up to `target` keys when it has fallen below
    /// `low_water_mark`. Returns an empty batch when no refill was needed.
    pub async fn replenish_one_time_pre_keys(
        &self,
        low_water_mark: usize,
        target: usize,
    ) -> Result<PreKeyBatch, Error> {
        let _guard = self.lock.lock().await;

        let available = self.one_time_pre_key_count().await?;
        if available >= low_water_mark {
            return Ok(PreKeyBatch::empty());
        }

        info!(available, target, "replenishing one-time pre-keys");
        self.generate_one_time_pre_keys_locked(target.saturating_sub(available))
            .await
    }
}
