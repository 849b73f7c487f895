//! Secure, durable persistence of key material.
//!
//! [`SecureKeyStore`] encodes [`KeyRecord`]s as versioned Protocol Buffers,
//! passes them through the text codec and hands the result to a pluggable
//! [`StorageBackend`]. Corrupt records are never fabricated: a read that
//! fails to decode is reported as an integrity fault and treated as absent.

mod backend;
pub use backend::StorageBackend;

mod file;
pub use file::FileBackend;

mod memory;
pub use memory::MemoryBackend;

mod record;
pub use record::*;

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, error};
use zeroize::Zeroizing;

use crate::{Error, KeyId, codec};

/// A stored record that exists but could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegrityFault {
    pub name: RecordName,
    pub reason: String,
}

/// Durable store of identity, pre-key and counter records.
pub struct SecureKeyStore {
    backend: Box<dyn StorageBackend>,
    faults: Mutex<Vec<IntegrityFault>>,
}

impl SecureKeyStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// A store whose contents live only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Opens a store persisted in `directory`.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        Ok(Self::new(FileBackend::open(directory).await?))
    }

    /// Durably stores `record` under `name`, replacing any previous value.
    pub async fn put(&self, name: RecordName, record: &KeyRecord) -> Result<(), Error> {
        if !name.admits(record) {
            return Err(Error::StorageWrite(format!(
                "record does not belong under {name}"
            )));
        }
        record
            .validate()
            .map_err(|err| Error::StorageWrite(format!("refusing to store {name}: {err}")))?;

        let bytes = record.to_bytes();
        let text = Zeroizing::new(codec::encode(&bytes));
        self.backend.write(&name.to_string(), &text).await?;

        debug!(name = %name, "stored key record");
        Ok(())
    }

    /// Reads the record stored under `name`.
    ///
    /// A record that cannot be decoded is logged, added to
    /// [`integrity_faults`](Self::integrity_faults) and returned as absent.
    pub async fn get(&self, name: RecordName) -> Result<Option<KeyRecord>, Error> {
        match self.load(name).await {
            Err(Error::StorageCorrupt { reason, .. }) => {
                self.report_fault(name, reason);
                Ok(None)
            }
            other => other,
        }
    }

    /// Like [`get`](Self::get), but a corrupt record is an error.
    pub(crate) async fn load(&self, name: RecordName) -> Result<Option<KeyRecord>, Error> {
        let Some(text) = self.backend.read(&name.to_string()).await? else {
            debug!(name = %name, "key record not found");
            return Ok(None);
        };
        let text = Zeroizing::new(text);

        let corrupt = |reason: String| Error::StorageCorrupt {
            name: name.to_string(),
            reason,
        };

        let bytes = Zeroizing::new(codec::decode(&text).map_err(|err| corrupt(err.to_string()))?);
        let record = KeyRecord::from_bytes(&bytes).map_err(|err| corrupt(err.to_string()))?;
        if !name.admits(&record) {
            return Err(corrupt("record does not match its name".to_string()));
        }

        debug!(name = %name, "loaded key record");
        Ok(Some(record))
    }

    /// Removes the record under `name`. Returns whether it existed.
    pub async fn delete(&self, name: RecordName) -> Result<bool, Error> {
        let removed = self.backend.remove(&name.to_string()).await?;
        debug!(name = %name, removed, "deleted key record");
        Ok(removed)
    }

    /// Whether anything is stored under `name`, decodable or not.
    pub async fn contains(&self, name: RecordName) -> Result<bool, Error> {
        Ok(self.backend.read(&name.to_string()).await?.is_some())
    }

    /// Ids of every stored pre-key of `kind`, in ascending order.
    pub async fn list(&self, kind: RecordKind) -> Result<Vec<KeyId>, Error> {
        let mut ids: Vec<KeyId> = self
            .backend
            .names()
            .await?
            .iter()
            .filter_map(|name| name.parse::<RecordName>().ok())
            .filter_map(|name| name.key_id(kind))
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Logs a record that exists but cannot be used and adds it to the
    /// fault log.
    pub(crate) fn report_fault(&self, name: RecordName, reason: String) {
        error!(name = %name, reason = %reason, "stored key record is corrupt");
        self.faults.lock().push(IntegrityFault { name, reason });
    }

    /// Integrity faults observed by [`get`](Self::get) since the store was opened.
    pub fn integrity_faults(&self) -> Vec<IntegrityFault> {
        self.faults.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{CryptoProvider, Curve25519Provider};
    use crate::{IdentityKeyPair, KeyPair, OneTimePreKey};

    fn key_id(value: u32) -> KeyId {
        KeyId::new(value).unwrap()
    }

    fn one_time_pre_key(id: u32) -> KeyRecord {
        let key_pair = Curve25519Provider::new().generate_key_pair().unwrap();
        KeyRecord::OneTimePreKey(OneTimePreKey::new(key_id(id), key_pair))
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SecureKeyStore::in_memory();
        let name = RecordName::OneTimePreKey(key_id(7));
        let record = one_time_pre_key(7);

        store.put(name, &record).await.unwrap();
        assert_eq!(store.get(name).await.unwrap(), Some(record));
        assert!(store.contains(name).await.unwrap());

        assert!(store.delete(name).await.unwrap());
        assert_eq!(store.get(name).await.unwrap(), None);
        assert!(!store.delete(name).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_rejects_misnamed_record() {
        let store = SecureKeyStore::in_memory();

        let result = store
            .put(RecordName::OneTimePreKey(key_id(8)), &one_time_pre_key(7))
            .await;
        assert!(matches!(result, Err(Error::StorageWrite(_))));
    }

    #[tokio::test]
    async fn test_put_rejects_unreadable_record() {
        let backend = MemoryBackend::new();
        let store = SecureKeyStore::new(backend.clone());
        let name = RecordName::OneTimePreKey(key_id(3));
        let hollow = KeyRecord::OneTimePreKey(OneTimePreKey::new(
            key_id(3),
            KeyPair::new(vec![4; 32], Vec::new()),
        ));

        assert!(matches!(
            store.put(name, &hollow).await,
            Err(Error::StorageWrite(_))
        ));
        assert!(backend.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_kind() {
        let store = SecureKeyStore::in_memory();
        for id in [9, 2, 5] {
            store
                .put(RecordName::OneTimePreKey(key_id(id)), &one_time_pre_key(id))
                .await
                .unwrap();
        }
        store
            .put(RecordName::NextOneTimePreKeyId, &KeyRecord::KeyId(key_id(10)))
            .await
            .unwrap();

        assert_eq!(
            store.list(RecordKind::OneTimePreKey).await.unwrap(),
            vec![key_id(2), key_id(5), key_id(9)]
        );
        assert!(store.list(RecordKind::SignedPreKey).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported_not_fabricated() {
        let backend = MemoryBackend::new();
        let store = SecureKeyStore::new(backend.clone());

        backend
            .write("identity_key_pair", "bm90IGEga2V5IHJlY29yZA==")
            .await
            .unwrap();

        assert_eq!(store.get(RecordName::IdentityKeyPair).await.unwrap(), None);
        assert!(store.contains(RecordName::IdentityKeyPair).await.unwrap());
        assert!(matches!(
            store.load(RecordName::IdentityKeyPair).await,
            Err(Error::StorageCorrupt { .. })
        ));

        let faults = store.integrity_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].name, RecordName::IdentityKeyPair);
    }

    #[tokio::test]
    async fn test_record_under_wrong_name_is_corrupt() {
        let backend = MemoryBackend::new();
        let store = SecureKeyStore::new(backend.clone());

        let identity = IdentityKeyPair::new(Curve25519Provider::new().generate_key_pair().unwrap());
        store
            .put(
                RecordName::IdentityKeyPair,
                &KeyRecord::IdentityKeyPair(identity),
            )
            .await
            .unwrap();
        let text = backend.read("identity_key_pair").await.unwrap().unwrap();
        backend.write("pre_key_1", &text).await.unwrap();

        assert_eq!(
            store.get(RecordName::OneTimePreKey(key_id(1))).await.unwrap(),
            None
        );
        assert_eq!(store.integrity_faults().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let record = one_time_pre_key(4);
        let name = RecordName::OneTimePreKey(key_id(4));

        let store = SecureKeyStore::open(dir.path()).await.unwrap();
        store.put(name, &record).await.unwrap();
        drop(store);

        let reopened = SecureKeyStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get(name).await.unwrap(), Some(record));
    }
}
