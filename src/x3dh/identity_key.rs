use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::crypto::CryptoProvider;
use crate::store::{KeyRecord, RecordName, SecureKeyStore};
use crate::{Error, IdentityKeyPair};

/// Owner of the long-term identity key pair of this installation.
pub struct IdentityKeyManager {
    store: Arc<SecureKeyStore>,
    provider: Arc<dyn CryptoProvider>,
    lock: Mutex<()>,
}

impl IdentityKeyManager {
    pub fn new(store: Arc<SecureKeyStore>, provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            store,
            provider,
            lock: Mutex::new(()),
        }
    }

    /// Returns the stored identity key pair, generating and persisting one
    /// on first use.
    ///
    /// An identity record that exists but cannot be decoded is reported as
    /// [`Error::StorageCorrupt`] and is left untouched: the identity is the
    /// trust anchor and is never silently replaced.
    pub async fn ensure_identity_key_pair(&self) -> Result<IdentityKeyPair, Error> {
        let _guard = self.lock.lock().await;

        match self.store.load(RecordName::IdentityKeyPair).await {
            Ok(Some(KeyRecord::IdentityKeyPair(identity))) => {
                if let Err(err) = self.provider.validate_key_pair(identity.key_pair()) {
                    error!(error = %err, "refusing to replace invalid identity key pair");
                    return Err(Error::StorageCorrupt {
                        name: RecordName::IdentityKeyPair.to_string(),
                        reason: err.to_string(),
                    });
                }
                return Ok(identity);
            }
            Ok(Some(_)) => {
                return Err(Error::StorageCorrupt {
                    name: RecordName::IdentityKeyPair.to_string(),
                    reason: "unexpected record kind".to_string(),
                });
            }
            Ok(None) => {}
            Err(err) => {
                error!(error = %err, "refusing to replace unreadable identity key pair");
                return Err(err);
            }
        }

        let identity = IdentityKeyPair::new(self.provider.generate_key_pair()?);
        self.store
            .put(
                RecordName::IdentityKeyPair,
                &KeyRecord::IdentityKeyPair(identity.clone()),
            )
            .await?;

        info!("generated identity key pair");
        Ok(identity)
    }

    /// Looks up the identity key pair without generating one.
    pub async fn get_identity_key_pair(&self) -> Result<Option<IdentityKeyPair>, Error> {
        match self.store.get(RecordName::IdentityKeyPair).await? {
            Some(KeyRecord::IdentityKeyPair(identity)) => {
                match self.provider.validate_key_pair(identity.key_pair()) {
                    Ok(()) => Ok(Some(identity)),
                    Err(err) => {
                        self.store
                            .report_fault(RecordName::IdentityKeyPair, err.to_string());
                        Ok(None)
                    }
                }
            }
            _ => Ok(None),
        }
    }
}
