use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use zeroize::Zeroize;

use super::StorageBackend;
use crate::Error;

/// In-memory backend. Contents are lost when the last clone is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn read(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.records.read().get(name).cloned())
    }

    async fn write(&self, name: &str, value: &str) -> Result<(), Error> {
        let previous = self
            .records
            .write()
            .insert(name.to_string(), value.to_string());
        if let Some(mut previous) = previous {
            previous.zeroize();
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, Error> {
        match self.records.write().remove(name) {
            Some(mut value) => {
                value.zeroize();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Ok(self.records.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_remove() {
        let backend = MemoryBackend::new();

        assert_eq!(backend.read("pre_key_1").await.unwrap(), None);
        backend.write("pre_key_1", "first").await.unwrap();
        backend.write("pre_key_1", "second").await.unwrap();
        assert_eq!(
            backend.read("pre_key_1").await.unwrap().as_deref(),
            Some("second")
        );

        assert_eq!(backend.names().await.unwrap(), vec!["pre_key_1".to_string()]);
        assert!(backend.remove("pre_key_1").await.unwrap());
        assert!(!backend.remove("pre_key_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_records() {
        let backend = MemoryBackend::new();
        let clone = backend.clone();

        backend.write("identity_key_pair", "value").await.unwrap();
        assert!(clone.read("identity_key_pair").await.unwrap().is_some());
    }
}
