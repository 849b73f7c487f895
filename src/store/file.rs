use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use zeroize::Zeroizing;

use super::StorageBackend;
use crate::Error;

const RECORD_EXTENSION: &str = "key";

/// Directory-backed storage, one file per record.
///
/// Each write goes to its own uniquely named hidden temporary file which is
/// fsynced and then renamed over the record, so a crash or a concurrent
/// writer leaves either the old or one complete new value. On unix the
/// directory is `0o700` and record files are `0o600`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    /// Opens (creating if needed) the record directory.
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self, Error> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await.map_err(|err| {
            Error::StorageWrite(format!(
                "failed to create {}: {err}",
                directory.display()
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&directory, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|err| Error::StorageWrite(format!("failed to restrict directory: {err}")))?;
        }

        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');
        valid.then(|| self.directory.join(format!("{name}.{RECORD_EXTENSION}")))
    }
}

fn write_atomically(directory: &Path, path: &Path, value: &[u8]) -> io::Result<()> {
    // Created with mode 0o600 on unix; removed on drop unless persisted.
    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(directory)?;
    temp.write_all(value)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;

    #[cfg(unix)]
    std::fs::File::open(directory)?.sync_all()?;

    Ok(())
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn read(&self, name: &str) -> Result<Option<String>, Error> {
        let Some(path) = self.record_path(name) else {
            return Ok(None);
        };

        match fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::StorageRead(format!("failed to read {name}: {err}"))),
        }
    }

    async fn write(&self, name: &str, value: &str) -> Result<(), Error> {
        let path = self
            .record_path(name)
            .ok_or_else(|| Error::StorageWrite(format!("invalid record name {name:?}")))?;
        let directory = self.directory.clone();
        let value = Zeroizing::new(value.as_bytes().to_vec());

        tokio::task::spawn_blocking(move || write_atomically(&directory, &path, &value))
            .await
            .map_err(|err| Error::StorageWrite(format!("write of {name} did not finish: {err}")))?
            .map_err(|err| Error::StorageWrite(format!("failed to write {name}: {err}")))
    }

    async fn remove(&self, name: &str) -> Result<bool, Error> {
        let Some(path) = self.record_path(name) else {
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(Error::StorageWrite(format!("failed to remove {name}: {err}"))),
        }
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        let read_error = |err: io::Error| {
            Error::StorageRead(format!(
                "failed to list {}: {err}",
                self.directory.display()
            ))
        };

        let mut entries = fs::read_dir(&self.directory).await.map_err(read_error)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_error)? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(&format!(".{RECORD_EXTENSION}")) {
                names.push(name.to_string());
            }
        }

        Ok(names)
    }
}
