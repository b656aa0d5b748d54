use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("I/O error on blob '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Blob not found: {0}")]
    NotFound(String),
    #[error("Invalid blob key: {0}")]
    InvalidKey(String),
}

/// Byte storage addressed by relative keys such as `{chat_uid}/{uuid}.pdf`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), BlobError>;

    async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    async fn exists(&self, key: &str) -> Result<bool, BlobError>;

    /// Absolute location of `key`, recorded alongside attachment metadata.
    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError>;
}

pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root directory if needed.
    pub async fn ensure_root(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| BlobError::Io {
                key: self.root.display().to_string(),
                source,
            })
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_err(key: &str) -> impl FnOnce(std::io::Error) -> BlobError + '_ {
    move |source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            BlobError::NotFound(key.to_string())
        } else {
            BlobError::Io {
                key: key.to_string(),
                source,
            }
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn write(&self, key: &str, data: &[u8]) -> Result<(), BlobError> {
        let full_path = self.full_path(key)?;
        debug!(key = %key, size = data.len(), "blob_store: write");

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| {
                warn!(parent = %parent.display(), error = %source, "blob_store: create_dir_all failed");
                BlobError::Io {
                    key: key.to_string(),
                    source,
                }
            })?;
        }

        // Readers never observe a partially written blob.
        let mut temp_name = full_path.clone().into_os_string();
        temp_name.push(format!(".{}.tmp", uuid::Uuid::new_v4().simple()));
        let temp_path = PathBuf::from(temp_name);

        let result = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &full_path).await
        }
        .await;

        if let Err(source) = result {
            warn!(key = %key, error = %source, "blob_store: write failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(BlobError::Io {
                key: key.to_string(),
                source,
            });
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let full_path = self.full_path(key)?;
        fs::read(full_path).await.map_err(io_err(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        let full_path = self.full_path(key)?;
        fs::remove_file(full_path).await.map_err(io_err(key))?;
        debug!(key = %key, "blob_store: deleted");
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        let full_path = self.full_path(key)?;
        fs::try_exists(full_path).await.map_err(io_err(key))
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        self.full_path(key)
    }
}
