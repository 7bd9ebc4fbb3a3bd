use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::info;

/// Result of an artifact upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredObject {
    pub url: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// Blob storage boundary for finalized recording artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, source: &Path) -> Result<StoredObject>;
}

/// Filesystem-backed object store
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create artifact directory: {:?}", root))?;
        Ok(Self { root })
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, source: &Path) -> Result<StoredObject> {
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let size_bytes = tokio::fs::copy(source, &dest)
            .await
            .with_context(|| format!("failed to store artifact {:?}", source))?;

        let sha256 = hash_file(&dest).await?;
        let url = format!("file://{}", dest.display());

        info!(key, size_bytes, "artifact stored");

        Ok(StoredObject {
            url,
            size_bytes,
            sha256,
        })
    }
}

async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open {:?} for hashing", path))?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
