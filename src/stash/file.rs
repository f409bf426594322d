use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{Stash, StashError, StashKey};
use crate::context::Ctx;

/// Stash backed by a directory, one file per blob under a two character
/// fan-out (`ab/abcdef...`).
#[derive(Debug, Clone)]
pub struct FileStash {
    root: PathBuf,
}

impl FileStash {
    /// Open the stash at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StashError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &StashKey) -> PathBuf {
        let key = key.as_str();
        self.root.join(&key[..2]).join(key)
    }
}

#[async_trait]
impl Stash for FileStash {
    async fn put(&self, ctx: &Ctx, bytes: Vec<u8>) -> Result<StashKey, StashError> {
        let key = StashKey::of(&bytes);
        let path = self.path_for(&key);
        if tokio::fs::try_exists(&path).await? {
            return Ok(key);
        }
        let dir = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(dir).await?;

        // Readers never observe a partially written blob.
        let tmp = dir.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        tracing::debug!(parent: ctx.span(), %key, size = bytes.len(), "stored blob");
        Ok(key)
    }

    async fn get(&self, _ctx: &Ctx, key: &StashKey) -> Result<Vec<u8>, StashError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StashError::NotFound(key.clone())),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, _ctx: &Ctx, key: &StashKey) -> Result<bool, StashError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}
