//! Content-addressable blob store.
//!
//! Blobs are keyed by the SHA-256 of their content, so storing the same
//! bytes twice yields the same key and stores them once.

mod file;
mod memory;
mod remote;

use std::fmt;
use std::io;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::context::Ctx;
use crate::error::ErrorKind;

pub use file::FileStash;
pub use memory::MemoryStash;
pub use remote::RemoteStash;

#[derive(Debug, Error)]
pub enum StashError {
    #[error("blob {0} not found")]
    NotFound(StashKey),

    #[error("invalid stash key: {0:?}")]
    InvalidKey(String),

    #[error("stash i/o: {0}")]
    Io(#[from] io::Error),

    #[error("remote stash: {0}")]
    Remote(String),
}

impl StashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StashError::InvalidKey(_) => ErrorKind::Validation,
            StashError::NotFound(_) | StashError::Io(_) | StashError::Remote(_) => ErrorKind::Io,
        }
    }
}

impl From<reqwest::Error> for StashError {
    fn from(err: reqwest::Error) -> Self {
        StashError::Remote(err.to_string())
    }
}

/// Lowercase hex SHA-256 of a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StashKey(String);

impl StashKey {
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        StashKey(format!("{:x}", hasher.finalize()))
    }

    pub fn parse(value: &str) -> Result<Self, StashError> {
        let valid = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(StashKey(value.to_string()))
        } else {
            Err(StashError::InvalidKey(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StashKey {
    type Error = StashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StashKey::parse(&value)
    }
}

impl From<StashKey> for String {
    fn from(key: StashKey) -> Self {
        key.0
    }
}

#[async_trait]
pub trait Stash: Send + Sync {
    /// Store `bytes` and return their key.
    async fn put(&self, ctx: &Ctx, bytes: Vec<u8>) -> Result<StashKey, StashError>;

    /// Fetch a blob, or [`StashError::NotFound`].
    async fn get(&self, ctx: &Ctx, key: &StashKey) -> Result<Vec<u8>, StashError>;

    async fn exists(&self, ctx: &Ctx, key: &StashKey) -> Result<bool, StashError>;
}
