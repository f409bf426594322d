use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Stash, StashError, StashKey};
use crate::context::Ctx;

/// In-process stash, used by tests and by single-machine setups.
#[derive(Debug, Default)]
pub struct MemoryStash {
    blobs: RwLock<HashMap<StashKey, Vec<u8>>>,
}

impl MemoryStash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl Stash for MemoryStash {
    async fn put(&self, _ctx: &Ctx, bytes: Vec<u8>) -> Result<StashKey, StashError> {
        let key = StashKey::of(&bytes);
        self.blobs.write().entry(key.clone()).or_insert(bytes);
        Ok(key)
    }

    async fn get(&self, _ctx: &Ctx, key: &StashKey) -> Result<Vec<u8>, StashError> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StashError::NotFound(key.clone()))
    }

    async fn exists(&self, _ctx: &Ctx, key: &StashKey) -> Result<bool, StashError> {
        Ok(self.blobs.read().contains_key(key))
    }
}
