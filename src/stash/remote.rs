use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{Stash, StashError, StashKey};
use crate::context::Ctx;

#[derive(Debug, Deserialize)]
struct PutResponse {
    key: StashKey,
}

/// Stash served by a remote `gfxreplay serve` over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteStash {
    base_url: String,
    client: Client,
}

impl RemoteStash {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    fn blob_url(&self, key: &StashKey) -> String {
        format!("{}/api/stash/{}", self.base_url, key)
    }
}

#[async_trait]
impl Stash for RemoteStash {
    async fn put(&self, _ctx: &Ctx, bytes: Vec<u8>) -> Result<StashKey, StashError> {
        let url = format!("{}/api/stash", self.base_url);
        let response = self.client.put(&url).body(bytes).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StashError::Remote(format!("put failed: {status} - {text}")));
        }
        let body: PutResponse = response.json().await?;
        Ok(body.key)
    }

    async fn get(&self, _ctx: &Ctx, key: &StashKey) -> Result<Vec<u8>, StashError> {
        let response = self.client.get(self.blob_url(key)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StashError::NotFound(key.clone())),
            status if status.is_success() => Ok(response.bytes().await?.to_vec()),
            status => Err(StashError::Remote(format!("get {key} failed: {status}"))),
        }
    }

    async fn exists(&self, _ctx: &Ctx, key: &StashKey) -> Result<bool, StashError> {
        let response = self.client.head(self.blob_url(key)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StashError::Remote(format!("head {key} failed: {status}"))),
        }
    }
}
