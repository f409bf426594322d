//! HTTP client for a remote `gfxreplay serve`.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::error::ErrorResponse;
use super::handlers::actions::{DoActionRequest, DoActionResponse, SearchParams, UpdateActionRequest};
use super::handlers::devices::{ListDevicesResponse, RegisterRequest};
use super::server::HealthResponse;
use crate::context::Ctx;
use crate::device::DeviceInstance;
use crate::error::ErrorKind;
use crate::replay::{
    Action, ActionId, ActionSink, ActionStatus, Manager, Query, ReplayError, ReplayInput,
    ReplayOutput, Task, TaskHandler,
};
use crate::stash::RemoteStash;

/// [`Manager`] backed by a remote server.
#[derive(Debug, Clone)]
pub struct RpcClient {
    base_url: String,
    client: Client,
}

impl RpcClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The server's stash, sharing this client's connection pool.
    pub fn stash(&self) -> RemoteStash {
        RemoteStash::with_client(self.base_url.clone(), self.client.clone())
    }

    pub async fn health(&self) -> Result<HealthResponse, ReplayError> {
        let url = format!("{}/api/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(checked(response).await?.json().await?)
    }

    pub async fn devices(&self) -> Result<Vec<DeviceInstance>, ReplayError> {
        let url = format!("{}/api/devices", self.base_url);
        let response = self.client.get(&url).send().await?;
        let body: ListDevicesResponse = checked(response).await?.json().await?;
        Ok(body.devices)
    }

    /// Register as `target` and run every task the server sends until the
    /// server closes the stream.
    pub async fn serve_device(
        &self,
        ctx: &Ctx,
        host: DeviceInstance,
        target: DeviceInstance,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), ReplayError> {
        let tasks = self.connect(host, target).await?;
        self.pump(ctx, tasks, handler.as_ref()).await
    }

    async fn connect(
        &self,
        host: DeviceInstance,
        target: DeviceInstance,
    ) -> Result<NdjsonStream, ReplayError> {
        let url = format!("{}/api/devices/register", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&RegisterRequest {
                host: host.clone(),
                target: target.clone(),
            })
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(ReplayError::AlreadyRegistered {
                host: host.id,
                target: target.id,
            });
        }
        Ok(NdjsonStream::new(checked(response).await?))
    }

    async fn pump(
        &self,
        ctx: &Ctx,
        mut tasks: NdjsonStream,
        handler: &dyn TaskHandler,
    ) -> Result<(), ReplayError> {
        while let Some(task) = tasks.next::<Task>().await? {
            let action = task.action.clone();
            let task_ctx = ctx.child("task");
            if let Err(e) = handler.handle(&task_ctx, task).await {
                tracing::warn!(parent: task_ctx.span(), %action, error = %e, "task failed");
                let output = ReplayOutput::failed(e.to_string());
                if let Err(e) = self
                    .update(&task_ctx, &action, ActionStatus::Failed, Some(output))
                    .await
                {
                    tracing::warn!(parent: task_ctx.span(), %action, error = %e, "could not report failure");
                }
            }
        }
        tracing::info!(parent: ctx.span(), "task stream closed");
        Ok(())
    }
}

#[async_trait]
impl Manager for RpcClient {
    async fn search(
        &self,
        ctx: &Ctx,
        query: &Query,
        sink: &mut dyn ActionSink,
    ) -> Result<(), ReplayError> {
        let url = format!("{}/api/actions", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&SearchParams::from_query(query))
            .send()
            .await?;
        let mut actions = NdjsonStream::new(checked(response).await?);
        while let Some(action) = actions.next::<Action>().await? {
            sink.accept(ctx, action).await?;
        }
        Ok(())
    }

    /// Returns once the server accepts the registration; tasks are then
    /// handled in the background until the server closes the stream.
    async fn register(
        &self,
        ctx: &Ctx,
        host: DeviceInstance,
        target: DeviceInstance,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), ReplayError> {
        let tasks = self.connect(host, target).await?;
        let client = self.clone();
        let ctx = ctx.child("device");
        tokio::spawn(async move {
            if let Err(e) = client.pump(&ctx, tasks, handler.as_ref()).await {
                tracing::warn!(parent: ctx.span(), error = %e, "task stream failed");
            }
        });
        Ok(())
    }

    async fn do_action(
        &self,
        _ctx: &Ctx,
        device: &str,
        input: ReplayInput,
    ) -> Result<ActionId, ReplayError> {
        let url = format!("{}/api/actions", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&DoActionRequest {
                device: device.to_string(),
                input,
            })
            .send()
            .await?;
        let body: DoActionResponse = checked(response).await?.json().await?;
        Ok(body.id)
    }

    async fn update(
        &self,
        _ctx: &Ctx,
        action: &ActionId,
        status: ActionStatus,
        output: Option<ReplayOutput>,
    ) -> Result<(), ReplayError> {
        let url = format!("{}/api/actions/{}", self.base_url, action);
        let response = self
            .client
            .post(&url)
            .json(&UpdateActionRequest { status, output })
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ReplayError::UnknownAction(action.clone()));
        }
        checked(response).await?;
        Ok(())
    }
}

/// Pass successful responses through; turn anything else into an error
/// carrying the server's classification.
async fn checked(response: Response) -> Result<Response, ReplayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let (kind, message) = match serde_json::from_str::<ErrorResponse>(&text) {
        Ok(body) => (body.kind, body.details.unwrap_or(body.error)),
        Err(_) => (kind_of(status), format!("{status} - {text}")),
    };
    Err(ReplayError::Remote { kind, message })
}

fn kind_of(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ErrorKind::Validation,
        StatusCode::CONFLICT => ErrorKind::Protocol,
        StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::AllocationExhausted,
        _ => ErrorKind::Io,
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Newline-delimited JSON records from a streaming response body.
struct NdjsonStream {
    chunks: ByteStream,
    buf: Vec<u8>,
}

impl NdjsonStream {
    fn new(response: Response) -> Self {
        let chunks = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Self {
            chunks: Box::pin(chunks),
            buf: Vec::new(),
        }
    }

    async fn next<T: DeserializeOwned>(&mut self) -> Result<Option<T>, ReplayError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return decode(&line).map(Some);
            }
            match self.chunks.next().await {
                Some(chunk) => self.buf.extend_from_slice(&chunk?),
                None if self.buf.iter().all(u8::is_ascii_whitespace) => return Ok(None),
                None => {
                    let line = std::mem::take(&mut self.buf);
                    return decode(&line).map(Some);
                }
            }
        }
    }
}

fn decode<T: DeserializeOwned>(line: &[u8]) -> Result<T, ReplayError> {
    serde_json::from_slice(line).map_err(|e| ReplayError::Remote {
        kind: ErrorKind::Io,
        message: format!("malformed stream record: {e}"),
    })
}
