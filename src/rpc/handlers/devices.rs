//! Device handlers: listing and task-stream registration.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use axum::{extract::State, response::Response, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ndjson;
use crate::context::Ctx;
use crate::device::DeviceInstance;
use crate::replay::{LocalManager, Manager, ReplayError, Task, TaskHandler};
use crate::rpc::error::RpcError;
use crate::rpc::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ListDevicesResponse {
    pub devices: Vec<DeviceInstance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub host: DeviceInstance,
    pub target: DeviceInstance,
}

pub async fn list_devices(State(state): State<AppState>) -> Json<ListDevicesResponse> {
    Json(ListDevicesResponse {
        devices: state.devices().devices(),
    })
}

/// Forwards tasks to the response stream of a remote device. A task still
/// buffered when the device disconnects stays `Running`.
struct StreamHandler {
    tasks: mpsc::Sender<Task>,
}

#[async_trait]
impl TaskHandler for StreamHandler {
    async fn handle(&self, _ctx: &Ctx, task: Task) -> Result<(), ReplayError> {
        self.tasks
            .send(task)
            .await
            .map_err(|_| ReplayError::Handler("device disconnected".to_string()))
    }
}

/// Removes the registration once the device's stream is dropped.
struct Registration {
    manager: Weak<LocalManager>,
    ctx: Ctx,
    host: String,
    target: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.unregister(&self.ctx, &self.host, &self.target);
        }
    }
}

/// Register a device and stream its tasks until it disconnects.
pub async fn register_device(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Response, RpcError> {
    let ctx = Ctx::new("register");
    let (tx, rx) = mpsc::channel(state.config().manager.register_stream_depth);
    let handler = Arc::new(StreamHandler { tasks: tx });

    state
        .manager()
        .register(&ctx, req.host.clone(), req.target.clone(), handler)
        .await?;

    let guard = Registration {
        manager: Arc::downgrade(state.manager()),
        ctx,
        host: req.host.id,
        target: req.target.id,
    };
    Ok(ndjson(rx, guard))
}
