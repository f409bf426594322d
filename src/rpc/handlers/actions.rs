//! Action handlers: search, submission and status reports.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::ndjson;
use crate::context::Ctx;
use crate::replay::{
    Action, ActionId, ActionStatus, Manager, Query as ActionQuery, ReplayInput, ReplayOutput,
};
use crate::rpc::error::RpcError;
use crate::rpc::state::AppState;

/// Query string of `GET /api/actions`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl SearchParams {
    pub fn from_query(query: &ActionQuery) -> Self {
        Self {
            id: query.id.as_ref().map(|id| id.to_string()),
            device: query.device.clone(),
            status: query.status.map(|s| s.to_string()),
        }
    }

    fn into_query(self) -> Result<ActionQuery, RpcError> {
        let status = self
            .status
            .map(|s| s.parse::<ActionStatus>())
            .transpose()
            .map_err(RpcError::BadRequest)?;
        Ok(ActionQuery {
            id: self.id.map(ActionId::from),
            device: self.device,
            status,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoActionRequest {
    pub device: String,
    pub input: ReplayInput,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoActionResponse {
    pub id: ActionId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateActionRequest {
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<ReplayOutput>,
}

/// Stream matching actions, oldest first.
pub async fn search_actions(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, RpcError> {
    let query = params.into_query()?;
    let (tx, rx) = mpsc::channel::<Action>(state.config().manager.search_stream_depth);
    let manager = state.manager().clone();

    tokio::spawn(async move {
        let ctx = Ctx::new("search");
        let mut sink = tx;
        if let Err(e) = manager.search(&ctx, &query, &mut sink).await {
            tracing::debug!(parent: ctx.span(), error = %e, "search ended early");
        }
    });

    Ok(ndjson(rx, ()))
}

/// Submit a new action.
pub async fn do_action(
    State(state): State<AppState>,
    Json(req): Json<DoActionRequest>,
) -> Result<(StatusCode, Json<DoActionResponse>), RpcError> {
    if req.device.trim().is_empty() {
        return Err(RpcError::BadRequest("device must not be empty".to_string()));
    }
    let ctx = Ctx::new("do");
    let id = state
        .manager()
        .do_action(&ctx, &req.device, req.input)
        .await?;
    Ok((StatusCode::CREATED, Json(DoActionResponse { id })))
}

/// Report a status change of an action.
pub async fn update_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateActionRequest>,
) -> Result<StatusCode, RpcError> {
    let ctx = Ctx::new("update");
    state
        .manager()
        .update(&ctx, &ActionId::from(id), req.status, req.output)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
