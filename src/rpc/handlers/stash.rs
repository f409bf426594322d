use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::context::Ctx;
use crate::rpc::error::RpcError;
use crate::rpc::state::AppState;
use crate::stash::StashKey;

#[derive(Debug, Serialize, Deserialize)]
pub struct PutBlobResponse {
    pub key: StashKey,
}

pub async fn put_blob(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<PutBlobResponse>, RpcError> {
    let ctx = Ctx::new("stash_put");
    let key = state.stash().put(&ctx, body.to_vec()).await?;
    Ok(Json(PutBlobResponse { key }))
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, RpcError> {
    let ctx = Ctx::new("stash_get");
    let key = StashKey::parse(&key)?;
    let bytes = state.stash().get(&ctx, &key).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response())
}

pub async fn head_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, RpcError> {
    let ctx = Ctx::new("stash_head");
    let key = StashKey::parse(&key)?;
    if state.stash().exists(&ctx, &key).await? {
        Ok(StatusCode::OK)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
