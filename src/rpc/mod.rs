//! HTTP surface of the replay manager and the stash.
//!
//! Streaming endpoints (action search, device task feeds) answer with
//! newline-delimited JSON so either side can consume records as they come.

mod client;
mod error;
mod handlers;
mod routes;
mod server;
mod state;

pub use client::RpcClient;
pub use error::{ErrorResponse, RpcError};
pub use handlers::actions::{DoActionRequest, DoActionResponse, SearchParams, UpdateActionRequest};
pub use handlers::devices::{ListDevicesResponse, RegisterRequest};
pub use handlers::stash::PutBlobResponse;
pub use server::{build_router, run_server};
pub use state::AppState;

/// Content type of streaming responses.
pub const NDJSON: &str = "application/x-ndjson";
