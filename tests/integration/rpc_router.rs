//! Integration tests for the RPC API
//!
//! Router-level tests drive the axum app with `oneshot`; the end-to-end
//! test serves it on a local port and talks to it with `RpcClient`.

use super::common::fixtures::{capture_bytes, frame_capture, test_state, wait_terminal};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use gfxreplay::capture::{decode_atoms, DEFAULT_MAX_FRAME_SIZE};
use gfxreplay::replay::{Query, ReplayWorker};
use gfxreplay::rpc::{
    build_router, DoActionRequest, DoActionResponse, ErrorResponse, ListDevicesResponse,
    PutBlobResponse, RegisterRequest, RpcClient, NDJSON,
};
use gfxreplay::stash::{Stash, StashKey};
use gfxreplay::{
    Action, ActionStatus, Ctx, DeviceInstance, ErrorKind, GlVersion, Manager, ReplayInput,
    TransformSpec,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

fn json_request(method: Method, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn submit(device: &str) -> DoActionRequest {
    DoActionRequest {
        device: device.to_string(),
        input: ReplayInput {
            capture: StashKey::of(b"capture"),
            transforms: vec![TransformSpec::UndefinedFramebuffer],
        },
    }
}

#[tokio::test]
async fn test_health() {
    let (state, _dir) = test_state().await;
    let response = build_router(state).oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_stash_put_get_head() {
    let (state, _dir) = test_state().await;
    let app = build_router(state);

    let put = Request::builder()
        .method(Method::PUT)
        .uri("/api/stash")
        .body(Body::from(b"blob".to_vec()))
        .unwrap();
    let response = app.clone().oneshot(put).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let PutBlobResponse { key } = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(key, StashKey::of(b"blob"));

    let response = app
        .clone()
        .oneshot(get(&format!("/api/stash/{key}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"blob");

    let head = |key: String| {
        Request::builder()
            .method(Method::HEAD)
            .uri(format!("/api/stash/{key}"))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(head(key.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let other = StashKey::of(b"other");
    let response = app.clone().oneshot(head(other.to_string())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get(&format!("/api/stash/{other}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.oneshot(get("/api/stash/not-a-key")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_do_then_search_streams_ndjson() {
    let (state, _dir) = test_state().await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/actions", &submit("phone")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let DoActionResponse { id } = serde_json::from_slice(&body_bytes(response).await).unwrap();

    app.clone()
        .oneshot(json_request(Method::POST, "/api/actions", &submit("tablet")))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/actions?device=phone&status=pending"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], NDJSON);
    let body = String::from_utf8(body_bytes(response).await).unwrap();
    let actions: Vec<Action> = body
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].id, id);
    assert_eq!(actions[0].status, ActionStatus::Pending);
}

#[tokio::test]
async fn test_update_rejects_illegal_transition() {
    let (state, _dir) = test_state().await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/actions", &submit("phone")))
        .await
        .unwrap();
    let DoActionResponse { id } = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let uri = format!("/api/actions/{id}");

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &uri,
            &serde_json::json!({ "status": "failed", "output": { "error": "lost device" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            &uri,
            &serde_json::json!({ "status": "running" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body.kind, ErrorKind::Protocol);

    let response = app
        .oneshot(json_request(
            Method::POST,
            "/api/actions/unknown",
            &serde_json::json!({ "status": "running" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_rejects_unknown_status() {
    let (state, _dir) = test_state().await;
    let response = build_router(state)
        .oneshot(get("/api/actions?status=sleeping"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_streams_tasks_and_lists_devices() {
    let (state, _dir) = test_state().await;
    let app = build_router(state.clone());
    let phone = DeviceInstance::new("phone", GlVersion::new(2, 0));
    let register = RegisterRequest {
        host: DeviceInstance::new("host", GlVersion::new(3, 0)),
        target: phone.clone(),
    };

    let response = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/devices/register", &register))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let duplicate = app
        .clone()
        .oneshot(json_request(Method::POST, "/api/devices/register", &register))
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let devices = app.clone().oneshot(get("/api/devices")).await.unwrap();
    let ListDevicesResponse { devices } =
        serde_json::from_slice(&body_bytes(devices).await).unwrap();
    assert!(devices.contains(&phone));

    let ctx = Ctx::new("test");
    let id = state
        .manager()
        .do_action(&ctx, "phone", submit("phone").input)
        .await
        .unwrap();

    let mut body = response.into_body();
    let frame = body.frame().await.unwrap().unwrap();
    let line = frame.into_data().unwrap();
    let task: gfxreplay::replay::Task = serde_json::from_slice(&line).unwrap();
    assert_eq!(task.action, id);

    // Dropping the stream releases the registration.
    drop(body);
    let again = app
        .oneshot(json_request(Method::POST, "/api/devices/register", &register))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_remote_device_runs_replay_end_to_end() {
    let (state, _dir) = test_state().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let ctx = Ctx::new("test");
    let client = Arc::new(RpcClient::new(format!("http://{addr}")));
    assert_eq!(client.health().await.unwrap().status, "ok");

    let phone = DeviceInstance::new("phone", GlVersion::new(3, 0));
    let worker = ReplayWorker::new(
        &client,
        Arc::new(client.stash()),
        phone.clone(),
        state.config().pipeline,
    );
    client
        .register(&ctx, phone.clone(), phone.clone(), Arc::new(worker))
        .await
        .unwrap();

    let capture = client
        .stash()
        .put(&ctx, capture_bytes(&frame_capture(2, false)))
        .await
        .unwrap();
    let id = client
        .do_action(
            &ctx,
            "phone",
            ReplayInput {
                capture,
                transforms: vec![TransformSpec::UndefinedFramebuffer],
            },
        )
        .await
        .unwrap();

    let action = wait_terminal(client.as_ref(), &id).await;
    assert_eq!(action.status, ActionStatus::Succeeded, "{action:?}");
    let output = action.output.unwrap();
    let bytes = state.stash().get(&ctx, &output.result.unwrap()).await.unwrap();
    let atoms = decode_atoms(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap();
    assert_eq!(atoms.len() as u64, output.atoms);
    // One pattern for the new surface and one per discarding swap.
    let draws = atoms.iter().filter(|(_, a)| a.flags().is_draw_call()).count();
    assert_eq!(draws, 3);

    let mut seen: Vec<Action> = Vec::new();
    client
        .search(&ctx, &Query::all(), &mut seen)
        .await
        .unwrap();
    assert_eq!(seen.len(), 1);
}
