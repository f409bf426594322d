pub mod actions;
pub mod devices;
pub mod stash;

use axum::{
    body::{Body, Bytes},
    http::header,
    response::{IntoResponse, Response},
};
use futures::stream;
use serde::Serialize;
use tokio::sync::mpsc;

use super::NDJSON;

/// Stream every record received on `rx` as one JSON line. `guard` lives
/// exactly as long as the response body, so dropping it observes the
/// client going away.
pub(crate) fn ndjson<T, G>(rx: mpsc::Receiver<T>, guard: G) -> Response
where
    T: Serialize + Send + 'static,
    G: Send + 'static,
{
    let lines = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let record = rx.recv().await?;
        let line = serde_json::to_vec(&record).map(|mut line| {
            line.push(b'\n');
            Bytes::from(line)
        });
        Some((line, (rx, guard)))
    });
    ([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response()
}
