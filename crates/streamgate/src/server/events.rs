//! GET /events: open a push-event stream

use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;
use futures_util::stream;
use std::convert::Infallible;
use std::sync::Arc;
use streamgate_core::{ChannelSink, Identity, SessionController};
use tokio::sync::mpsc;

use super::AppState;
use super::error::ApiError;

pub const SESSION_ID_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

/// Frames buffered per stream before writes start to wait
const STREAM_BUFFER: usize = 32;

/// Reports the client going away when the response body is dropped.
///
/// hyper never hands a socket error to the body; a reset or failed write
/// just drops it. Transport loss on a live stream therefore closes the
/// session as `PeerClosed`.
struct PeerCloseGuard(Arc<SessionController>);

impl Drop for PeerCloseGuard {
    fn drop(&mut self) {
        self.0.on_peer_close();
    }
}

pub async fn open_stream(
    State(state): State<AppState>,
    identity: Option<Extension<Identity>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let identity = identity.map(|Extension(identity)| identity);
    let protocol_version = headers
        .get(PROTOCOL_VERSION_HEADER)
        .cloned()
        .map_or_else(|| HeaderValue::from_str(&state.protocol_version), Ok)
        .map_err(|e| ApiError::Internal(format!("invalid protocol version: {e}")))?;

    let (sink, rx) = ChannelSink::new(STREAM_BUFFER);
    let controller = SessionController::open(
        state.registry.clone(),
        Arc::new(sink),
        identity.as_ref(),
        state.lifecycle,
    )
    .await
    .map_err(|e| ApiError::Unavailable(format!("could not open stream: {e}")))?;

    let session_id = HeaderValue::from_str(controller.session_id())
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let body = Body::from_stream(frames(rx, PeerCloseGuard(controller)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .header(SESSION_ID_HEADER, session_id)
        .header(PROTOCOL_VERSION_HEADER, protocol_version)
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Drain the sink's channel into the response body. The stream ends when
/// the session closes its sink; dropping it early counts as a peer close.
fn frames(
    rx: mpsc::Receiver<String>,
    guard: PeerCloseGuard,
) -> impl futures_util::Stream<Item = Result<String, Infallible>> {
    stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let frame = rx.recv().await?;
        Some((Ok(frame), (rx, guard)))
    })
}
