//! WebSocket upgrade glue for terminal sessions

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AppState;
use super::response::ApiError;
use crate::domain::{IpPreference, TerminalSize};
use crate::error::{BridgeError, Result};
use crate::ports::SshConnector;
use crate::relay::{TerminalRequest, WsFrame};

#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    pub host_id: u64,
    pub token: Option<String>,
    pub ip_type: Option<String>,
    pub cols: Option<i64>,
    pub rows: Option<i64>,
}

impl TerminalQuery {
    /// Validate the query into a terminal request.
    ///
    /// A size is only taken when both values are present and valid.
    fn into_request(self) -> Result<TerminalRequest> {
        let ip_preference = match self.ip_type.as_deref().map(str::trim) {
            None | Some("") => IpPreference::default(),
            Some(raw) => raw.parse()?,
        };
        let size = match (self.cols, self.rows) {
            (Some(cols), Some(rows)) => {
                let size = TerminalSize::from_signed(cols, rows);
                if size.is_none() {
                    warn!(cols, rows, "Ignoring invalid initial terminal size");
                }
                size
            }
            _ => None,
        };
        Ok(TerminalRequest {
            host_id: self.host_id,
            ip_preference,
            size,
        })
    }
}

/// `GET /api/v1/cmdb/ws/ssh`
///
/// The token is checked before the upgrade; a rejected token never reaches
/// the WebSocket protocol.
pub async fn terminal<C: SshConnector>(
    State(state): State<AppState<C>>,
    headers: HeaderMap,
    Query(query): Query<TerminalQuery>,
    upgrade: Option<WebSocketUpgrade>,
) -> Response {
    if let Err(e) = state.authorize(&headers, query.token.as_deref()) {
        warn!(host_id = query.host_id, "Rejected terminal request");
        return ApiError(e).into_response();
    }
    let request = match query.into_request() {
        Ok(request) => request,
        Err(e) => return ApiError(e).into_response(),
    };
    let Some(upgrade) = upgrade else {
        return ApiError(BridgeError::Config(
            "a WebSocket upgrade request is required".to_string(),
        ))
        .into_response();
    };

    let terminal = Arc::clone(&state.terminal);
    upgrade.on_upgrade(move |socket| async move {
        let (sink, stream) = adapt(socket);
        if let Err(e) = terminal.serve(request, sink, stream).await {
            debug!(host_id = request.host_id, error = %e, "Terminal request ended during setup");
        }
    })
}

fn to_message(frame: WsFrame) -> Message {
    match frame {
        WsFrame::Text(text) => Message::Text(text),
        WsFrame::Binary(data) => Message::Binary(data.to_vec()),
        WsFrame::Ping(data) => Message::Ping(data.to_vec()),
        WsFrame::Pong(data) => Message::Pong(data.to_vec()),
        WsFrame::Close => Message::Close(None),
    }
}

fn from_message(message: Message) -> WsFrame {
    match message {
        Message::Text(text) => WsFrame::Text(text),
        Message::Binary(data) => WsFrame::Binary(Bytes::from(data)),
        Message::Ping(data) => WsFrame::Ping(Bytes::from(data)),
        Message::Pong(data) => WsFrame::Pong(Bytes::from(data)),
        Message::Close(_) => WsFrame::Close,
    }
}

/// Split an axum socket into the frame sink and stream the relay expects.
fn adapt(
    socket: WebSocket,
) -> (
    impl Sink<WsFrame, Error = BridgeError> + Send + Unpin + 'static,
    impl Stream<Item = Result<WsFrame>> + Send + Unpin + 'static,
) {
    let (sink, stream) = socket.split();
    let sink = sink
        .sink_map_err(|e| BridgeError::relay_io("websocket write", e))
        .with(|frame: WsFrame| future::ready(Ok::<_, BridgeError>(to_message(frame))));
    let stream = stream.map(|message| {
        message
            .map(from_message)
            .map_err(|e| BridgeError::relay_io("websocket read", e))
    });
    (sink, stream)
}
