//! Persistent-socket adapter over WebSocket.
//!
//! Every `call` frame runs as its own task against the shared handler and is
//! acknowledged with an `ack` frame carrying the envelope. Malformed frames,
//! bad paths and handler errors become failure envelopes; none of them close
//! the connection.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use micro_protocol::{
    CallError, CallPayload, CallTarget, Envelope, NativeContext, Origin, Reply, SocketContext,
    SocketFrame,
};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::ClientConnection;
use crate::http::header_value;
use crate::server::{AppState, CallHandler};

/// Body of a `call` frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    path: String,
    #[serde(default)]
    token: Option<Value>,
    #[serde(default)]
    access_key: Option<Value>,
    #[serde(default)]
    signature: Option<Value>,
    #[serde(default)]
    data: Value,
}

impl CallRequest {
    fn into_parts(self) -> Result<(CallTarget, CallPayload), CallError> {
        let target = CallTarget::parse(&self.path)?;
        let mut payload = CallPayload::new(Origin::Socket).with_data(self.data);
        payload.token = self.token.as_ref().and_then(header_value);
        payload.access_key = self.access_key.as_ref().and_then(header_value);
        payload.signature = self.signature.as_ref().and_then(header_value);
        Ok((target, payload))
    }
}

pub(crate) async fn upgrade_handler<H: CallHandler>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<H>>>,
) -> Response {
    // Check connection limit
    let max = state.config.socket.as_ref().and_then(|s| s.max_connections);
    if let Some(max) = max {
        let current = state.connections.len();
        if current >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_connection(socket, state))
        .into_response()
}

async fn handle_connection<H: CallHandler>(socket: WebSocket, state: Arc<AppState<H>>) {
    let client_id = uuid::Uuid::new_v4().to_string();
    state
        .connections
        .insert(client_id.clone(), ClientConnection::new(client_id.clone()));
    info!("Client connected: {client_id}");

    let buffer = state
        .config
        .socket
        .as_ref()
        .map(|s| s.outbound_buffer)
        .unwrap_or(256);
    let (out_tx, mut out_rx) = mpsc::channel::<String>(buffer.max(1));
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_frame(text.as_str(), &state, &client_id, &out_tx);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Client closed: {client_id}");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {client_id}: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            Some(frame) = out_rx.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(frame.into())).await {
                    warn!("Failed to send to {client_id}: {e}");
                    break;
                }
            }
        }
    }

    state.connections.remove(&client_id);
    info!(
        "Client disconnected: {client_id} (total: {})",
        state.connections.len()
    );
}

/// Parse one inbound frame and spawn its call.
fn dispatch_frame<H: CallHandler>(
    text: &str,
    state: &Arc<AppState<H>>,
    client_id: &str,
    out_tx: &mpsc::Sender<String>,
) {
    if let Some(mut conn) = state.connections.get_mut(client_id) {
        conn.touch();
    }

    let raw: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unparseable frame from {client_id}: {e}");
            return;
        }
    };

    let frame: SocketFrame = match serde_json::from_value(raw.clone()) {
        Ok(f) => f,
        Err(_) => {
            // Still acknowledge if the caller gave us an id to answer on.
            if let Some(id) = raw.get("id").cloned() {
                let out_tx = out_tx.clone();
                tokio::spawn(async move {
                    send_ack(&out_tx, id, Envelope::failure(&CallError::invalid_request())).await;
                });
            }
            return;
        }
    };

    if !frame.is_call() {
        debug!("Ignoring '{}' frame from {client_id}", frame.event);
        return;
    }

    if let Some(mut conn) = state.connections.get_mut(client_id) {
        conn.record_call();
    }

    let handler = state.handler.clone();
    let ctx = SocketContext::new(client_id, frame.id.clone(), out_tx.clone());
    let out_tx = out_tx.clone();

    tokio::spawn(async move {
        let ack_id = ctx.ack_id.clone();
        if let Some(envelope) = run_call(handler.as_ref(), frame.data, ctx).await {
            match ack_id {
                Some(id) => send_ack(&out_tx, id, envelope).await,
                None => debug!("Call without acknowledgment id completed"),
            }
        }
    });
}

/// Route one call. `None` means a takeover handled the response itself.
async fn run_call<H: CallHandler>(handler: &H, data: Value, ctx: SocketContext) -> Option<Envelope> {
    let parts = serde_json::from_value::<CallRequest>(data)
        .map_err(|_| CallError::invalid_request())
        .and_then(CallRequest::into_parts);

    let (target, payload) = match parts {
        Ok(parts) => parts,
        Err(e) => return Some(Envelope::failure(&e)),
    };

    debug!("Socket call {target} on {}", ctx.connection_id);

    match handler.handle_call(target, payload).await {
        Ok(Reply::Value(value)) => Some(Envelope::success(value)),
        Ok(Reply::TakeOver(take_over)) => {
            take_over.run(NativeContext::Socket(ctx)).await;
            None
        }
        Err(e) => {
            debug!("Socket call failed: {e}");
            Some(Envelope::failure(&e))
        }
    }
}

async fn send_ack(out_tx: &mpsc::Sender<String>, id: Value, envelope: Envelope) {
    let data = serde_json::to_value(envelope).unwrap_or(Value::Null);
    if out_tx.send(SocketFrame::ack(id, data).to_text()).await.is_err() {
        debug!("Connection closed before acknowledgment");
    }
}
