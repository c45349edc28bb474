//! Native per-call contexts handed to a [`TakeOver`](crate::TakeOver).
//!
//! Both contexts are transport-neutral handles: the HTTP adapter and the
//! socket adapter own the other end of the channels and turn what the
//! handler writes into a streaming response or outbound frames.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::ContextClosed;
use crate::frame::SocketFrame;

/// Context of whichever transport carried the call.
#[derive(Debug)]
pub enum NativeContext {
    Http(HttpContext),
    Socket(SocketContext),
}

impl NativeContext {
    pub fn into_http(self) -> Option<HttpContext> {
        match self {
            Self::Http(ctx) => Some(ctx),
            Self::Socket(_) => None,
        }
    }

    pub fn into_socket(self) -> Option<SocketContext> {
        match self {
            Self::Socket(ctx) => Some(ctx),
            Self::Http(_) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// The inbound request plus a writer for the response.
#[derive(Debug)]
pub struct HttpContext {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    /// Header names are lowercase.
    pub headers: BTreeMap<String, String>,
    /// Raw request body. Empty for multipart uploads.
    pub body: Bytes,
    pub response: ResponseWriter,
}

/// Status line and headers, sent once before the first body chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
        }
    }
}

/// Handler side of a streamed HTTP response.
#[derive(Debug)]
pub struct ResponseWriter {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: mpsc::Sender<Bytes>,
}

/// Adapter side of a streamed HTTP response.
#[derive(Debug)]
pub struct PendingResponse {
    pub head: oneshot::Receiver<ResponseHead>,
    pub body: mpsc::Receiver<Bytes>,
}

impl ResponseWriter {
    /// Create a writer and the matching receiver. `buffer` bounds the number
    /// of body chunks in flight.
    pub fn channel(buffer: usize) -> (Self, PendingResponse) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                head: Some(head_tx),
                body: body_tx,
            },
            PendingResponse {
                head: head_rx,
                body: body_rx,
            },
        )
    }

    /// Send status and headers. Only the first call has an effect; returns
    /// whether this call sent the head.
    pub fn send_head(&mut self, status: u16, headers: Vec<(String, String)>) -> bool {
        match self.head.take() {
            Some(tx) => tx.send(ResponseHead { status, headers }).is_ok(),
            None => false,
        }
    }

    pub fn head_sent(&self) -> bool {
        self.head.is_none()
    }

    /// Write one body chunk, sending a default `200` head first if needed.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), ContextClosed> {
        if !self.head_sent() {
            self.send_head(200, Vec::new());
        }
        self.body.send(chunk.into()).await.map_err(|_| ContextClosed)
    }

    /// Finish the response. Dropping the writer has the same effect.
    pub fn finish(mut self) {
        if !self.head_sent() {
            self.send_head(200, Vec::new());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket
// ─────────────────────────────────────────────────────────────────────────────

/// The connection a socket call arrived on.
#[derive(Debug, Clone)]
pub struct SocketContext {
    pub connection_id: String,
    /// Acknowledgment id of the call, if the caller asked for one.
    pub ack_id: Option<Value>,
    outbound: mpsc::Sender<String>,
}

impl SocketContext {
    pub fn new(connection_id: impl Into<String>, ack_id: Option<Value>, outbound: mpsc::Sender<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            ack_id,
            outbound,
        }
    }

    /// Push an event frame to this connection.
    pub async fn emit(&self, event: &str, data: Value) -> Result<(), ContextClosed> {
        self.send_frame(SocketFrame::new(event, data)).await
    }

    /// Acknowledge the call with an arbitrary payload. No-op when the caller
    /// did not ask for an acknowledgment.
    pub async fn ack(&self, data: Value) -> Result<(), ContextClosed> {
        match &self.ack_id {
            Some(id) => self.send_frame(SocketFrame::ack(id.clone(), data)).await,
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    async fn send_frame(&self, frame: SocketFrame) -> Result<(), ContextClosed> {
        self.outbound
            .send(frame.to_text())
            .await
            .map_err(|_| ContextClosed)
    }
}
