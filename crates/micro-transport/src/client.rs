//! Socket client connection state tracking.

use std::time::Instant;

/// One live socket connection. Lives exactly as long as the connection.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Unique connection ID
    pub id: String,
    /// When the client connected
    pub connected_at: Instant,
    /// Last time we received any frame from this client
    pub last_activity: Instant,
    /// `call` frames received on this connection
    pub calls: u64,
}

impl ClientConnection {
    pub fn new(id: String) -> Self {
        let now = Instant::now();
        Self {
            id,
            connected_at: now,
            last_activity: now,
            calls: 0,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn record_call(&mut self) {
        self.calls += 1;
        self.touch();
    }
}
