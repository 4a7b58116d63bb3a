//! Event handler sets for a [`SocketConnection`].
//!
//! A connection dispatches its four events (connect / data / close /
//! error) to exactly one handler set at a time. Swapping the set with
//! [`SocketConnection::set_handler`] replaces all four callbacks at once.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::network::connection::SocketConnection;

/// Callbacks invoked by a [`SocketConnection`]'s I/O task.
///
/// Events for one connection are delivered sequentially, never
/// concurrently. Every method has a default, so implementors only
/// override what they care about.
#[async_trait]
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The transport acknowledged the connect; frames may be sent.
    async fn on_connect(&self, _conn: &SocketConnection) {}

    /// One complete, unmasked frame payload arrived.
    async fn on_data(&self, _conn: &SocketConnection, _payload: Bytes) {}

    /// The transport was released. The connection is `Disconnected`.
    async fn on_close(&self, _conn: &SocketConnection) {}

    /// The transport reported a failure. `on_close` follows.
    async fn on_error(&self, _conn: &SocketConnection, _err: &ChatError) {}
}

/// Handler set installed on every new connection: logs and drops.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

#[async_trait]
impl ConnectionHandler for LoggingHandler {
    async fn on_connect(&self, conn: &SocketConnection) {
        info!(server = %conn.info(), "connection is established");
    }

    async fn on_data(&self, conn: &SocketConnection, payload: Bytes) {
        debug!(
            server = %conn.info(),
            data = %String::from_utf8_lossy(&payload),
            "unhandled frame"
        );
    }

    async fn on_close(&self, conn: &SocketConnection) {
        info!(server = %conn.info(), "connection is closed");
    }

    async fn on_error(&self, conn: &SocketConnection, err: &ChatError) {
        warn!(server = %conn.info(), error = %err, "connection error");
    }
}
