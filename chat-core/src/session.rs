//! Upgrading a connection into a persistent chat session.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::exchange::{ClosePolicy, Exchange, Outcome};
use crate::message::{Request, Response, StatusCode};
use crate::network::{ConnectionHandler, SocketConnection};

/// Endpoint the handshake targets unless configured otherwise.
pub const DEFAULT_CHAT_ENDPOINT: &str = "/api/v1/chatting";

/// Performs the streaming handshake on an existing connection.
///
/// While the handshake is in flight the connection's handlers are replaced
/// by a handshake-local set. Once it resolves, whatever the outcome, the
/// caller's steady-state handler set is installed exactly once.
#[derive(Debug, Clone)]
pub struct SessionManager {
    timeout: Duration,
    endpoint: String,
}

impl SessionManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Run the handshake on `conn` and return the server's answer.
    ///
    /// Connects `conn` if needed; when it is already up the handshake is
    /// sent immediately. A timeout answers `408`, a failed write `400`, and
    /// anything else without a usable reply `503`. The connection is left
    /// open unless the handshake failed at the transport level.
    pub async fn connect(&self, conn: &SocketConnection, steady: Arc<dyn ConnectionHandler>) -> Response {
        let request = Request::handshake(self.endpoint.as_str());
        let (exchange, done) = match Exchange::new(&request, ClosePolicy::Never) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "unable to serialize handshake");
                conn.set_handler(steady);
                return Response::with_status(StatusCode::BAD_REQUEST);
            }
        };
        let exchange = Arc::new(exchange.hand_off_to(steady, true));

        debug!(server = %conn.info(), endpoint = %self.endpoint, "starting handshake");
        let outcome = exchange.run(conn, self.timeout, done).await;
        // Usually already done from inside the reply handler.
        exchange.hand_off(conn);

        match outcome {
            Outcome::Reply(response) => {
                if response.is_success() {
                    info!(server = %conn.info(), "chat session established");
                } else {
                    warn!(server = %conn.info(), status = %response.code(), "handshake refused");
                }
                response
            }
            Outcome::Timeout => Response::with_status(StatusCode::REQUEST_TIMEOUT),
            Outcome::SendFailed(e) => {
                warn!(server = %conn.info(), error = %e, "handshake was not sent");
                Response::with_status(StatusCode::BAD_REQUEST)
            }
            Outcome::Unavailable | Outcome::Malformed(_) => {
                Response::with_status(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{ConnectionInfo, LoggingHandler};
    use tokio::net::TcpListener;

    #[test]
    fn defaults() {
        let manager = SessionManager::new(Duration::from_secs(5));
        assert_eq!(manager.endpoint(), DEFAULT_CHAT_ENDPOINT);
        assert_eq!(manager.timeout(), Duration::from_secs(5));
        let manager = manager.with_endpoint("/api/v2/chat");
        assert_eq!(manager.endpoint(), "/api/v2/chat");
    }

    #[tokio::test]
    async fn refused_connect_restores_steady_handler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let conn = SocketConnection::new(ConnectionInfo::from(addr));
        let steady: Arc<dyn ConnectionHandler> = Arc::new(LoggingHandler);
        let resp = SessionManager::new(Duration::from_secs(2))
            .connect(&conn, steady.clone())
            .await;

        assert_eq!(resp.status_code, 503);
        assert!(Arc::ptr_eq(&conn.handler(), &steady));
    }
}
