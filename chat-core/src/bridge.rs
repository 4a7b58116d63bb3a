//! Request/response over a dedicated connection.
//!
//! [`transact`] opens a connection, sends one request, waits for one reply
//! and closes. [`transact_keep`] does the same but hands back the live
//! connection when the server accepts the request, which is how the login
//! flow obtains the socket it later upgrades to a chat session.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ChatError;
use crate::exchange::{ClosePolicy, Exchange, Outcome};
use crate::message::{Request, Response, StatusCode};
use crate::network::{ConnectionHandler, ConnectionInfo, LoggingHandler, SocketConnection};

/// The response every failed exchange without a reply collapses to.
pub fn fallback_response() -> Response {
    Response::with_status(StatusCode::SERVICE_UNAVAILABLE)
}

/// Send `request` to `info` and return the server's reply.
///
/// Never fails: a timeout yields `408 Request Timeout`, an unreachable or
/// misbehaving server yields [`fallback_response`]. The connection is
/// closed before this returns.
pub async fn transact(info: &ConnectionInfo, timeout: Duration, request: &Request) -> Response {
    let (exchange, done) = match Exchange::new(request, ClosePolicy::Always) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(url = %request.url, error = %e, "unable to serialize request");
            return Response::with_status(StatusCode::BAD_REQUEST);
        }
    };

    let conn = SocketConnection::new(info.clone());
    let exchange = Arc::new(exchange);
    let outcome = exchange.run(&conn, timeout, done).await;
    debug!(server = %info, url = %request.url, ?outcome, "transaction finished");

    match outcome {
        Outcome::Reply(response) => response,
        Outcome::Timeout => Response::with_status(StatusCode::REQUEST_TIMEOUT),
        Outcome::Unavailable | Outcome::SendFailed(_) | Outcome::Malformed(_) => {
            fallback_response()
        }
    }
}

/// Send `request` to `info` and keep the connection open on success.
///
/// The returned connection has a [`LoggingHandler`] installed; use
/// [`transact_keep_with`] to pick the handler set up front.
pub async fn transact_keep(
    info: &ConnectionInfo,
    timeout: Duration,
    request: &Request,
) -> Result<SocketConnection, ChatError> {
    transact_keep_with(info, timeout, request, Arc::new(LoggingHandler)).await
}

/// Like [`transact_keep`], installing `steady` on the connection the moment
/// a 2xx reply is decoded. Frames that follow the reply in the same read
/// reach `steady`.
///
/// # Errors
///
/// - [`ChatError::Rejected`] when the server answered with a non-2xx status
///   (the connection is closed).
/// - [`ChatError::Timeout`] when no reply arrived in time.
/// - [`ChatError::Unavailable`] when the server could not be reached or the
///   request could not be written.
/// - [`ChatError::Parse`] when the reply was not a valid response.
pub async fn transact_keep_with(
    info: &ConnectionInfo,
    timeout: Duration,
    request: &Request,
    steady: Arc<dyn ConnectionHandler>,
) -> Result<SocketConnection, ChatError> {
    let (exchange, done) = Exchange::new(request, ClosePolicy::OnFailure)?;
    let exchange = Arc::new(exchange.hand_off_to(steady, false));

    let conn = SocketConnection::new(info.clone());
    match exchange.run(&conn, timeout, done).await {
        Outcome::Reply(response) if response.is_success() => {
            exchange.hand_off(&conn);
            Ok(conn)
        }
        Outcome::Reply(response) => Err(ChatError::Rejected(Box::new(response))),
        Outcome::Timeout => Err(ChatError::Timeout(timeout)),
        Outcome::Unavailable => Err(ChatError::Unavailable),
        Outcome::SendFailed(e) => {
            debug!(server = %info, error = %e, "request was not written");
            Err(ChatError::Unavailable)
        }
        Outcome::Malformed(e) => Err(ChatError::Parse(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PROTO_HTTP;
    use tokio::net::TcpListener;

    async fn refused() -> ConnectionInfo {
        // Bind then drop so the port is known to be closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        ConnectionInfo::from(addr)
    }

    #[test]
    fn fallback_is_service_unavailable() {
        let resp = fallback_response();
        assert_eq!(resp.status_code, 503);
        assert_eq!(resp.status, "Service Unavailable");
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_yields_fallback() {
        let info = refused().await;
        let request = Request::new("GET", "/api/v1/ping", PROTO_HTTP);
        let resp = transact(&info, Duration::from_secs(2), &request).await;
        assert_eq!(resp, fallback_response());
    }

    #[tokio::test]
    async fn keep_against_unreachable_server_is_unavailable() {
        let info = refused().await;
        let request = Request::new("POST", "/api/v1/signin", PROTO_HTTP);
        let result = transact_keep(&info, Duration::from_secs(2), &request).await;
        assert!(matches!(result, Err(ChatError::Unavailable)));
    }
}
