//! One request, one reply, over a [`SocketConnection`].
//!
//! [`Exchange`] is the handler set shared by the request/response bridge
//! and the session handshake. It sends a single masked request when the
//! transport comes up, treats the first decoded frame as the reply, and
//! races that reply against the connection timer. The outcome lands in a
//! one-shot slot: the first of reply / timeout / close / send failure
//! wins and every later resolution is ignored.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::frame::Opcode;
use crate::message::{Request, Response};
use crate::network::connection::lock;
use crate::network::{ConnectionHandler, SocketConnection};

/// What to do with the connection once the reply has been parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClosePolicy {
    /// Transact-and-close.
    Always,
    /// Transact-and-keep: close only on a non-2xx reply.
    OnFailure,
    /// Handshake: leave the connection to the caller.
    Never,
}

/// How an exchange ended.
#[derive(Debug)]
pub(crate) enum Outcome {
    Reply(Response),
    Timeout,
    /// Connect failed or the connection closed before a reply.
    Unavailable,
    SendFailed(ChatError),
    Malformed(serde_json::Error),
}

pub(crate) struct Exchange {
    request: Bytes,
    policy: ClosePolicy,
    handoff: Mutex<Option<Arc<dyn ConnectionHandler>>>,
    handoff_on_failure: bool,
    slot: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl Exchange {
    pub(crate) fn new(
        request: &Request,
        policy: ClosePolicy,
    ) -> Result<(Self, oneshot::Receiver<Outcome>), ChatError> {
        let (tx, rx) = oneshot::channel();
        let exchange = Self {
            request: Bytes::from(request.to_json()?),
            policy,
            handoff: Mutex::new(None),
            handoff_on_failure: false,
            slot: Mutex::new(Some(tx)),
        };
        Ok((exchange, rx))
    }

    /// Install `steady` on the connection as soon as a reply arrives:
    /// after any reply when `on_failure` is set, after a 2xx otherwise.
    pub(crate) fn hand_off_to(mut self, steady: Arc<dyn ConnectionHandler>, on_failure: bool) -> Self {
        self.handoff = Mutex::new(Some(steady));
        self.handoff_on_failure = on_failure;
        self
    }

    /// Record the outcome. Returns `true` only for the first call.
    pub(crate) fn resolve(&self, outcome: Outcome) -> bool {
        match lock(&self.slot).take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        lock(&self.slot).is_none()
    }

    /// Install the pending steady-state handler, at most once.
    pub(crate) fn hand_off(&self, conn: &SocketConnection) -> bool {
        match lock(&self.handoff).take() {
            Some(steady) => {
                conn.set_handler(steady);
                true
            }
            None => false,
        }
    }

    /// Drive the exchange on `conn` and wait for its outcome.
    ///
    /// Installs this exchange as the handler set, arms the connection
    /// timer, then connects (or sends straight away when the connection
    /// is already up). When the outcome tears the connection down, waits
    /// for the teardown to finish. The timer is cancelled before returning.
    pub(crate) async fn run(
        self: &Arc<Self>,
        conn: &SocketConnection,
        timeout: Duration,
        done: oneshot::Receiver<Outcome>,
    ) -> Outcome {
        conn.set_handler(self.clone());

        let exchange = Arc::clone(self);
        let weak = conn.downgrade();
        let armed = conn.set_timer(timeout, move || {
            if exchange.resolve(Outcome::Timeout) {
                warn!(?timeout, "request timed out");
                if let Some(conn) = weak.upgrade() {
                    let _ = conn.close();
                }
            }
        });
        if let Err(e) = armed {
            warn!(error = %e, "unable to arm request timer");
            self.resolve(Outcome::Unavailable);
        }

        if conn.is_connected() {
            self.send_request(conn).await;
        } else if let Err(e) = conn.connect() {
            warn!(server = %conn.info(), error = %e, "error connect to the server");
            let _ = conn.close();
            self.resolve(Outcome::Unavailable);
        }

        let outcome = done.await.unwrap_or(Outcome::Unavailable);
        if self.closes_on(&outcome) {
            // Let the old transport finish tearing down, `on_close`
            // included, so the next exchange starts from `Disconnected`.
            let _ = conn.close();
            conn.closed().await;
        }
        conn.cancel_timer();
        outcome
    }

    /// Whether `outcome` ends with the connection torn down.
    fn closes_on(&self, outcome: &Outcome) -> bool {
        match outcome {
            Outcome::Reply(response) => self.closes_after_reply(response.is_success()),
            Outcome::Timeout
            | Outcome::Unavailable
            | Outcome::SendFailed(_)
            | Outcome::Malformed(_) => true,
        }
    }

    fn closes_after_reply(&self, success: bool) -> bool {
        match self.policy {
            ClosePolicy::Always => true,
            ClosePolicy::OnFailure => !success,
            ClosePolicy::Never => false,
        }
    }

    async fn send_request(&self, conn: &SocketConnection) {
        if let Err(e) = conn.send(&self.request, Opcode::Text, true).await {
            warn!(server = %conn.info(), error = %e, "error to send request to the server");
            let _ = conn.close();
            self.resolve(Outcome::SendFailed(e));
        }
    }
}

#[async_trait]
impl ConnectionHandler for Exchange {
    async fn on_connect(&self, conn: &SocketConnection) {
        debug!(peer = ?conn.peer_addr(), local = ?conn.local_addr(), "connection established");
        self.send_request(conn).await;
    }

    async fn on_data(&self, conn: &SocketConnection, payload: Bytes) {
        if self.is_resolved() {
            debug!(server = %conn.info(), "frame after completion ignored");
            return;
        }

        match serde_json::from_slice::<Response>(&payload) {
            Ok(response) => {
                let success = response.is_success();
                if !self.resolve(Outcome::Reply(response)) {
                    return;
                }
                if self.closes_after_reply(success) {
                    let _ = conn.close();
                } else {
                    conn.cancel_timer();
                }
                if success || self.handoff_on_failure {
                    self.hand_off(conn);
                }
            }
            Err(e) => {
                warn!(server = %conn.info(), error = %e, "error parse response from the server");
                if self.resolve(Outcome::Malformed(e)) {
                    let _ = conn.close();
                }
            }
        }
    }

    async fn on_close(&self, conn: &SocketConnection) {
        if self.resolve(Outcome::Unavailable) {
            debug!(server = %conn.info(), "closed before a reply arrived");
        }
    }

    async fn on_error(&self, conn: &SocketConnection, err: &ChatError) {
        warn!(server = %conn.info(), error = %err, "connection error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PROTO_HTTP, StatusCode};
    use crate::network::{ConnectionInfo, LoggingHandler};

    fn exchange(policy: ClosePolicy) -> (Exchange, oneshot::Receiver<Outcome>) {
        Exchange::new(&Request::new("GET", "/ping", PROTO_HTTP), policy).unwrap()
    }

    #[tokio::test]
    async fn first_resolution_wins() {
        let (exchange, rx) = exchange(ClosePolicy::Always);
        assert!(!exchange.is_resolved());
        assert!(exchange.resolve(Outcome::Timeout));
        assert!(!exchange.resolve(Outcome::Reply(Response::with_status(StatusCode::OK))));
        assert!(exchange.is_resolved());
        assert!(matches!(rx.await.unwrap(), Outcome::Timeout));
    }

    #[tokio::test]
    async fn late_frame_is_ignored() {
        let (exchange, rx) = exchange(ClosePolicy::Always);
        let conn = SocketConnection::new(ConnectionInfo::new("127.0.0.1", 1));
        exchange.resolve(Outcome::Timeout);

        let late = br#"{"status":"OK","status_code":200,"header":{},"body":""}"#;
        exchange.on_data(&conn, Bytes::from_static(late)).await;
        assert!(matches!(rx.await.unwrap(), Outcome::Timeout));
    }

    #[tokio::test]
    async fn malformed_reply_resolves_as_malformed() {
        let (exchange, rx) = exchange(ClosePolicy::Always);
        let conn = SocketConnection::new(ConnectionInfo::new("127.0.0.1", 1));
        exchange.on_data(&conn, Bytes::from_static(b"{oops")).await;
        assert!(matches!(rx.await.unwrap(), Outcome::Malformed(_)));
    }

    #[tokio::test]
    async fn hand_off_happens_once() {
        let (exchange, _rx) = exchange(ClosePolicy::Never);
        let exchange = exchange.hand_off_to(Arc::new(LoggingHandler), true);
        let conn = SocketConnection::new(ConnectionInfo::new("127.0.0.1", 1));
        assert!(exchange.hand_off(&conn));
        assert!(!exchange.hand_off(&conn));
    }

    #[tokio::test]
    async fn failed_reply_skips_success_only_hand_off() {
        let (exchange, _rx) = exchange(ClosePolicy::OnFailure);
        let exchange = exchange.hand_off_to(Arc::new(LoggingHandler), false);
        let conn = SocketConnection::new(ConnectionInfo::new("127.0.0.1", 1));

        let denied = br#"{"status":"Unauthorized","status_code":401,"header":{},"body":""}"#;
        exchange.on_data(&conn, Bytes::from_static(denied)).await;
        // Still pending: nothing was installed.
        assert!(exchange.hand_off(&conn));
    }
}
