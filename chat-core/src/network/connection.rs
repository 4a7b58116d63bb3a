use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::frame::{self, Decoded, Opcode};
use crate::network::handler::{ConnectionHandler, LoggingHandler};
use crate::state::ConnectionPhase;
use crate::timer::PeriodicTimer;

/// Bytes requested from the transport per read.
const READ_CHUNK_SIZE: usize = 8 * 1024;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One framed TCP connection to the chat server.
///
/// Cloning is cheap; all clones drive the same transport. Events are
/// dispatched to the active [`ConnectionHandler`] from a background
/// task started by [`connect`](Self::connect).
#[derive(Clone)]
pub struct SocketConnection {
    inner: Arc<Inner>,
}

struct Inner {
    info: ConnectionInfo,
    phase: watch::Sender<ConnectionPhase>,
    handler: watch::Sender<Arc<dyn ConnectionHandler>>,
    // Present from `connect()` until the I/O task has released the transport.
    transport: Mutex<Option<CancellationToken>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    // Bytes not yet resolved into a complete frame.
    buffer: Mutex<BytesMut>,
    timer: Mutex<Option<PeriodicTimer>>,
    addrs: Mutex<(Option<SocketAddr>, Option<SocketAddr>)>,
    // I/O tasks that have not finished `release()` yet.
    io_tasks: watch::Sender<usize>,
}

impl SocketConnection {
    /// Create a disconnected socket with the [`LoggingHandler`] installed.
    pub fn new(info: ConnectionInfo) -> Self {
        Self::with_handler(info, Arc::new(LoggingHandler))
    }

    pub fn with_handler(info: ConnectionInfo, handler: Arc<dyn ConnectionHandler>) -> Self {
        let (phase, _) = watch::channel(ConnectionPhase::default());
        let (handler, _) = watch::channel(handler);
        let (io_tasks, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                info,
                phase,
                handler,
                transport: Mutex::new(None),
                writer: tokio::sync::Mutex::new(None),
                buffer: Mutex::new(BytesMut::new()),
                timer: Mutex::new(None),
                addrs: Mutex::new((None, None)),
                io_tasks,
            }),
        }
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.info
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.phase.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.phase.borrow().is_connected()
    }

    /// Local address of the current (or last) transport.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.addrs).0
    }

    /// Remote address of the current (or last) transport.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        lock(&self.inner.addrs).1
    }

    /// Number of received bytes waiting for the rest of their frame.
    pub fn buffered_len(&self) -> usize {
        lock(&self.inner.buffer).len()
    }

    /// Resolves once no transport is left: the I/O task has released it
    /// and `on_close` has returned. Immediate when never connected.
    pub async fn closed(&self) {
        let mut tasks = self.inner.io_tasks.subscribe();
        let _ = tasks.wait_for(|running| *running == 0).await;
    }

    /// Resolves once the connection reaches `Connected`, or returns
    /// `false` if it fell back to `Disconnected` first.
    pub async fn established(&self) -> bool {
        let mut phase = self.inner.phase.subscribe();
        match phase
            .wait_for(|p| p.is_connected() || p.is_disconnected())
            .await
        {
            Ok(p) => p.is_connected(),
            Err(_) => false,
        }
    }

    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // ── Handlers ─────────────────────────────────────────────────

    /// The handler set events are currently dispatched to.
    pub fn handler(&self) -> Arc<dyn ConnectionHandler> {
        self.inner.handler.borrow().clone()
    }

    /// Replace the whole handler set. The next event goes to `handler`.
    pub fn set_handler(&self, handler: Arc<dyn ConnectionHandler>) {
        self.inner.handler.send_replace(handler);
    }

    // ── Timer ────────────────────────────────────────────────────

    /// Arm the connection's recurring timer, replacing any previous one.
    ///
    /// The timer keeps firing every `interval` until
    /// [`cancel_timer`](Self::cancel_timer) or [`close`](Self::close).
    pub fn set_timer<F>(&self, interval: Duration, on_timeout: F) -> Result<(), ChatError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let timer = PeriodicTimer::start(interval, on_timeout)?;
        if let Some(previous) = lock(&self.inner.timer).replace(timer) {
            previous.cancel();
        }
        Ok(())
    }

    pub fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.cancel();
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Open the transport in the background.
    ///
    /// A no-op while `Connecting` or `Connected`. The active handler's
    /// `on_connect` runs once the transport is up; a failed connect
    /// reports through `on_error` followed by `on_close`.
    pub fn connect(&self) -> Result<(), ChatError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ChatError::NoRuntime)?;

        if !self
            .inner
            .phase
            .send_if_modified(|phase| phase.begin_connect().is_ok())
        {
            debug!(server = %self.inner.info, "connect ignored: already active");
            return Ok(());
        }

        let token = CancellationToken::new();
        *lock(&self.inner.transport) = Some(token.clone());

        self.inner.io_tasks.send_modify(|running| *running += 1);
        let conn = self.clone();
        runtime.spawn(async move { conn.run(token).await });
        Ok(())
    }

    /// Release the transport.
    ///
    /// Fails with [`ChatError::NotInitialized`] when there is no
    /// transport. Otherwise cancels the timer and tears the transport
    /// down; `on_close` fires from the I/O task shortly after.
    pub fn close(&self) -> Result<(), ChatError> {
        let token = lock(&self.inner.transport)
            .clone()
            .ok_or(ChatError::NotInitialized)?;
        self.cancel_timer();
        token.cancel();
        Ok(())
    }

    /// Encode `payload` into one frame and write it.
    ///
    /// Only legal while `Connected`. The write is awaited until the
    /// transport accepts it, so a slow peer pauses the caller.
    pub async fn send(&self, payload: &[u8], opcode: Opcode, need_mask: bool) -> Result<(), ChatError> {
        if !self.is_connected() {
            return Err(ChatError::NotConnected);
        }
        if payload.len() > frame::MAX_PAYLOAD_SIZE {
            return Err(ChatError::Protocol("payload exceeds MAX_PAYLOAD_SIZE"));
        }
        let token = lock(&self.inner.transport)
            .clone()
            .ok_or(ChatError::NotConnected)?;
        let frame = frame::encode(payload, opcode, need_mask);

        let result = {
            let mut writer = self.inner.writer.lock().await;
            let writer = writer.as_mut().ok_or(ChatError::NotConnected)?;
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ChatError::NotConnected),
                res = writer.write_all(&frame) => res,
            }
        };

        if let Err(e) = result {
            warn!(server = %self.inner.info, error = %e, "write failed");
            let reported = ChatError::Connection(std::io::Error::new(e.kind(), e.to_string()));
            self.handler().on_error(self, &reported).await;
            return Err(ChatError::Connection(e));
        }
        Ok(())
    }

    /// Feed received bytes through the decode loop.
    ///
    /// Every complete frame is trimmed from the receive buffer and handed
    /// to `on_data` in order. A partial frame stays buffered. A corrupt
    /// frame closes the connection.
    pub async fn ingest(&self, chunk: &[u8]) {
        lock(&self.inner.buffer).extend_from_slice(chunk);

        loop {
            if self.is_closing() {
                break;
            }

            let decoded = frame::decode(&lock(&self.inner.buffer));
            match decoded {
                Decoded::Incomplete => break,
                Decoded::Invalid(reason) => {
                    warn!(server = %self.inner.info, reason, "invalid frame, closing connection");
                    lock(&self.inner.buffer).clear();
                    if let Err(e) = self.close() {
                        debug!(error = %e, "close after invalid frame");
                    }
                    break;
                }
                Decoded::Complete { payload, consumed } => {
                    lock(&self.inner.buffer).advance(consumed);
                    self.handler().on_data(self, payload).await;
                }
            }
        }
    }

    // ── I/O task ─────────────────────────────────────────────────

    fn is_closing(&self) -> bool {
        lock(&self.inner.transport)
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    async fn run(self, token: CancellationToken) {
        let addr = self.inner.info.to_socket_string();

        let stream = tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.release().await;
                return;
            }
            res = TcpStream::connect(&addr) => res,
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(server = %addr, error = %e, "connect failed");
                let err = ChatError::Connection(e);
                self.handler().on_error(&self, &err).await;
                self.release().await;
                return;
            }
        };

        let _ = stream.set_nodelay(true);
        *lock(&self.inner.addrs) = (stream.local_addr().ok(), stream.peer_addr().ok());
        let (mut reader, writer) = stream.into_split();
        *self.inner.writer.lock().await = Some(writer);
        self.inner.phase.send_modify(|phase| {
            let _ = phase.complete_connect();
        });
        debug!(server = %addr, "transport connected");

        if !token.is_cancelled() {
            self.handler().on_connect(&self).await;
        }

        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        while !token.is_cancelled() {
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                res = reader.read(&mut chunk) => res,
            };
            match read {
                Ok(0) => {
                    debug!(server = %addr, "peer closed the stream");
                    break;
                }
                Ok(n) => self.ingest(&chunk[..n]).await,
                Err(e) => {
                    warn!(server = %addr, error = %e, "read failed");
                    let err = ChatError::Connection(e);
                    self.handler().on_error(&self, &err).await;
                    break;
                }
            }
        }

        drop(reader);
        self.release().await;
    }

    /// Drop the transport, reset state and fire `on_close`.
    async fn release(&self) {
        lock(&self.inner.transport).take();
        self.cancel_timer();
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        lock(&self.inner.buffer).clear();
        let uptime = self.inner.phase.borrow().connected_duration();
        self.inner.phase.send_modify(ConnectionPhase::force_disconnect);
        info!(server = %self.inner.info, ?uptime, "connection released");

        self.handler().on_close(self).await;
        self.inner
            .io_tasks
            .send_modify(|running| *running = running.saturating_sub(1));
    }
}

impl fmt::Debug for SocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketConnection")
            .field("info", &self.inner.info)
            .field("phase", &*self.inner.phase.borrow())
            .field("buffered", &self.buffered_len())
            .finish()
    }
}

/// Non-owning handle to a [`SocketConnection`], for callbacks that must
/// not keep the connection alive.
#[derive(Clone, Debug)]
pub struct WeakConnection {
    inner: Weak<Inner>,
}

impl WeakConnection {
    pub fn upgrade(&self) -> Option<SocketConnection> {
        self.inner.upgrade().map(|inner| SocketConnection { inner })
    }
}

// ── ConnectionInfo ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
}

impl ConnectionInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn to_socket_string(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl From<SocketAddr> for ConnectionInfo {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl std::str::FromStr for ConnectionInfo {
    type Err = ChatError;

    /// Parse `host:port`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ChatError::Other(format!("missing port in {s:?}")))?;
        let port = port
            .parse()
            .map_err(|e| ChatError::Other(format!("invalid port in {s:?}: {e}")))?;
        Ok(Self::new(host, port))
    }
}

// ── Tests ────────────────────────────────────────────────────────
