//! # chat-core
//!
//! Client networking core for the chat service.
//!
//! This crate contains:
//! - **Frame codec**: `frame::{encode, decode}` for the preamble-prefixed
//!   wire framing, plus `FrameCodec` for `tokio_util` framed I/O
//! - **Messages**: `Request` / `Response` JSON envelopes and `StatusCode`
//! - **Network**: `SocketConnection` with a swappable `ConnectionHandler` set
//! - **Bridge**: `transact` (send, await reply, close) and `transact_keep`
//! - **Session**: `SessionManager` for the streaming handshake
//! - **State**: the `ConnectionPhase` state machine
//! - **Timer**: `PeriodicTimer`, a cancellable recurring timer
//! - **Error**: `ChatError`, a `thiserror`-based error type

pub mod bridge;
pub mod codec;
pub mod error;
mod exchange;
pub mod frame;
pub mod message;
pub mod network;
pub mod session;
pub mod state;
pub mod timer;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{fallback_response, transact, transact_keep, transact_keep_with};
pub use codec::FrameCodec;
pub use error::ChatError;
pub use frame::{Decoded, MASKING_KEY, MAX_PAYLOAD_SIZE, Opcode, PREAMBLE};
pub use message::{HeaderValue, Headers, PROTO_HTTP, PROTO_WS, Request, Response, StatusCode};
pub use network::{
    ConnectionHandler, ConnectionInfo, LoggingHandler, SocketConnection, WeakConnection,
};
pub use session::{DEFAULT_CHAT_ENDPOINT, SessionManager};
pub use state::ConnectionPhase;
pub use timer::PeriodicTimer;
