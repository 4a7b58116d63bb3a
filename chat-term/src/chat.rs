//! Steady-state chat session glue: print inbound frames, relay stdin.

use std::io::Write;

use async_trait::async_trait;
use bytes::Bytes;
use chat_core::{ChatError, ConnectionHandler, Opcode, SocketConnection};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Render one inbound frame for the terminal. JSON is pretty-printed,
/// anything else is shown as (lossy) text.
pub fn render_frame(payload: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(payload).into_owned()),
        Err(_) => String::from_utf8_lossy(payload).into_owned(),
    }
}

/// Handler set installed once the handshake is done. Prints every frame
/// to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatPrinter;

#[async_trait]
impl ConnectionHandler for ChatPrinter {
    async fn on_data(&self, _conn: &SocketConnection, payload: Bytes) {
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", render_frame(&payload));
        let _ = stdout.flush();
    }

    async fn on_close(&self, conn: &SocketConnection) {
        info!(server = %conn.info(), "chat session closed");
    }

    async fn on_error(&self, conn: &SocketConnection, err: &ChatError) {
        warn!(server = %conn.info(), error = %err, "chat connection error");
    }
}

/// Send every non-empty line of `input` as one masked text frame.
///
/// Returns the number of frames sent once `input` is exhausted, or the
/// first send error.
pub async fn relay_lines<R>(conn: &SocketConnection, input: R) -> Result<usize, ChatError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut sent = 0;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        conn.send(line.as_bytes(), Opcode::Text, true).await?;
        sent += 1;
    }
    debug!(sent, "input exhausted");
    Ok(sent)
}
