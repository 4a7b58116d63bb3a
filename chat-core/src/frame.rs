//! Wire framing for the chat protocol.
//!
//! ## Wire format
//!
//! ```text
//! preamble:        [u8; 4]   5A A5 5A A5
//! control:         u8        bit7 = fin, low nibble = opcode
//! mask | length:   u8        bit7 = mask present, low 7 bits = length selector
//! extended length: u16 / u64 (big-endian, selector 126 / 127)
//! masking key:     [u8; 4]   (only when the mask bit is set)
//! payload:         [u8]      XORed with the cyclic masking key when masked
//! ```
//!
//! Both functions are pure: no I/O and no state. [`decode`] reports a
//! three-way [`Decoded`] outcome so callers can tell a corrupt stream
//! apart from one that simply needs more bytes.

use bytes::{BufMut, Bytes, BytesMut};

// ── Constants ────────────────────────────────────────────────────

/// Fixed marker at the start of every frame.
pub const PREAMBLE: [u8; 4] = [0x5a, 0xa5, 0x5a, 0xa5];

/// Masking key used for every outbound masked frame.
pub const MASKING_KEY: [u8; 4] = [0x21, 0x54, 0x08, 0x23];

/// Preamble + control byte + mask/length byte.
pub const MIN_HEADER_SIZE: usize = PREAMBLE.len() + 2;

/// Upper bound on a declared payload length (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

const FIN_BIT: u8 = 0x80;
const MASK_BIT: u8 = 0x80;
const OPCODE_BITS: u8 = 0x0f;
const LENGTH_BITS: u8 = 0x7f;
const LEN_16: u8 = 126;
const LEN_64: u8 = 127;

// ── Opcode ───────────────────────────────────────────────────────

/// Four-bit frame tag carried in the control byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    /// Reserved: a peer sending it tears the connection down.
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

// ── Decoded ──────────────────────────────────────────────────────

/// Result of attempting to pull one frame off the front of a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// The buffer cannot be the start of a valid frame.
    Invalid(&'static str),
    /// More bytes are needed; nothing was consumed.
    Incomplete,
    /// A whole frame was decoded.
    Complete {
        /// Unmasked payload.
        payload: Bytes,
        /// Header + masking key + payload length, to trim from the buffer.
        consumed: usize,
    },
}

impl Decoded {
    pub fn is_invalid(&self) -> bool {
        matches!(self, Decoded::Invalid(_))
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, Decoded::Incomplete)
    }
}

// ── Masking ──────────────────────────────────────────────────────

/// XOR `data` in place with the cyclic 4-byte `key`.
///
/// Applying it twice with the same key restores the input.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

// ── Encode ───────────────────────────────────────────────────────

/// Size of the frame [`encode`] produces for a payload of `len` bytes.
pub fn encoded_len(len: usize, need_mask: bool) -> usize {
    let ext = match len {
        n if n < LEN_16 as usize => 0,
        n if n <= u16::MAX as usize => 2,
        _ => 8,
    };
    let key = if need_mask { MASKING_KEY.len() } else { 0 };
    MIN_HEADER_SIZE + ext + key + len
}

/// Build one frame around `payload`.
pub fn encode(payload: &[u8], opcode: Opcode, need_mask: bool) -> Bytes {
    let mut frame = BytesMut::with_capacity(encoded_len(payload.len(), need_mask));
    frame.put_slice(&PREAMBLE);
    frame.put_u8(FIN_BIT | (opcode as u8 & OPCODE_BITS));

    let mask_bit = if need_mask { MASK_BIT } else { 0 };
    match payload.len() {
        n if n < LEN_16 as usize => frame.put_u8(mask_bit | n as u8),
        n if n <= u16::MAX as usize => {
            frame.put_u8(mask_bit | LEN_16);
            frame.put_u16(n as u16);
        }
        n => {
            frame.put_u8(mask_bit | LEN_64);
            frame.put_u64(n as u64);
        }
    }

    if need_mask {
        frame.put_slice(&MASKING_KEY);
        let start = frame.len();
        frame.put_slice(payload);
        apply_mask(&mut frame[start..], MASKING_KEY);
    } else {
        frame.put_slice(payload);
    }

    frame.freeze()
}

// ── Decode ───────────────────────────────────────────────────────

/// Try to decode the frame at the front of `buf`.
pub fn decode(buf: &[u8]) -> Decoded {
    let seen = buf.len().min(PREAMBLE.len());
    if buf[..seen] != PREAMBLE[..seen] {
        return Decoded::Invalid("preamble mismatch");
    }
    if buf.len() < MIN_HEADER_SIZE {
        return Decoded::Incomplete;
    }

    let control = buf[PREAMBLE.len()];
    if control & OPCODE_BITS == Opcode::Close as u8 {
        return Decoded::Invalid("close opcode received");
    }

    let mask_len = buf[PREAMBLE.len() + 1];
    let masked = mask_len & MASK_BIT != 0;
    let mut pos = MIN_HEADER_SIZE;

    let payload_len = match mask_len & LENGTH_BITS {
        LEN_16 => {
            if buf.len() < pos + 2 {
                return Decoded::Incomplete;
            }
            let len = u16::from_be_bytes([buf[pos], buf[pos + 1]]) as u64;
            pos += 2;
            len
        }
        LEN_64 => {
            if buf.len() < pos + 8 {
                return Decoded::Incomplete;
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[pos..pos + 8]);
            pos += 8;
            u64::from_be_bytes(raw)
        }
        literal => literal as u64,
    };

    if payload_len > MAX_PAYLOAD_SIZE as u64 {
        return Decoded::Invalid("declared payload length exceeds limit");
    }
    let payload_len = payload_len as usize;

    let key_len = if masked { MASKING_KEY.len() } else { 0 };
    let consumed = pos + key_len + payload_len;
    if buf.len() < consumed {
        return Decoded::Incomplete;
    }

    let mut payload = buf[pos + key_len..consumed].to_vec();
    if masked {
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[pos..pos + key_len]);
        apply_mask(&mut payload, key);
    }

    Decoded::Complete {
        payload: Bytes::from(payload),
        consumed,
    }
}

// ── Tests ────────────────────────────────────────────────────────
