use bytes::{Bytes, BytesMut};

use crate::error::ChatError;
use crate::frame::{self, Decoded, Opcode};

/// `tokio_util` adapter over [`frame::encode`] / [`frame::decode`].
///
/// Every outbound frame uses the same opcode and masking choice.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    opcode: Opcode,
    mask: bool,
}

impl FrameCodec {
    pub fn new(opcode: Opcode, mask: bool) -> Self {
        Self { opcode, mask }
    }
}

impl Default for FrameCodec {
    /// Masked text frames, as the client sends them.
    fn default() -> Self {
        Self::new(Opcode::Text, true)
    }
}

impl tokio_util::codec::Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ChatError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match frame::decode(&src[..]) {
            Decoded::Incomplete => Ok(None),
            Decoded::Invalid(reason) => Err(ChatError::Protocol(reason)),
            Decoded::Complete { payload, consumed } => {
                let _ = src.split_to(consumed);
                Ok(Some(payload))
            }
        }
    }
}

impl tokio_util::codec::Encoder<Bytes> for FrameCodec {
    type Error = ChatError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > frame::MAX_PAYLOAD_SIZE {
            return Err(ChatError::Protocol("payload exceeds MAX_PAYLOAD_SIZE"));
        }
        dst.extend_from_slice(&frame::encode(&item, self.opcode, self.mask));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_util::codec::{Decoder, FramedRead, FramedWrite};

    #[test]
    fn decoder_leaves_partial_frame_in_buffer() {
        let frame = frame::encode(b"partial", Opcode::Text, true);
        let mut buf = BytesMut::from(&frame[..frame.len() - 2]);
        let before = buf.len();

        let mut codec = FrameCodec::default();
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), before);
    }

    #[test]
    fn decoder_rejects_garbage() {
        let mut buf = BytesMut::from(&b"garbage!"[..]);
        let err = FrameCodec::default().decode(&mut buf).unwrap_err();
        assert!(matches!(err, ChatError::Protocol(_)));
    }

    #[tokio::test]
    async fn framed_read_splits_chunked_stream() {
        let mut wire = frame::encode(b"one", Opcode::Text, true).to_vec();
        wire.extend_from_slice(&frame::encode(b"two", Opcode::Text, false));
        let (head, tail) = wire.split_at(5);

        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();
        let mut reader = FramedRead::new(mock, FrameCodec::default());

        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"one");
        assert_eq!(&reader.next().await.unwrap().unwrap()[..], b"two");
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn framed_write_emits_configured_frame() {
        let expected = frame::encode(b"{}", Opcode::Binary, false);
        let mock = tokio_test::io::Builder::new().write(&expected).build();
        let mut writer = FramedWrite::new(mock, FrameCodec::new(Opcode::Binary, false));
        writer.send(Bytes::from_static(b"{}")).await.unwrap();
    }
}
