//! Native messaging framing
//!
//! Each frame is a 32-bit length in native byte order followed by that
//! many bytes of UTF-8 JSON.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;

/// Largest frame accepted from the peer (64 MiB)
pub const MAX_INBOUND_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Largest frame a native host may send to the browser (1 MiB)
pub const MAX_HOST_OUTBOUND_FRAME_SIZE: usize = 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// Codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Codec for [`Frame`] in both directions
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_outbound: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_outbound: MAX_INBOUND_FRAME_SIZE,
        }
    }

    /// Codec for the native host side, which the browser limits to 1 MiB per frame
    pub fn native_host() -> Self {
        Self {
            max_outbound: MAX_HOST_OUTBOUND_FRAME_SIZE,
        }
    }

    pub fn max_outbound(&self) -> usize {
        self.max_outbound
    }

    /// Encoded size of `frame`, or the error `encode` would return for it
    pub fn check_outbound(&self, frame: &Frame) -> Result<usize, CodecError> {
        let size = serde_json::to_vec(frame)?.len();
        if size > self.max_outbound {
            return Err(CodecError::MessageTooLarge {
                size,
                max: self.max_outbound,
            });
        }
        Ok(LENGTH_PREFIX + size)
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u32::from_ne_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if len > MAX_INBOUND_FRAME_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: len,
                max: MAX_INBOUND_FRAME_SIZE,
            });
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let data = src.split_to(len);

        let frame: Frame = serde_json::from_slice(&data)?;
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let data = serde_json::to_vec(&item)?;

        if data.len() > self.max_outbound {
            return Err(CodecError::MessageTooLarge {
                size: data.len(),
                max: self.max_outbound,
            });
        }

        dst.reserve(LENGTH_PREFIX + data.len());
        dst.put_slice(&(data.len() as u32).to_ne_bytes());
        dst.put_slice(&data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameType, ReplyBody, RequestId};
    use serde_json::json;

    fn decode_all(codec: &mut FrameCodec, buf: &mut BytesMut) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_length_prefix_is_native_endian() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::notification(FrameType::ProcessData, json!({})), &mut buf)
            .unwrap();

        let len = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);

        let body: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(body["type"], "process-data");
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Frame::request(FrameType::ToolListQuery, RequestId::from("r1"), json!({})),
                &mut buf,
            )
            .unwrap();

        let mut partial = buf.split_to(6);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.unsplit(buf);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.request_id, Some(RequestId::from("r1")));
    }

    #[test]
    fn test_frames_decode_in_order() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 0..3 {
            codec
                .encode(
                    Frame::reply(
                        FrameType::ToolCallResult,
                        RequestId::new(format!("r{}", i)),
                        ReplyBody::success(json!(i)),
                    ),
                    &mut buf,
                )
                .unwrap();
        }

        let ids: Vec<String> = decode_all(&mut codec, &mut buf)
            .into_iter()
            .filter_map(|f| f.response_to_request_id)
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, vec!["r0", "r1", "r2"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_inbound_length_rejected() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&((MAX_INBOUND_FRAME_SIZE + 1) as u32).to_ne_bytes());

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::MessageTooLarge { .. })));
    }

    #[test]
    fn test_native_host_outbound_limit() {
        let mut codec = FrameCodec::native_host();
        let big = "x".repeat(MAX_HOST_OUTBOUND_FRAME_SIZE);
        let mut buf = BytesMut::new();

        let result = codec.encode(
            Frame::notification(FrameType::ProcessData, json!({ "blob": big })),
            &mut buf,
        );
        assert!(matches!(result, Err(CodecError::MessageTooLarge { .. })));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_check_outbound_matches_encode() {
        let codec = FrameCodec::native_host();
        let small = Frame::notification(FrameType::ProcessData, json!({"blob": "x"}));
        let mut buf = BytesMut::new();
        let size = codec.check_outbound(&small).unwrap();
        codec.clone().encode(small, &mut buf).unwrap();
        assert_eq!(size, buf.len());

        let big = Frame::notification(
            FrameType::ProcessData,
            json!({ "blob": "x".repeat(MAX_HOST_OUTBOUND_FRAME_SIZE) }),
        );
        assert!(matches!(
            codec.check_outbound(&big),
            Err(CodecError::MessageTooLarge { max: MAX_HOST_OUTBOUND_FRAME_SIZE, .. })
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        let body = b"{not json";
        buf.put_slice(&(body.len() as u32).to_ne_bytes());
        buf.put_slice(body);

        assert!(matches!(codec.decode(&mut buf), Err(CodecError::Json(_))));
    }

    #[tokio::test]
    async fn test_framed_over_duplex() {
        use futures::{SinkExt, StreamExt};
        use tokio_util::codec::{FramedRead, FramedWrite};

        let (writer, reader) = tokio::io::duplex(1024);
        let mut sink = FramedWrite::new(writer, FrameCodec::native_host());
        let mut stream = FramedRead::new(reader, FrameCodec::new());

        sink.send(Frame::notification(FrameType::ServerStopped, json!({})))
            .await
            .unwrap();
        drop(sink);

        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(frame.kind, FrameType::ServerStopped);
        assert!(stream.next().await.is_none());
    }
}
