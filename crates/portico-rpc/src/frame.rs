//! gRPC message framing.
//!
//! Every message on the wire is length-prefixed:
//! - 1 byte: flags (bit 0 = compressed, bit 7 = gRPC-Web trailer frame)
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: message payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Size of the message header (1 byte flags + 4 bytes length).
pub const HEADER_SIZE: usize = 5;

/// Default maximum message size (4 MiB, the gRPC default).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Flag bit marking a compressed payload.
pub const COMPRESSED_FLAG: u8 = 0x01;

/// Flag bit marking a gRPC-Web trailer frame.
pub const TRAILER_FLAG: u8 = 0x80;

/// Errors decoding a unary request body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The body ended before a complete frame.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the header announced (header included).
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// The announced length exceeds the configured limit.
    #[error("message too large: {len} bytes exceeds limit of {max}")]
    TooLarge {
        /// Announced length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The compressed flag is set; no compression is negotiated.
    #[error("compressed messages are not supported")]
    Compressed,

    /// More than one message was sent to a unary method.
    #[error("unexpected {0} bytes after the request message")]
    Trailing(usize),
}

/// Encode a message into gRPC wire format.
pub fn encode_message(data: &[u8]) -> Bytes {
    encode_frame(0, data)
}

/// Encode a frame with explicit flags.
pub fn encode_frame(flags: u8, data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + data.len());
    buf.put_u8(flags);
    buf.put_u32(data.len() as u32);
    buf.put_slice(data);
    buf.freeze()
}

/// Decode the single message of a unary request.
///
/// An empty body is read as an empty message.
pub fn decode_unary(mut buf: Bytes, max: usize) -> Result<Bytes, FrameError> {
    if buf.is_empty() {
        return Ok(Bytes::new());
    }
    if buf.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            expected: HEADER_SIZE,
            actual: buf.len(),
        });
    }

    let flags = buf[0];
    let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;

    if len > max {
        return Err(FrameError::TooLarge { len, max });
    }
    if flags & COMPRESSED_FLAG != 0 {
        return Err(FrameError::Compressed);
    }
    if buf.len() < HEADER_SIZE + len {
        return Err(FrameError::Truncated {
            expected: HEADER_SIZE + len,
            actual: buf.len(),
        });
    }

    buf.advance(HEADER_SIZE);
    let message = buf.split_to(len);
    if !buf.is_empty() {
        return Err(FrameError::Trailing(buf.len()));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_empty_message() {
        let encoded = encode_message(&[]);
        assert_eq!(&encoded[..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_message() {
        let encoded = encode_message(b"hello world");
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..5], &11u32.to_be_bytes());
        assert_eq!(&encoded[HEADER_SIZE..], b"hello world");
    }

    #[test]
    fn test_encode_trailer_frame() {
        let encoded = encode_frame(TRAILER_FLAG, b"grpc-status:0\r\n");
        assert_eq!(encoded[0], 0x80);
    }

    #[test]
    fn test_decode_unary() {
        let decoded = decode_unary(encode_message(b"payload"), MAX_MESSAGE_SIZE).unwrap();
        assert_eq!(&decoded[..], b"payload");
    }

    #[test]
    fn test_decode_empty_body() {
        assert!(decode_unary(Bytes::new(), MAX_MESSAGE_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let err = decode_unary(Bytes::from_static(&[0, 0, 0]), MAX_MESSAGE_SIZE).unwrap_err();
        assert_eq!(
            err,
            FrameError::Truncated {
                expected: 5,
                actual: 3
            }
        );
    }

    #[test]
    fn test_decode_incomplete_body() {
        let encoded = encode_message(b"hello world");
        let err = decode_unary(encoded.slice(..8), MAX_MESSAGE_SIZE).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
    }

    #[test]
    fn test_decode_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u8(0);
        buf.put_u32(1025);
        let err = decode_unary(buf.freeze(), 1024).unwrap_err();
        assert_eq!(err, FrameError::TooLarge { len: 1025, max: 1024 });
    }

    #[test]
    fn test_decode_compressed() {
        let encoded = encode_frame(COMPRESSED_FLAG, b"zz");
        assert_eq!(
            decode_unary(encoded, MAX_MESSAGE_SIZE).unwrap_err(),
            FrameError::Compressed
        );
    }

    #[test]
    fn test_decode_rejects_second_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_message(b"first"));
        buf.extend_from_slice(&encode_message(b"second"));
        let err = decode_unary(buf.freeze(), MAX_MESSAGE_SIZE).unwrap_err();
        assert_eq!(err, FrameError::Trailing(HEADER_SIZE + 6));
    }
}
