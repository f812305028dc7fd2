use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::ProtocolError;

/// Upper bound for a single inbound frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

const LENGTH_PREFIX_BYTES: usize = 4;

/// How JSON documents are delimited on the TCP stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FramingMode {
    /// Bare JSON documents, one after another
    #[default]
    JsonStream,
    /// 4-byte big-endian length followed by the JSON document
    LengthPrefixed,
}

impl fmt::Display for FramingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingMode::JsonStream => f.write_str("json-stream"),
            FramingMode::LengthPrefixed => f.write_str("length-prefixed"),
        }
    }
}

impl std::str::FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json-stream" | "stream" => Ok(FramingMode::JsonStream),
            "length-prefixed" | "length" => Ok(FramingMode::LengthPrefixed),
            other => Err(format!("unknown framing mode '{other}'")),
        }
    }
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Splits a byte stream into JSON frames and writes frames back out.
///
/// In [`FramingMode::JsonStream`] the decoder walks the buffer with a streaming
/// JSON reader, so a document split across several reads is reassembled and
/// documents sent back to back are separated. Bytes that can never become a
/// valid document are handed over as one frame so the caller can report the
/// parse failure to the peer.
#[derive(Debug, Clone)]
pub struct JsonFrameCodec {
    mode: FramingMode,
    max_frame_bytes: usize,
}

impl JsonFrameCodec {
    pub fn new(mode: FramingMode, max_frame_bytes: usize) -> Self {
        Self {
            mode,
            max_frame_bytes,
        }
    }

    pub fn mode(&self) -> FramingMode {
        self.mode
    }

    fn too_large(&self, size: usize) -> CodecError {
        CodecError::Protocol(ProtocolError::FrameTooLarge {
            size,
            max: self.max_frame_bytes,
        })
    }

    fn decode_stream(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        match src.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(start) => src.advance(start),
            None => {
                src.clear();
                return Ok(None);
            }
        }

        let mut documents =
            serde_json::Deserializer::from_slice(&src[..]).into_iter::<IgnoredAny>();
        match documents.next() {
            Some(Ok(_)) => {
                let end = documents.byte_offset();
                if end > self.max_frame_bytes {
                    return Err(self.too_large(end));
                }
                Ok(Some(src.split_to(end).freeze()))
            }
            Some(Err(e)) => {
                // A number cut off after `-`, `.` or `e` is reported as
                // InvalidNumber, not EOF, with the position at the buffer end.
                let incomplete = e.is_eof()
                    || error_offset(src, e.line(), e.column())
                        .is_some_and(|offset| offset >= src.len());
                if !incomplete {
                    let len = src.len();
                    return Ok(Some(src.split_to(len).freeze()));
                }
                if src.len() > self.max_frame_bytes {
                    return Err(self.too_large(src.len()));
                }
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn decode_length_prefixed(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        let frame_len = {
            let mut prefix = &src[..LENGTH_PREFIX_BYTES];
            prefix.get_u32() as usize
        };
        if frame_len > self.max_frame_bytes {
            return Err(self.too_large(frame_len));
        }

        let total = LENGTH_PREFIX_BYTES + frame_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        Ok(Some(src.split_to(frame_len).freeze()))
    }
}

/// Byte offset of a serde_json error position (1-based line, byte column).
fn error_offset(src: &[u8], line: usize, column: usize) -> Option<usize> {
    let line_start = match line {
        0 => return None,
        1 => 0,
        _ => {
            src.iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .nth(line - 2)?
                .0
                + 1
        }
    };
    Some(line_start + column)
}

impl Default for JsonFrameCodec {
    fn default() -> Self {
        Self::new(FramingMode::default(), DEFAULT_MAX_FRAME_BYTES)
    }
}

impl Decoder for JsonFrameCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.mode {
            FramingMode::JsonStream => self.decode_stream(src),
            FramingMode::LengthPrefixed => self.decode_length_prefixed(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        match self.mode {
            // A truncated document still goes to the parser so the peer gets
            // a proper parse error.
            FramingMode::JsonStream => {
                let len = src.len();
                Ok(Some(src.split_to(len).freeze()))
            }
            FramingMode::LengthPrefixed => Err(CodecError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed with {} bytes of a partial frame", src.len()),
            ))),
        }
    }
}

impl Encoder<Bytes> for JsonFrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match self.mode {
            FramingMode::JsonStream => {
                dst.reserve(item.len());
                dst.extend_from_slice(&item);
            }
            FramingMode::LengthPrefixed => {
                let len = u32::try_from(item.len()).map_err(|_| self.too_large(item.len()))?;
                dst.reserve(LENGTH_PREFIX_BYTES + item.len());
                dst.put_u32(len);
                dst.extend_from_slice(&item);
            }
        }
        Ok(())
    }
}
